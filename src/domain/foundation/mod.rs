//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers and error types that form the
//! vocabulary of the orchestration core.

mod cancellation;
mod errors;
mod ids;
mod timestamp;

pub use cancellation::{cancellation_pair, CancellationHandle, CancellationSignal, DeadlineGuard};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{
    validate_identifier, CapabilityId, ConversationId, EventId, MessageId, SessionId, UserId,
    MAX_IDENTIFIER_LEN,
};
pub use timestamp::Timestamp;
