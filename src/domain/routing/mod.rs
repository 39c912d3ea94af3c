//! Routing module - provider selection, fallback and retry.
//!
//! # Module Structure
//!
//! - `router` - `ProviderRouter`, fallback chains and routing metadata
//! - `retry` - Exponential backoff with jitter and per-attempt deadlines
//! - `errors` - Routing errors and attempt records

mod errors;
mod retry;
mod router;

pub use errors::{AttemptOutcome, ProviderAttempt, RoutingError};
pub use retry::RetryPolicy;
pub use router::{RouteCandidate, RouteHints, ProviderRouter, RoutedResponse, RoutingMetadata};
