//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the orchestration core and the outside world. Adapters implement these ports.
//!
//! ## Provider Ports
//!
//! - `ProviderAdapter` - Language-model backend behind a normalized request
//! - `CircuitBreaker` / `CircuitBreakerFactory` - Per-provider failure isolation
//!
//! ## Capability Ports
//!
//! - `CapabilityRateLimiter` - Sliding-window limits per capability and caller
//!
//! ## Storage Ports
//!
//! - `ProfileStore` - Caller profiles and daily usage counters
//! - `HistoryStore` - Conversation messages
//! - `ShortTermMemory` - TTL key/value session state
//! - `SemanticMemory` / `Embedder` - Vector recall of past exchanges

mod ai_provider;
mod circuit_breaker;
mod history_store;
mod memory_store;
mod profile_store;
mod rate_limiter;

pub use ai_provider::{
    CostTable, FinishReason, Message, MessageRole, ProviderAdapter, ProviderDescriptor,
    ProviderError, ProviderRequest, ProviderResponse, RequestMetadata, TokenUsage,
};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerFactory, CircuitRejected,
    CircuitSnapshot, CircuitState, Permit,
};
pub use history_store::{HistoryStore, StoredMessage};
pub use memory_store::{
    Embedder, MemoryFilter, MemoryMatch, MemoryRecord, SemanticMemory, ShortTermMemory,
};
pub use profile_store::{CallerProfile, ProfileStore, UsageDelta, UsageSnapshot};
pub use rate_limiter::{
    CapabilityRateLimiter, DenialReason, RateLimitDecision, RateLimitKey, RateLimitStatus,
    ANONYMOUS_CALLER,
};
