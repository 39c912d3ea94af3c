//! Rate limiting port for capability executions.
//!
//! Limits are tracked per `(capability, caller)` pair with a sliding window:
//! a request is admitted only when fewer than `requests_per_window` requests
//! fell inside the trailing window and fewer than `burst_limit` fell inside
//! the trailing burst interval. Admission records the request.

use async_trait::async_trait;
use std::fmt;

use crate::domain::capability::RateLimitPolicy;
use crate::domain::foundation::UserId;

/// Caller identifier used when an execution carries no caller.
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// Port for capability rate limiting.
///
/// Implementations must make check-and-record atomic per key so two
/// concurrent checks cannot both take the last slot.
#[async_trait]
pub trait CapabilityRateLimiter: Send + Sync {
    /// Check if a request is allowed, recording it if so.
    async fn check(&self, key: &RateLimitKey, policy: &RateLimitPolicy) -> RateLimitDecision;

    /// Current usage for a key without recording a request.
    async fn status(&self, key: &RateLimitKey, policy: &RateLimitPolicy) -> RateLimitStatus;

    /// Clear the window for a single key.
    async fn reset(&self, key: &RateLimitKey);

    /// Clear every key belonging to a capability.
    async fn reset_capability(&self, capability: &str);
}

/// Key identifying one `(capability, caller)` window.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RateLimitKey {
    /// Capability name.
    pub capability: String,
    /// Caller identifier, or [`ANONYMOUS_CALLER`].
    pub caller: String,
}

impl RateLimitKey {
    /// Creates a key for a capability and optional caller.
    pub fn new(capability: &str, caller: Option<&UserId>) -> Self {
        Self {
            capability: capability.to_string(),
            caller: caller
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| ANONYMOUS_CALLER.to_string()),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ratelimit:{}:{}", self.capability, self.caller)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request admitted.
    Allowed {
        /// Requests still available in the current window.
        remaining: u32,
    },
    /// Request denied.
    Denied {
        /// Seconds until the client should retry.
        retry_after_secs: u64,
        /// Which bound rejected the request.
        reason: DenialReason,
    },
}

impl RateLimitDecision {
    /// Returns true if the request was allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Bound that rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Window quota exhausted.
    Window,
    /// Too many requests inside the burst interval.
    Burst,
}

/// Current usage of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Maximum requests allowed in the window.
    pub limit: u32,
    /// Requests recorded in the trailing window.
    pub used: u32,
    /// Window duration in seconds.
    pub window_secs: u64,
}
