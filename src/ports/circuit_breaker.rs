//! CircuitBreaker port - Per-provider failure isolation.
//!
//! ## States
//!
//! - **Closed**: Normal operation, calls flow through
//! - **Open**: Too many consecutive failures, calls rejected immediately
//! - **Half-Open**: Cooldown elapsed, exactly one probe call admitted
//!
//! ## Transitions
//!
//! ```text
//! Closed    --[failure_threshold consecutive failures]--> Open
//! Open      --[cooldown elapsed, next acquire]----------> Half-Open (probe admitted)
//! Half-Open --[probe succeeds]--------------------------> Closed
//! Half-Open --[probe fails]-----------------------------> Open
//! ```
//!
//! Admission and outcome are split: callers first [`CircuitBreaker::try_acquire`]
//! a [`Permit`], then report the outcome against it. While a probe permit is
//! outstanding every other acquire is rejected, so concurrent callers cannot
//! all probe a recovering provider at once.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::domain::foundation::Timestamp;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls flow through to the provider.
    Closed,

    /// Too many failures - calls rejected without reaching the provider.
    Open,

    /// Cooldown elapsed - a single probe decides the next state.
    HalfOpen,
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    ///
    /// Default: 5 failures
    pub failure_threshold: u32,

    /// Time to wait in Open before admitting a probe.
    ///
    /// Default: 60 seconds
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Kind of admission granted by [`CircuitBreaker::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Circuit closed; ordinary call.
    Normal,
    /// The single half-open probe.
    Probe,
}

/// Rejection returned while the circuit is open or a probe is in flight.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit open, retry after {retry_after:?}")]
pub struct CircuitRejected {
    /// Time until a probe may be admitted. Zero when a probe is in flight.
    pub retry_after: Duration,
}

/// Port for a single provider's circuit breaker.
///
/// # Example
///
/// ```ignore
/// let permit = breaker.try_acquire()?;
/// match adapter.call(request).await {
///     Ok(response) => breaker.record_success(permit),
///     Err(_) => breaker.record_failure(permit),
/// }
/// ```
pub trait CircuitBreaker: Send + Sync {
    /// Request admission for one call.
    fn try_acquire(&self) -> Result<Permit, CircuitRejected>;

    /// Record a successful call admitted with `permit`.
    fn record_success(&self, permit: Permit);

    /// Record a failed call admitted with `permit`.
    fn record_failure(&self, permit: Permit);

    /// Release a permit whose call ended without an outcome (cancelled).
    ///
    /// A released probe leaves the circuit half-open so the next caller may probe.
    fn release(&self, permit: Permit);

    /// Get the current state of the circuit.
    fn state(&self) -> CircuitState;

    /// Point-in-time view of the breaker.
    fn snapshot(&self) -> CircuitSnapshot;

    /// Force the circuit closed and clear counters.
    fn reset(&self);
}

/// Source of per-provider breakers, keyed by provider name.
pub trait CircuitBreakerFactory: Send + Sync {
    /// Returns the breaker for `provider`, creating it on first use.
    fn breaker_for(&self, provider: &str) -> Arc<dyn CircuitBreaker>;

    /// Snapshots of every breaker created so far, sorted by provider name.
    fn snapshots(&self) -> Vec<(String, CircuitSnapshot)>;
}

/// Point-in-time view of a circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    /// Current state.
    pub status: CircuitState,
    /// Consecutive failures counted toward the threshold.
    pub failure_count: u32,
    /// Wall-clock time of the most recent failure.
    pub last_failure_time: Option<Timestamp>,
    /// Wall-clock time a probe becomes eligible, when open.
    pub next_attempt_time: Option<Timestamp>,
    /// Configured failure threshold.
    pub threshold: u32,
    /// Configured cooldown in milliseconds.
    pub timeout_ms: u64,
    /// Total successful calls since creation.
    pub total_successes: u64,
    /// Total failed calls since creation.
    pub total_failures: u64,
    /// Times the circuit has opened.
    pub times_opened: u64,
}
