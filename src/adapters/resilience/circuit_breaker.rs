//! In-memory circuit breaker and a per-provider registry of them.
//!
//! All state lives behind one mutex per breaker, so every read-modify-write
//! (including the half-open probe gate) is atomic.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::foundation::Timestamp;
use crate::ports::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerFactory, CircuitRejected,
    CircuitSnapshot, CircuitState, Permit,
};

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Timestamp>,
    /// Monotonic instant after which a probe may be admitted.
    next_attempt: Option<Instant>,
    /// Wall-clock rendering of `next_attempt` for snapshots.
    next_attempt_time: Option<Timestamp>,
    probe_in_flight: bool,
    total_successes: u64,
    total_failures: u64,
    times_opened: u64,
}

impl Inner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            next_attempt: None,
            next_attempt_time: None,
            probe_in_flight: false,
            total_successes: 0,
            total_failures: 0,
            times_opened: 0,
        }
    }
}

/// Circuit breaker for a single provider.
#[derive(Debug)]
pub struct InMemoryCircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl InMemoryCircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::closed()),
        }
    }

    /// Provider this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn trip(&self, inner: &mut Inner) {
        let now = Instant::now();
        inner.state = CircuitState::Open;
        inner.probe_in_flight = false;
        inner.next_attempt = Some(now + self.config.cooldown);
        inner.next_attempt_time = Some(Timestamp::now().plus_secs(ceil_secs(self.config.cooldown)));
        inner.times_opened += 1;
        tracing::info!(
            provider = %self.name,
            failures = inner.failure_count,
            cooldown_ms = self.config.cooldown.as_millis() as u64,
            "circuit opened"
        );
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

impl CircuitBreaker for InMemoryCircuitBreaker {
    fn try_acquire(&self) -> Result<Permit, CircuitRejected> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::Normal),
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(CircuitRejected {
                        retry_after: Duration::ZERO,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(Permit::Probe)
                }
            }
            CircuitState::Open => {
                let now = Instant::now();
                match inner.next_attempt {
                    Some(at) if now < at => Err(CircuitRejected {
                        retry_after: at - now,
                    }),
                    _ => {
                        tracing::debug!(provider = %self.name, "circuit half-open, admitting probe");
                        inner.state = CircuitState::HalfOpen;
                        inner.probe_in_flight = true;
                        Ok(Permit::Probe)
                    }
                }
            }
        }
    }

    fn record_success(&self, permit: Permit) {
        let mut inner = self.lock();
        inner.total_successes += 1;
        match permit {
            Permit::Probe => {
                tracing::info!(provider = %self.name, "probe succeeded, circuit closed");
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.probe_in_flight = false;
                inner.next_attempt = None;
                inner.next_attempt_time = None;
            }
            Permit::Normal => {
                if inner.state == CircuitState::Closed {
                    inner.failure_count = 0;
                }
            }
        }
    }

    fn record_failure(&self, permit: Permit) {
        let mut inner = self.lock();
        inner.total_failures += 1;
        inner.last_failure_time = Some(Timestamp::now());
        match permit {
            Permit::Probe => {
                tracing::debug!(provider = %self.name, "probe failed");
                self.trip(&mut inner);
            }
            Permit::Normal => {
                // Late failures from calls admitted before the trip do not extend the cooldown.
                if inner.state != CircuitState::Closed {
                    return;
                }
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.trip(&mut inner);
                }
            }
        }
    }

    fn release(&self, permit: Permit) {
        if permit == Permit::Probe {
            let mut inner = self.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.probe_in_flight = false;
            }
        }
    }

    fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            status: inner.state,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_time,
            next_attempt_time: inner.next_attempt_time,
            threshold: self.config.failure_threshold,
            timeout_ms: self.config.cooldown.as_millis() as u64,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            times_opened: inner.times_opened,
        }
    }

    fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.probe_in_flight = false;
        inner.next_attempt = None;
        inner.next_attempt_time = None;
    }
}

/// Lazily creates one breaker per provider, all sharing one configuration.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<InMemoryCircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

impl CircuitBreakerFactory for CircuitBreakerRegistry {
    fn breaker_for(&self, provider: &str) -> Arc<dyn CircuitBreaker> {
        let breaker = self
            .breakers
            .entry(provider.to_string())
            .or_insert_with(|| {
                Arc::new(InMemoryCircuitBreaker::new(provider, self.config.clone()))
            })
            .value()
            .clone();
        breaker
    }

    fn snapshots(&self) -> Vec<(String, CircuitSnapshot)> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> InMemoryCircuitBreaker {
        InMemoryCircuitBreaker::new(
            "primary",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_secs(cooldown_secs),
            },
        )
    }

    fn fail(b: &InMemoryCircuitBreaker) {
        let permit = b.try_acquire().unwrap();
        b.record_failure(permit);
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_failures() {
        let b = breaker(3, 60);
        fail(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
        fail(&b);

        assert_eq!(b.state(), CircuitState::Open);
        let rejected = b.try_acquire().unwrap_err();
        assert_eq!(rejected.retry_after, Duration::from_secs(60));
        assert_eq!(b.snapshot().times_opened, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_failures() {
        let b = breaker(2, 60);
        fail(&b);
        let permit = b.try_acquire().unwrap();
        b.record_success(permit);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_exactly_one_probe() {
        let b = breaker(1, 10);
        fail(&b);
        tokio::time::advance(Duration::from_secs(10)).await;

        let probe = b.try_acquire().unwrap();
        assert_eq!(probe, Permit::Probe);
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.try_acquire().is_err());

        b.record_success(probe);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.snapshot().failure_count, 0);
        assert_eq!(b.try_acquire().unwrap(), Permit::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens_with_fresh_cooldown() {
        let b = breaker(1, 10);
        fail(&b);
        tokio::time::advance(Duration::from_secs(10)).await;

        let probe = b.try_acquire().unwrap();
        b.record_failure(probe);

        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(
            b.try_acquire().unwrap_err().retry_after,
            Duration::from_secs(10)
        );
        assert_eq!(b.snapshot().times_opened, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn released_probe_lets_next_caller_probe() {
        let b = breaker(1, 1);
        fail(&b);
        tokio::time::advance(Duration::from_secs(1)).await;

        let probe = b.try_acquire().unwrap();
        b.release(probe);

        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert_eq!(b.try_acquire().unwrap(), Permit::Probe);
    }

    #[tokio::test(start_paused = true)]
    async fn late_failure_after_trip_does_not_extend_cooldown() {
        let b = breaker(1, 10);
        let early = b.try_acquire().unwrap();
        fail(&b);
        tokio::time::advance(Duration::from_secs(5)).await;
        b.record_failure(early);

        assert_eq!(
            b.try_acquire().unwrap_err().retry_after,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn reset_closes_the_circuit() {
        let b = breaker(1, 60);
        fail(&b);
        b.reset();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.snapshot().next_attempt_time.is_none());
    }

    #[test]
    fn registry_reuses_breakers_per_provider() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        });

        let a = registry.breaker_for("openai");
        a.record_failure(a.try_acquire().unwrap());

        assert_eq!(registry.breaker_for("openai").state(), CircuitState::Open);
        assert_eq!(registry.breaker_for("anthropic").state(), CircuitState::Closed);

        let names: Vec<_> = registry.snapshots().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["anthropic", "openai"]);
    }
}
