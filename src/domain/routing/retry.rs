//! Retry with exponential backoff inside a single provider call.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::domain::foundation::CancellationSignal;
use crate::ports::ProviderError;

/// How one provider call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts against the same provider, including the first.
    pub max_attempts: u32,
    /// Base backoff; attempt `n` waits `base * 2^n` plus up to `base` of jitter.
    pub base_delay: Duration,
    /// Upper bound on a single backoff.
    pub max_delay: Duration,
    /// Deadline for each individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (0-based), jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp = base_ms.saturating_mul(1u64 << attempt.min(20));
        let jitter = if base_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..base_ms)
        };
        Duration::from_millis(exp.saturating_add(jitter)).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails terminally, exhausts its attempts
    /// or `cancel` fires. Returns the final outcome and the attempts made.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationSignal,
        mut op: F,
    ) -> (Result<T, ProviderError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let timeout_ms = self.attempt_timeout.as_millis() as u64;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return (Err(ProviderError::Cancelled), attempt),
                res = tokio::time::timeout(self.attempt_timeout, op()) => {
                    res.unwrap_or(Err(ProviderError::timeout(timeout_ms)))
                }
            };

            let err = match outcome {
                Ok(value) => return (Ok(value), attempt),
                Err(err) => err,
            };
            if !err.is_retryable() || attempt >= max_attempts {
                return (Err(err), attempt);
            }

            let delay = self.delay_for(attempt - 1);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying provider call");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return (Err(ProviderError::Cancelled), attempt),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
