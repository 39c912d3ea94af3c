//! Provider routing configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::routing::RetryPolicy;
use crate::ports::CircuitBreakerConfig;

/// Circuit breaker and retry settings shared by every provider.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Consecutive failures before a provider's circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before admitting a probe
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Attempts per provider, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Deadline for one provider attempt
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,
}

impl RoutingConfig {
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::MustBePositive {
                field: "routing.failure_threshold",
            });
        }
        if self.max_attempts == 0 {
            return Err(ValidationError::MustBePositive {
                field: "routing.max_attempts",
            });
        }
        if self.max_attempts > 10 {
            return Err(ValidationError::TooLarge {
                field: "routing.max_attempts",
                max: 10,
            });
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ValidationError::MustBePositive {
                field: "routing.attempt_timeout_ms",
            });
        }
        Ok(())
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            attempt_timeout_ms: default_attempt_timeout(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    200
}

fn default_retry_max_delay() -> u64 {
    5_000
}

fn default_attempt_timeout() -> u64 {
    30_000
}
