//! Capability registry configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::capability::{RegistryConfig, DEFAULT_HISTORY_SIZE, DEFAULT_MAX_FALLBACK_DEPTH};

#[derive(Debug, Clone, Deserialize)]
pub struct CapabilitiesConfig {
    /// Execution records kept per capability
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    #[serde(default = "default_max_fallback_depth")]
    pub max_fallback_depth: usize,

    /// Minimum spacing between calls counted against a burst allowance
    #[serde(default = "default_burst_interval")]
    pub burst_interval_ms: u64,
}

impl CapabilitiesConfig {
    pub fn registry(&self) -> RegistryConfig {
        RegistryConfig {
            history_size: self.history_size,
            max_fallback_depth: self.max_fallback_depth,
        }
    }

    pub fn burst_interval(&self) -> Duration {
        Duration::from_millis(self.burst_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.history_size == 0 {
            return Err(ValidationError::MustBePositive {
                field: "capabilities.history_size",
            });
        }
        if self.max_fallback_depth > 10 {
            return Err(ValidationError::TooLarge {
                field: "capabilities.max_fallback_depth",
                max: 10,
            });
        }
        Ok(())
    }
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            max_fallback_depth: default_max_fallback_depth(),
            burst_interval_ms: default_burst_interval(),
        }
    }
}

fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}

fn default_max_fallback_depth() -> usize {
    DEFAULT_MAX_FALLBACK_DEPTH
}

fn default_burst_interval() -> u64 {
    1_000
}
