//! Routing errors and per-provider attempt records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a single provider in the chain fared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The provider produced the response.
    Served,
    /// The provider was called and failed.
    Failed { reason: String },
    /// The breaker rejected the call without contacting the provider.
    CircuitOpen { retry_after_ms: u64 },
    /// No enabled adapter is registered for the provider.
    Unavailable,
}

/// One provider visited while routing a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider: String,
    pub model: String,
    /// Calls made, retries included. Zero when the provider was skipped.
    pub tries: u32,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl ProviderAttempt {
    /// Human-readable failure reason, `None` for the serving attempt.
    pub fn failure_reason(&self) -> Option<String> {
        match &self.outcome {
            AttemptOutcome::Served => None,
            AttemptOutcome::Failed { reason } => Some(reason.clone()),
            AttemptOutcome::CircuitOpen { .. } => Some(format!("circuit open for {}", self.provider)),
            AttemptOutcome::Unavailable => Some(format!("provider {} unavailable", self.provider)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("unknown model '{model}'")]
    UnknownModel { model: String },

    #[error("all {} providers failed", attempts.len())]
    AllProvidersFailed { attempts: Vec<ProviderAttempt> },

    #[error("routing cancelled")]
    Cancelled,
}
