//! Capability error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::ErrorCode;

/// Why a capability execution did not succeed.
///
/// Apart from `NotFound`, these travel inside a `CapabilityExecutionResult`
/// rather than as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityError {
    #[error("capability '{name}' not found")]
    NotFound { name: String },

    #[error("invalid parameters for '{name}': {message}")]
    InvalidParameters {
        name: String,
        field: String,
        message: String,
    },

    #[error("rate limit exceeded for '{name}', retry after {retry_after_secs}s")]
    RateLimited { name: String, retry_after_secs: u64 },

    #[error("capability '{name}' requires an authenticated caller")]
    Unauthorized { name: String },

    #[error("capability '{name}' timed out after {timeout_ms}ms")]
    TimedOut { name: String, timeout_ms: u64 },

    #[error("capability '{name}' was cancelled")]
    Cancelled { name: String },

    #[error("capability '{name}' failed: {message}")]
    HandlerFailed { name: String, message: String },
}

impl CapabilityError {
    /// Terminal failures never trigger a fallback.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CapabilityError::NotFound { .. }
                | CapabilityError::InvalidParameters { .. }
                | CapabilityError::Unauthorized { .. }
                | CapabilityError::Cancelled { .. }
        )
    }

    /// Short label used in execution history and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CapabilityError::NotFound { .. } => "not_found",
            CapabilityError::InvalidParameters { .. } => "invalid_parameters",
            CapabilityError::RateLimited { .. } => "rate_limited",
            CapabilityError::Unauthorized { .. } => "unauthorized",
            CapabilityError::TimedOut { .. } => "timed_out",
            CapabilityError::Cancelled { .. } => "cancelled",
            CapabilityError::HandlerFailed { .. } => "handler_failed",
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CapabilityError::NotFound { .. } => ErrorCode::CapabilityNotFound,
            CapabilityError::InvalidParameters { .. } => ErrorCode::ValidationFailed,
            CapabilityError::RateLimited { .. } => ErrorCode::RateLimited,
            CapabilityError::Unauthorized { .. } => ErrorCode::Unauthorized,
            CapabilityError::TimedOut { .. } => ErrorCode::Timeout,
            CapabilityError::Cancelled { .. } => ErrorCode::Cancelled,
            CapabilityError::HandlerFailed { .. } => ErrorCode::InternalError,
        }
    }
}

/// Errors from registry management operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("capability '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("capability '{name}' is invalid: {reason}")]
    SchemaInvalid { name: String, reason: String },

    #[error("capability '{name}' not found")]
    NotFound { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_mentions_timed_out() {
        let err = CapabilityError::TimedOut {
            name: "slow".into(),
            timeout_ms: 10,
        };
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn terminal_failures_do_not_fall_back() {
        assert!(CapabilityError::Unauthorized { name: "x".into() }.is_terminal());
        assert!(!CapabilityError::HandlerFailed {
            name: "x".into(),
            message: "boom".into()
        }
        .is_terminal());
        assert!(!CapabilityError::RateLimited {
            name: "x".into(),
            retry_after_secs: 1
        }
        .is_terminal());
        assert!(!CapabilityError::TimedOut {
            name: "x".into(),
            timeout_ms: 10
        }
        .is_terminal());
        assert!(CapabilityError::Cancelled { name: "x".into() }.is_terminal());
    }

    #[test]
    fn error_serializes_with_kind_tag() {
        let err = CapabilityError::RateLimited {
            name: "x".into(),
            retry_after_secs: 7,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "rate_limited");
        assert_eq!(json["retry_after_secs"], 7);
    }
}
