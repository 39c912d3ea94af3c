//! Errors surfaced by the request orchestrator.

use thiserror::Error;

use crate::domain::capability::CapabilityError;
use crate::domain::foundation::{ErrorCode, ValidationError};
use crate::domain::pipeline::{PipelineError, StepError};
use crate::domain::routing::RoutingError;

/// Failure of `route_message` or `process_event`.
///
/// Provider exhaustion is reported as `ServiceUnavailable` without the
/// per-provider detail, which stays in the logs.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("caller not found: {0}")]
    UserNotFound(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("invalid personality: {0}")]
    InvalidPersonality(String),

    #[error("task not allowed: {0}")]
    TaskNotAllowed(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("capability not found: {0}")]
    CapabilityNotFound(String),

    #[error("service temporarily unavailable")]
    ServiceUnavailable,

    #[error("request timed out")]
    Timeout,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestratorError::Validation(_) => ErrorCode::ValidationFailed,
            OrchestratorError::UserNotFound(_) => ErrorCode::UserNotFound,
            OrchestratorError::InvalidPlan(_) => ErrorCode::InvalidPlan,
            OrchestratorError::InvalidPersonality(_) => ErrorCode::PersonaNotFound,
            OrchestratorError::TaskNotAllowed(_) => ErrorCode::TaskNotAllowed,
            OrchestratorError::ModelNotFound(_) => ErrorCode::ModelNotFound,
            OrchestratorError::CapabilityNotFound(_) => ErrorCode::CapabilityNotFound,
            OrchestratorError::ServiceUnavailable => ErrorCode::ServiceUnavailable,
            OrchestratorError::Timeout => ErrorCode::Timeout,
            OrchestratorError::Storage(_) => ErrorCode::StorageError,
            OrchestratorError::Internal(_) => ErrorCode::InternalError,
        }
    }

    fn from_rejection(code: ErrorCode, message: String) -> Self {
        match code {
            ErrorCode::UserNotFound => OrchestratorError::UserNotFound(message),
            ErrorCode::InvalidPlan => OrchestratorError::InvalidPlan(message),
            ErrorCode::PersonaNotFound => OrchestratorError::InvalidPersonality(message),
            ErrorCode::TaskNotAllowed => OrchestratorError::TaskNotAllowed(message),
            ErrorCode::ModelNotFound => OrchestratorError::ModelNotFound(message),
            ErrorCode::CapabilityNotFound => OrchestratorError::CapabilityNotFound(message),
            ErrorCode::ServiceUnavailable => OrchestratorError::ServiceUnavailable,
            ErrorCode::Timeout | ErrorCode::Cancelled => OrchestratorError::Timeout,
            ErrorCode::StorageError | ErrorCode::CacheError => OrchestratorError::Storage(message),
            _ => OrchestratorError::Internal(message),
        }
    }
}

impl From<PipelineError> for OrchestratorError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Cancelled { .. } => OrchestratorError::Timeout,
            PipelineError::StageFailed { source, .. } => match source {
                StepError::Validation(err) => OrchestratorError::Validation(err),
                StepError::Rejected { code, message } => Self::from_rejection(code, message),
                StepError::Routing(RoutingError::AllProvidersFailed { .. }) => {
                    OrchestratorError::ServiceUnavailable
                }
                StepError::Routing(RoutingError::UnknownModel { model }) => {
                    OrchestratorError::ModelNotFound(model)
                }
                StepError::Routing(RoutingError::Cancelled) | StepError::Cancelled => {
                    OrchestratorError::Timeout
                }
                StepError::Capability(CapabilityError::NotFound { name }) => {
                    OrchestratorError::CapabilityNotFound(name)
                }
                StepError::Capability(other) => {
                    Self::from_rejection(other.code(), other.to_string())
                }
                StepError::Store(err) => Self::from_rejection(err.code, err.message),
                StepError::Data(err) => OrchestratorError::Internal(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::PipelineStage;
    use crate::domain::routing::ProviderAttempt;

    fn failed(source: StepError) -> PipelineError {
        PipelineError::StageFailed {
            stage: PipelineStage::ResponseGeneration,
            step: "generate_response",
            source,
        }
    }

    #[test]
    fn provider_exhaustion_hides_detail() {
        let err = OrchestratorError::from(failed(StepError::Routing(
            RoutingError::AllProvidersFailed {
                attempts: Vec::<ProviderAttempt>::new(),
            },
        )));
        assert!(matches!(err, OrchestratorError::ServiceUnavailable));
        assert_eq!(err.to_string(), "service temporarily unavailable");
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    }

    #[test]
    fn rejections_keep_their_code() {
        let err = OrchestratorError::from(failed(StepError::rejected(
            ErrorCode::PersonaNotFound,
            "persona 'pirate' does not exist",
        )));
        assert!(matches!(err, OrchestratorError::InvalidPersonality(_)));
        assert_eq!(err.code(), ErrorCode::PersonaNotFound);
    }

    #[test]
    fn cancellation_reads_as_timeout() {
        let err = OrchestratorError::from(PipelineError::Cancelled {
            stage: PipelineStage::ResponseGeneration,
        });
        assert_eq!(err.code(), ErrorCode::Timeout);
    }

    #[test]
    fn validation_names_the_field() {
        let err = OrchestratorError::from(failed(StepError::Validation(
            ValidationError::empty_field("payload.message"),
        )));
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert!(err.to_string().contains("payload.message"));
    }
}
