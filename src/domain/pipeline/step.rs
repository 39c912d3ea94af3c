//! The unit of work inside a stage.

use async_trait::async_trait;
use thiserror::Error;

use super::{ContextDataError, PipelineContext};
use crate::domain::capability::CapabilityError;
use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};
use crate::domain::routing::RoutingError;

/// One step of a pipeline stage.
///
/// Steps of a stage are awaited in registration order and receive exclusive
/// access to the request's context.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Short name used in logs and issue records.
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError>;
}

#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A policy check refused the request.
    #[error("{message}")]
    Rejected { code: ErrorCode, message: String },

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Store(#[from] DomainError),

    #[error(transparent)]
    Data(#[from] ContextDataError),

    #[error("step cancelled")]
    Cancelled,
}

impl StepError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        StepError::Rejected {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            StepError::Validation(_) => ErrorCode::ValidationFailed,
            StepError::Rejected { code, .. } => *code,
            StepError::Routing(RoutingError::UnknownModel { .. }) => ErrorCode::ModelNotFound,
            StepError::Routing(RoutingError::AllProvidersFailed { .. }) => {
                ErrorCode::ServiceUnavailable
            }
            StepError::Routing(RoutingError::Cancelled) | StepError::Cancelled => {
                ErrorCode::Cancelled
            }
            StepError::Capability(err) => err.code(),
            StepError::Store(err) => err.code,
            StepError::Data(_) => ErrorCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_underlying_error() {
        assert_eq!(
            StepError::from(ValidationError::empty_field("message")).code(),
            ErrorCode::ValidationFailed
        );
        assert_eq!(
            StepError::from(RoutingError::AllProvidersFailed { attempts: vec![] }).code(),
            ErrorCode::ServiceUnavailable
        );
        assert_eq!(
            StepError::rejected(ErrorCode::TaskNotAllowed, "no").code(),
            ErrorCode::TaskNotAllowed
        );
        assert_eq!(
            StepError::from(DomainError::storage("disk")).code(),
            ErrorCode::StorageError
        );
    }
}
