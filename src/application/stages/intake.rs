//! Ingest and Validate steps.

use async_trait::async_trait;

use super::keys::{self, Receipt};
use crate::domain::foundation::Timestamp;
use crate::domain::pipeline::{PipelineContext, PipelineStep, StepError};

/// Stamps receipt metadata. Touches nothing outside the context.
pub struct IngestStep;

#[async_trait]
impl PipelineStep for IngestStep {
    fn name(&self) -> &'static str {
        "ingest"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let event = ctx.event();
        let receipt = Receipt {
            event_id: event.id(),
            kind: event.kind(),
            priority: event.priority(),
            received_at: Timestamp::now(),
        };
        ctx.insert(keys::RECEIPT, &receipt)?;
        Ok(())
    }
}

/// Checks every caller-supplied field and attaches the decoded event.
pub struct ValidateStep;

#[async_trait]
impl PipelineStep for ValidateStep {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let validated = ctx.event().validate().map_err(|err| {
            tracing::debug!(event_id = %ctx.event().id(), field = err.field(), "event rejected");
            err
        })?;
        ctx.set_validated(validated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{CancellationSignal, ErrorCode};
    use crate::domain::pipeline::{EventKind, PipelineEvent};
    use serde_json::json;

    fn context(payload: serde_json::Value) -> PipelineContext {
        PipelineContext::new(
            PipelineEvent::new(EventKind::Chat, "alice", "session-1", payload).with_priority(7),
            CancellationSignal::never(),
        )
    }

    #[tokio::test]
    async fn ingest_records_receipt() {
        let mut ctx = context(json!({"message": "hi"}));
        IngestStep.run(&mut ctx).await.unwrap();

        let receipt: Receipt = ctx.require(keys::RECEIPT).unwrap();
        assert_eq!(receipt.event_id, ctx.event().id());
        assert_eq!(receipt.priority, 7);
        assert!(ctx.validated().is_none());
    }

    #[tokio::test]
    async fn validate_attaches_decoded_event() {
        let mut ctx = context(json!({"message": "hi"}));
        ValidateStep.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.validated().unwrap().caller_id.as_str(), "alice");
    }

    #[tokio::test]
    async fn validate_rejects_malformed_payload() {
        let mut ctx = context(json!({"message": ""}));
        let err = ValidateStep.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert!(ctx.validated().is_none());
    }
}
