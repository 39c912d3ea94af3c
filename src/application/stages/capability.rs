//! CapabilityExecution step.

use async_trait::async_trait;
use std::sync::Arc;

use super::keys::{self, CallerContext, CapabilitySummary};
use super::validated_event;
use crate::domain::capability::{CapabilityExecutionContext, CapabilityRegistry};
use crate::domain::pipeline::{EventPayload, PipelineContext, PipelineStep, StepError};

/// Runs the requested capability, or answers an availability query.
///
/// An unknown capability fails the step. Every other capability failure is
/// an unsuccessful result stored for later stages.
pub struct ExecuteCapabilityStep {
    pub registry: Arc<CapabilityRegistry>,
}

/// Capabilities matching `query`, optionally narrowed to one category,
/// each with its execution statistics.
pub fn discover_capabilities(
    registry: &CapabilityRegistry,
    query: &str,
    category: Option<&str>,
) -> Vec<CapabilitySummary> {
    registry
        .search(query)
        .into_iter()
        .filter(|def| category.map_or(true, |c| def.category.eq_ignore_ascii_case(c)))
        .map(|def| CapabilitySummary {
            name: def.name.clone(),
            version: def.version.clone(),
            category: def.category.clone(),
            description: def.description.clone(),
            tags: def.metadata.tags.clone(),
            stats: registry.stats(&def.name),
        })
        .collect()
}

#[async_trait]
impl PipelineStep for ExecuteCapabilityStep {
    fn name(&self) -> &'static str {
        "execute_capability"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let event = validated_event(ctx)?;

        if let EventPayload::CapabilityAvailability(query) = &event.payload {
            let matches =
                discover_capabilities(&self.registry, &query.query, query.category.as_deref());
            tracing::debug!(query = %query.query, matches = matches.len(), "capability discovery");
            ctx.insert(keys::CAPABILITY_MATCHES, &matches)?;
            return Ok(());
        }

        let Some(call) = event.payload.capability_call() else {
            return Ok(());
        };
        let caller: CallerContext = ctx.require(keys::CALLER)?;

        let mut exec = CapabilityExecutionContext::new(call.parameters.clone())
            .with_session(event.session_id.clone())
            .with_cancellation(ctx.cancellation().clone());
        exec = if caller.is_known() {
            exec.with_caller(caller.caller_id.clone())
        } else {
            exec.with_unauthenticated_caller(caller.caller_id.clone())
        };

        let result = self.registry.execute(&call.name, exec).await?;
        if !result.success {
            tracing::warn!(
                capability = %result.capability,
                error = result.error.as_ref().map(|e| e.kind()).unwrap_or("unknown"),
                fallback_chain = ?result.fallback_chain,
                "capability execution failed"
            );
        }
        ctx.insert(keys::CAPABILITY_RESULT, &result)?;
        Ok(())
    }
}
