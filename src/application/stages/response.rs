//! ResponseGeneration step.

use async_trait::async_trait;
use std::sync::Arc;

use super::keys::{self, CallerContext};
use super::validated_event;
use crate::domain::capability::CapabilityExecutionResult;
use crate::domain::catalog::{Catalog, ModelSelection};
use crate::domain::foundation::{ConversationId, ErrorCode};
use crate::domain::pipeline::{PersonaChoice, PipelineContext, PipelineStep, StepError};
use crate::domain::routing::{ProviderRouter, RouteHints};
use crate::ports::{Message, ProviderRequest, RequestMetadata, StoredMessage};

/// Provider-facing message list: recalled memory, capability outcome,
/// windowed history, then the new user message.
pub fn assemble_messages(
    excerpts: &[String],
    capability: Option<&CapabilityExecutionResult>,
    history: &[StoredMessage],
    message: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    if !excerpts.is_empty() {
        messages.push(Message::system(format!(
            "Relevant things the caller has said before:\n- {}",
            excerpts.join("\n- ")
        )));
    }
    if let Some(result) = capability {
        let note = match (&result.output, &result.error) {
            (Some(output), _) if result.success => {
                format!("Result of capability '{}': {}", result.capability, output)
            }
            (_, Some(error)) => format!("Capability '{}' failed: {}", result.capability, error),
            _ => format!("Capability '{}' returned nothing", result.capability),
        };
        messages.push(Message::system(note));
    }
    messages.extend(history.iter().map(StoredMessage::to_message));
    messages.push(Message::user(message));
    messages
}

/// Generates the reply through the provider router. Chat only.
pub struct GenerateResponseStep {
    pub catalog: Arc<Catalog>,
    pub router: Arc<ProviderRouter>,
}

#[async_trait]
impl PipelineStep for GenerateResponseStep {
    fn name(&self) -> &'static str {
        "generate_response"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let event = validated_event(ctx)?;
        let Some(chat) = event.payload.as_chat() else {
            return Ok(());
        };
        let caller: CallerContext = ctx.require(keys::CALLER)?;
        let choice: PersonaChoice = ctx.require(keys::PERSONA)?;
        let selection: ModelSelection = ctx.require(keys::MODEL)?;
        let conversation_id: ConversationId = ctx.require(keys::CONVERSATION_ID)?;
        let history: Vec<StoredMessage> = ctx.get(keys::HISTORY)?.unwrap_or_default();
        let excerpts: Vec<String> = ctx.get(keys::MEMORY_EXCERPTS)?.unwrap_or_default();
        let capability: Option<CapabilityExecutionResult> = ctx.get(keys::CAPABILITY_RESULT)?;

        let persona = self.catalog.persona(&choice.persona_id).ok_or_else(|| {
            StepError::rejected(
                ErrorCode::PersonaNotFound,
                format!("persona '{}' does not exist", choice.persona_id),
            )
        })?;

        let metadata = RequestMetadata::new(
            caller.caller_id.clone(),
            event.session_id.clone(),
            ctx.event().id().to_string(),
        )
        .with_conversation(conversation_id);
        let request = ProviderRequest::new(selection.model.clone(), metadata)
            .with_system_prompt(persona.system_prompt.clone())
            .with_messages(assemble_messages(
                &excerpts,
                capability.as_ref(),
                &history,
                &chat.message,
            ));

        let mut hints = RouteHints::default()
            .with_fallback_providers(ctx.event().fallback_chain().to_vec())
            .with_cancellation(ctx.cancellation().clone());
        if let Some(plan) = caller.plan.and_then(|tier| self.catalog.plan(tier)) {
            hints = hints.with_plan(plan.clone());
        }

        let response = self.router.call(request, hints).await?;
        ctx.insert(keys::RESPONSE, &response)?;
        Ok(())
    }
}
