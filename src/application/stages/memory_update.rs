//! MemoryUpdate step: session state and semantic indexing of the request.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::context_analysis::USER_MESSAGE_ID;
use super::keys::{self, SessionState};
use super::validated_event;
use crate::domain::foundation::{ConversationId, DomainError, MessageId, Timestamp};
use crate::domain::pipeline::{
    ContextDataError, PersonaChoice, PipelineContext, PipelineStep, StepError,
};
use crate::ports::{Embedder, MemoryRecord, SemanticMemory, ShortTermMemory};

/// Writes the next session state and indexes the caller's message.
///
/// The two writes are independent and run concurrently; either may fail
/// without stopping the other.
pub struct UpdateMemoryStep {
    pub short_term: Arc<dyn ShortTermMemory>,
    pub semantic: Arc<dyn SemanticMemory>,
    pub embedder: Arc<dyn Embedder>,
    pub ttl: Duration,
}

impl UpdateMemoryStep {
    async fn index_message(
        &self,
        id: MessageId,
        text: &str,
        caller_id: &str,
        conversation_id: ConversationId,
    ) -> Result<(), DomainError> {
        let embedding = self.embedder.embed(text).await?;
        let record = MemoryRecord::new(id.to_string(), text, embedding)
            .with_metadata("caller_id", caller_id)
            .with_metadata("conversation_id", conversation_id.to_string())
            .with_metadata("role", "user")
            .with_metadata("kind", "message");
        self.semantic.upsert(record).await
    }
}

#[async_trait]
impl PipelineStep for UpdateMemoryStep {
    fn name(&self) -> &'static str {
        "update_memory"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let event = validated_event(ctx)?;
        let previous: SessionState = ctx.get(keys::SESSION_STATE)?.unwrap_or_default();
        let persona: Option<PersonaChoice> = ctx.get(keys::PERSONA)?;
        let conversation_id: Option<ConversationId> = ctx.get(keys::CONVERSATION_ID)?;
        let user_message_id: Option<MessageId> = ctx.get(USER_MESSAGE_ID)?;

        let next = SessionState {
            turns: previous.turns.saturating_add(1),
            last_persona: persona.map(|p| p.persona_id).or(previous.last_persona),
            conversation_id: conversation_id.or(previous.conversation_id),
            updated_at: Some(Timestamp::now()),
        };
        let encoded = serde_json::to_string(&next).map_err(|e| ContextDataError::Encode {
            key: keys::SESSION_STATE.to_string(),
            message: e.to_string(),
        })?;
        let key = SessionState::storage_key(event.session_id.as_str());

        let cache_write = self.short_term.set(&key, &encoded, self.ttl);
        let index_write = async {
            match (event.payload.as_chat(), user_message_id, conversation_id) {
                (Some(chat), Some(id), Some(conversation_id)) => {
                    self.index_message(id, &chat.message, event.caller_id.as_str(), conversation_id)
                        .await
                }
                _ => Ok(()),
            }
        };
        let (cached, indexed) = tokio::join!(cache_write, index_write);

        match (cached, indexed) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err.into()),
            (Err(cache), Err(index)) => Err(DomainError::new(
                cache.code,
                format!("{}; {}", cache.message, index.message),
            )
            .into()),
        }
    }
}
