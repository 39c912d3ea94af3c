//! FeedbackLoop steps: persist the exchange, index the reply, count usage.

use async_trait::async_trait;
use std::sync::Arc;

use super::context_analysis::USER_MESSAGE_ID;
use super::keys::{self, CallerContext};
use super::validated_event;
use crate::domain::foundation::{ConversationId, MessageId};
use crate::domain::pipeline::{PipelineContext, PipelineStep, StepError};
use crate::domain::routing::RoutedResponse;
use crate::ports::{
    Embedder, HistoryStore, MemoryRecord, MessageRole, ProfileStore, SemanticMemory,
    StoredMessage, UsageDelta,
};

/// Appends the user message and the reply to the conversation. Chat only.
pub struct RecordExchangeStep {
    pub history: Arc<dyn HistoryStore>,
}

#[async_trait]
impl PipelineStep for RecordExchangeStep {
    fn name(&self) -> &'static str {
        "record_exchange"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let event = validated_event(ctx)?;
        let Some(chat) = event.payload.as_chat() else {
            return Ok(());
        };
        let response: RoutedResponse = ctx.require(keys::RESPONSE)?;
        let conversation_id: ConversationId = ctx.require(keys::CONVERSATION_ID)?;
        let user_message_id: MessageId = ctx.require(USER_MESSAGE_ID)?;

        let mut user = StoredMessage::new(conversation_id, MessageRole::User, chat.message.clone());
        user.id = user_message_id;
        let reply = StoredMessage::new(
            conversation_id,
            MessageRole::Assistant,
            response.content.clone(),
        )
        .with_model(response.metadata.model.clone());

        self.history.append(&[user, reply.clone()]).await?;
        ctx.insert(keys::MESSAGE_ID, &reply.id)?;
        Ok(())
    }
}

/// Indexes the reply in semantic memory. Best-effort.
pub struct IndexReplyStep {
    pub semantic: Arc<dyn SemanticMemory>,
    pub embedder: Arc<dyn Embedder>,
}

#[async_trait]
impl PipelineStep for IndexReplyStep {
    fn name(&self) -> &'static str {
        "index_reply"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let (Some(response), Some(message_id), Some(conversation_id)) = (
            ctx.get::<RoutedResponse>(keys::RESPONSE)?,
            ctx.get::<MessageId>(keys::MESSAGE_ID)?,
            ctx.get::<ConversationId>(keys::CONVERSATION_ID)?,
        ) else {
            return Ok(());
        };

        let embedding = self.embedder.embed(&response.content).await?;
        let record = MemoryRecord::new(message_id.to_string(), response.content, embedding)
            .with_metadata("caller_id", ctx.event().caller_id())
            .with_metadata("conversation_id", conversation_id.to_string())
            .with_metadata("role", "assistant")
            .with_metadata("kind", "message");
        self.semantic.upsert(record).await?;
        Ok(())
    }
}

/// Adds the exchange to the caller's daily usage. Best-effort.
pub struct RecordUsageStep {
    pub profiles: Arc<dyn ProfileStore>,
}

#[async_trait]
impl PipelineStep for RecordUsageStep {
    fn name(&self) -> &'static str {
        "record_usage"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let Some(response) = ctx.get::<RoutedResponse>(keys::RESPONSE)? else {
            return Ok(());
        };
        let caller: CallerContext = ctx.require(keys::CALLER)?;
        if !caller.is_known() {
            return Ok(());
        }

        let delta = UsageDelta {
            messages: 1,
            tokens: u64::from(response.metadata.usage.total_tokens),
            cost_micros: response.metadata.cost_micros,
        };
        let totals = self.profiles.increment_usage(&caller.caller_id, delta).await?;
        tracing::debug!(
            caller_id = %caller.caller_id,
            messages_today = totals.messages,
            cost_micros_today = totals.cost_micros,
            "usage recorded"
        );
        Ok(())
    }
}
