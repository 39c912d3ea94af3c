//! ContextAnalysis steps: caller and plan, session state, recalled memory,
//! conversation history and the context hash.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::keys::{self, CallerContext, SessionState};
use super::validated_event;
use crate::domain::catalog::{Catalog, PlanTier};
use crate::domain::foundation::{ConversationId, ErrorCode, MessageId};
use crate::domain::pipeline::{
    context_hash, ContextDataError, ContextHashInput, EventKind, PipelineContext, PipelineStep,
    StepError,
};
use crate::ports::{
    Embedder, HistoryStore, MemoryFilter, ProfileStore, SemanticMemory, ShortTermMemory,
    StoredMessage, UsageSnapshot,
};

pub const USER_MESSAGE_ID: &str = "user_message_id";

/// Resolves the caller's profile, plan and quota state.
///
/// Chat requires a known caller on a configured plan. Capability events
/// accept unknown callers, who then run unauthenticated.
pub struct LoadCallerStep {
    pub catalog: Arc<Catalog>,
    pub profiles: Arc<dyn ProfileStore>,
}

#[async_trait]
impl PipelineStep for LoadCallerStep {
    fn name(&self) -> &'static str {
        "load_caller"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let event = validated_event(ctx)?;
        let profile = self.profiles.get_profile(&event.caller_id).await?;

        let caller = match profile {
            Some(profile) => {
                let tier: PlanTier = profile.plan.parse().map_err(|_| {
                    StepError::rejected(
                        ErrorCode::InvalidPlan,
                        format!("caller {} has unknown plan '{}'", event.caller_id, profile.plan),
                    )
                })?;
                let plan = self.catalog.plan(tier).ok_or_else(|| {
                    StepError::rejected(
                        ErrorCode::InvalidPlan,
                        format!("plan '{}' is not configured", tier),
                    )
                })?;
                let usage = self.profiles.get_usage(&event.caller_id).await?;
                let degraded = plan.quota_exhausted(usage.messages);
                if degraded {
                    tracing::info!(
                        caller_id = %event.caller_id,
                        messages = usage.messages,
                        plan = %tier,
                        "daily quota reached, degrading context"
                    );
                }
                CallerContext {
                    caller_id: event.caller_id.clone(),
                    plan: Some(tier),
                    preferred_persona: profile.preferred_persona,
                    usage,
                    degraded,
                    history_window: plan.history_window(degraded),
                }
            }
            None if ctx.event().kind() == EventKind::Chat => {
                return Err(StepError::rejected(
                    ErrorCode::UserNotFound,
                    format!("caller {} not found", event.caller_id),
                ));
            }
            None => CallerContext {
                caller_id: event.caller_id.clone(),
                plan: None,
                preferred_persona: None,
                usage: UsageSnapshot::today(),
                degraded: false,
                history_window: 0,
            },
        };

        ctx.insert(keys::CALLER, &caller)?;
        Ok(())
    }
}

/// Loads the session's short-term state. Best-effort.
pub struct LoadSessionStateStep {
    pub short_term: Arc<dyn ShortTermMemory>,
}

#[async_trait]
impl PipelineStep for LoadSessionStateStep {
    fn name(&self) -> &'static str {
        "load_session_state"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let key = SessionState::storage_key(ctx.event().session_id());
        let state = match self.short_term.get(&key).await? {
            Some(raw) => serde_json::from_str::<SessionState>(&raw).map_err(|e| {
                ContextDataError::Decode {
                    key: key.clone(),
                    message: e.to_string(),
                }
            })?,
            None => SessionState::default(),
        };
        ctx.insert(keys::SESSION_STATE, &state)?;
        Ok(())
    }
}

/// Pulls the caller's most relevant past statements from semantic memory.
/// Best-effort; chat only.
pub struct RecallMemoryStep {
    pub semantic: Arc<dyn SemanticMemory>,
    pub embedder: Arc<dyn Embedder>,
    pub excerpt_count: usize,
    pub min_score: f32,
}

#[async_trait]
impl PipelineStep for RecallMemoryStep {
    fn name(&self) -> &'static str {
        "recall_memory"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let event = validated_event(ctx)?;
        let Some(chat) = event.payload.as_chat() else {
            return Ok(());
        };
        if self.excerpt_count == 0 {
            return Ok(());
        }

        let embedding = self.embedder.embed(&chat.message).await?;
        let filter = MemoryFilter::new().with("caller_id", event.caller_id.as_str());
        let excerpts: Vec<String> = self
            .semantic
            .query(&embedding, self.excerpt_count, &filter)
            .await?
            .into_iter()
            .filter(|m| m.score >= self.min_score)
            .map(|m| m.record.text)
            .collect();

        tracing::debug!(count = excerpts.len(), "recalled memory excerpts");
        ctx.insert(keys::MEMORY_EXCERPTS, &excerpts)?;
        Ok(())
    }
}

/// Fixes the conversation and loads its history, windowed by plan. Chat only.
pub struct LoadHistoryStep {
    pub history: Arc<dyn HistoryStore>,
}

#[async_trait]
impl PipelineStep for LoadHistoryStep {
    fn name(&self) -> &'static str {
        "load_history"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let event = validated_event(ctx)?;
        let Some(chat) = event.payload.as_chat() else {
            return Ok(());
        };
        let caller: CallerContext = ctx.require(keys::CALLER)?;

        let history: Vec<StoredMessage> = match chat.conversation_id {
            Some(conversation_id) if caller.history_window > 0 => {
                self.history
                    .get_history(&conversation_id, caller.history_window)
                    .await?
            }
            _ => Vec::new(),
        };
        let conversation_id = chat.conversation_id.unwrap_or_default();

        ctx.insert(keys::CONVERSATION_ID, &conversation_id)?;
        ctx.insert(USER_MESSAGE_ID, &MessageId::new())?;
        ctx.insert(keys::HISTORY, &history)?;
        Ok(())
    }
}

/// Hashes the inputs a reply depends on.
pub struct ContextHashStep;

#[async_trait]
impl PipelineStep for ContextHashStep {
    fn name(&self) -> &'static str {
        "context_hash"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let caller: CallerContext = ctx.require(keys::CALLER)?;
        let session_state: Option<Value> = ctx.get(keys::SESSION_STATE)?;
        let excerpts: Vec<String> = ctx.get(keys::MEMORY_EXCERPTS)?.unwrap_or_default();
        let conversation: Option<ConversationId> = ctx.get(keys::CONVERSATION_ID)?;

        let event = ctx.event();
        let plan = caller.plan.map(|p| p.as_str()).unwrap_or("anonymous");
        let hash = context_hash(&ContextHashInput {
            caller_id: event.caller_id(),
            session_id: event.session_id(),
            kind: event.kind(),
            plan,
            payload: event.payload(),
            session_state: session_state.as_ref(),
            memory_excerpts: &excerpts,
        });
        if let Some(previous) = event.context_hash() {
            if previous != hash {
                tracing::debug!(
                    conversation_id = ?conversation,
                    "context changed since the caller's last hash"
                );
            }
        }

        ctx.insert(keys::CONTEXT_HASH, &hash)?;
        Ok(())
    }
}
