//! Default pipeline steps and their wiring.
//!
//! | Stage               | Steps                                                   |
//! |---------------------|---------------------------------------------------------|
//! | Ingest              | `ingest`                                                |
//! | Validate            | `validate`                                              |
//! | ContextAnalysis     | `load_caller`, `load_session_state`*, `recall_memory`*, |
//! |                     | `load_history`, `context_hash`                          |
//! | PersonalityRouting  | `select_persona`                                        |
//! | CapabilityExecution | `execute_capability`                                    |
//! | MemoryUpdate        | `update_memory`*                                        |
//! | ResponseGeneration  | `generate_response`                                     |
//! | FeedbackLoop        | `record_exchange`, `index_reply`*, `record_usage`*      |
//!
//! Steps marked * are best-effort: a failure becomes a warning.

mod capability;
mod context_analysis;
mod feedback;
mod intake;
pub mod keys;
mod memory_update;
mod personality;
mod response;

pub use capability::{discover_capabilities, ExecuteCapabilityStep};
pub use context_analysis::{
    ContextHashStep, LoadCallerStep, LoadHistoryStep, LoadSessionStateStep, RecallMemoryStep,
    USER_MESSAGE_ID,
};
pub use feedback::{IndexReplyStep, RecordExchangeStep, RecordUsageStep};
pub use intake::{IngestStep, ValidateStep};
pub use memory_update::UpdateMemoryStep;
pub use personality::SelectPersonaStep;
pub use response::{assemble_messages, GenerateResponseStep};

use std::sync::Arc;
use std::time::Duration;

use crate::domain::capability::CapabilityRegistry;
use crate::domain::catalog::Catalog;
use crate::domain::pipeline::{
    ContextDataError, PipelineContext, PipelineEngine, PipelineStage, StageObserver, StepError,
    ValidatedEvent,
};
use crate::domain::routing::ProviderRouter;
use crate::ports::{Embedder, HistoryStore, ProfileStore, SemanticMemory, ShortTermMemory};

/// Tunables consumed by the default steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSettings {
    pub short_term_ttl: Duration,
    /// Memory excerpts recalled per chat request.
    pub excerpt_count: usize,
    /// Minimum cosine similarity for a recalled excerpt.
    pub min_excerpt_score: f32,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            short_term_ttl: Duration::from_secs(30 * 60),
            excerpt_count: 3,
            min_excerpt_score: 0.25,
        }
    }
}

/// Collaborators shared by the default steps.
#[derive(Clone)]
pub struct PipelineDeps {
    pub catalog: Arc<Catalog>,
    pub registry: Arc<CapabilityRegistry>,
    pub router: Arc<ProviderRouter>,
    pub profiles: Arc<dyn ProfileStore>,
    pub history: Arc<dyn HistoryStore>,
    pub short_term: Arc<dyn ShortTermMemory>,
    pub semantic: Arc<dyn SemanticMemory>,
    pub embedder: Arc<dyn Embedder>,
    pub settings: StageSettings,
}

/// Builds the engine with every default step registered.
pub fn build_pipeline(
    deps: &PipelineDeps,
    observers: impl IntoIterator<Item = Arc<dyn StageObserver>>,
) -> PipelineEngine {
    let mut builder = PipelineEngine::builder()
        .step(PipelineStage::Ingest, Arc::new(IngestStep))
        .step(PipelineStage::Validate, Arc::new(ValidateStep))
        .step(
            PipelineStage::ContextAnalysis,
            Arc::new(LoadCallerStep {
                catalog: Arc::clone(&deps.catalog),
                profiles: Arc::clone(&deps.profiles),
            }),
        )
        .best_effort_step(
            PipelineStage::ContextAnalysis,
            Arc::new(LoadSessionStateStep {
                short_term: Arc::clone(&deps.short_term),
            }),
        )
        .best_effort_step(
            PipelineStage::ContextAnalysis,
            Arc::new(RecallMemoryStep {
                semantic: Arc::clone(&deps.semantic),
                embedder: Arc::clone(&deps.embedder),
                excerpt_count: deps.settings.excerpt_count,
                min_score: deps.settings.min_excerpt_score,
            }),
        )
        .step(
            PipelineStage::ContextAnalysis,
            Arc::new(LoadHistoryStep {
                history: Arc::clone(&deps.history),
            }),
        )
        .step(PipelineStage::ContextAnalysis, Arc::new(ContextHashStep))
        .step(
            PipelineStage::PersonalityRouting,
            Arc::new(SelectPersonaStep {
                catalog: Arc::clone(&deps.catalog),
            }),
        )
        .step(
            PipelineStage::CapabilityExecution,
            Arc::new(ExecuteCapabilityStep {
                registry: Arc::clone(&deps.registry),
            }),
        )
        .best_effort_step(
            PipelineStage::MemoryUpdate,
            Arc::new(UpdateMemoryStep {
                short_term: Arc::clone(&deps.short_term),
                semantic: Arc::clone(&deps.semantic),
                embedder: Arc::clone(&deps.embedder),
                ttl: deps.settings.short_term_ttl,
            }),
        )
        .step(
            PipelineStage::ResponseGeneration,
            Arc::new(GenerateResponseStep {
                catalog: Arc::clone(&deps.catalog),
                router: Arc::clone(&deps.router),
            }),
        )
        .step(
            PipelineStage::FeedbackLoop,
            Arc::new(RecordExchangeStep {
                history: Arc::clone(&deps.history),
            }),
        )
        .best_effort_step(
            PipelineStage::FeedbackLoop,
            Arc::new(IndexReplyStep {
                semantic: Arc::clone(&deps.semantic),
                embedder: Arc::clone(&deps.embedder),
            }),
        )
        .best_effort_step(
            PipelineStage::FeedbackLoop,
            Arc::new(RecordUsageStep {
                profiles: Arc::clone(&deps.profiles),
            }),
        );
    for observer in observers {
        builder = builder.observer(observer);
    }
    builder.build()
}

/// The decoded event, present once the Validate stage has run.
pub(crate) fn validated_event(ctx: &PipelineContext) -> Result<ValidatedEvent, StepError> {
    ctx.validated().cloned().ok_or_else(|| {
        ContextDataError::Missing {
            key: "validated_event".to_string(),
        }
        .into()
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::adapters::ai::MockProviderAdapter;
    use crate::adapters::history::InMemoryHistoryStore;
    use crate::adapters::memory::{HashingEmbedder, InMemoryShortTermMemory, InMemorySemanticMemory};
    use crate::adapters::profile::InMemoryProfileStore;
    use crate::adapters::rate_limiter::SlidingWindowRateLimiter;
    use crate::adapters::resilience::CircuitBreakerRegistry;
    use crate::domain::foundation::UserId;
    use crate::ports::CallerProfile;

    /// In-memory collaborators with handles kept for assertions.
    pub struct Fixture {
        pub deps: PipelineDeps,
        pub profiles: InMemoryProfileStore,
        pub history: InMemoryHistoryStore,
        pub short_term: InMemoryShortTermMemory,
        pub semantic: InMemorySemanticMemory,
        pub openai: MockProviderAdapter,
        pub anthropic: MockProviderAdapter,
    }

    pub fn fixture() -> Fixture {
        let catalog = Arc::new(Catalog::default());
        let openai = MockProviderAdapter::new("openai", &["gpt-4o", "gpt-4o-mini"])
            .with_fallback_priority(1);
        let anthropic = MockProviderAdapter::new("anthropic", &["claude-sonnet", "claude-haiku"])
            .with_fallback_priority(0);
        let router = ProviderRouter::new(
            Arc::clone(&catalog),
            Arc::new(CircuitBreakerRegistry::default()),
        )
        .with_adapter(Arc::new(openai.clone()))
        .with_adapter(Arc::new(anthropic.clone()));

        let profiles = InMemoryProfileStore::new().with_profiles([
            CallerProfile::new(UserId::new("alice").unwrap(), "pro"),
            CallerProfile::new(UserId::new("frank").unwrap(), "free"),
            CallerProfile::new(UserId::new("mallory").unwrap(), "platinum"),
        ]);
        let history = InMemoryHistoryStore::new();
        let short_term = InMemoryShortTermMemory::new();
        let semantic = InMemorySemanticMemory::new();

        let deps = PipelineDeps {
            catalog,
            registry: Arc::new(CapabilityRegistry::new(Arc::new(
                SlidingWindowRateLimiter::default(),
            ))),
            router: Arc::new(router),
            profiles: Arc::new(profiles.clone()),
            history: Arc::new(history.clone()),
            short_term: Arc::new(short_term.clone()),
            semantic: Arc::new(semantic.clone()),
            embedder: Arc::new(HashingEmbedder::default()),
            settings: StageSettings::default(),
        };
        Fixture {
            deps,
            profiles,
            history,
            short_term,
            semantic,
            openai,
            anthropic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::keys::{CallerContext, SessionState};
    use super::test_support::fixture;
    use super::*;
    use crate::domain::catalog::{ModelSelection, ModelSource, PlanTier};
    use crate::domain::foundation::{CancellationSignal, ErrorCode, UserId};
    use crate::domain::pipeline::{EventKind, PersonaChoice, PipelineError, PipelineEvent};
    use crate::domain::routing::RoutedResponse;
    use crate::adapters::ai::MockResponse;
    use crate::ports::{ProfileStore, ShortTermMemory, TokenUsage, UsageSnapshot};
    use serde_json::json;

    fn chat(caller: &str, payload: serde_json::Value) -> PipelineContext {
        PipelineContext::new(
            PipelineEvent::new(EventKind::Chat, caller, "session-1", payload),
            CancellationSignal::never(),
        )
    }

    fn rejection(err: PipelineError) -> (PipelineStage, ErrorCode) {
        (err.stage(), err.code())
    }

    #[test]
    fn every_stage_but_ingest_and_validate_has_domain_steps() {
        let f = fixture();
        let engine = build_pipeline(&f.deps, []);
        assert_eq!(engine.steps(PipelineStage::Ingest), vec!["ingest"]);
        assert_eq!(
            engine.steps(PipelineStage::ContextAnalysis),
            vec![
                "load_caller",
                "load_session_state",
                "recall_memory",
                "load_history",
                "context_hash"
            ]
        );
        assert_eq!(
            engine.steps(PipelineStage::FeedbackLoop),
            vec!["record_exchange", "index_reply", "record_usage"]
        );
    }

    #[tokio::test]
    async fn chat_runs_end_to_end_and_records_state() {
        let f = fixture();
        f.openai.enqueue(MockResponse::Success {
            content: "Paris.".into(),
            usage: TokenUsage::new(12, 3),
        });
        let engine = build_pipeline(&f.deps, []);
        let mut ctx = chat("alice", json!({"message": "What's the capital of France?"}));

        engine.run(&mut ctx).await.unwrap();

        let caller: CallerContext = ctx.require(keys::CALLER).unwrap();
        assert_eq!(caller.plan, Some(PlanTier::Pro));
        assert!(!caller.degraded);
        let persona: PersonaChoice = ctx.require(keys::PERSONA).unwrap();
        assert_eq!(persona.persona_id, "assistant");
        let model: ModelSelection = ctx.require(keys::MODEL).unwrap();
        assert_eq!(model.model, "gpt-4o-mini");
        let response: RoutedResponse = ctx.require(keys::RESPONSE).unwrap();
        assert_eq!(response.content, "Paris.");
        assert!(!response.metadata.fallback_used);
        assert!(ctx.contains(keys::MESSAGE_ID));
        assert_eq!(ctx.require::<String>(keys::CONTEXT_HASH).unwrap().len(), 64);
        assert!(ctx.warnings().is_empty());

        let usage = f
            .profiles
            .get_usage(&UserId::new("alice").unwrap())
            .await
            .unwrap();
        assert_eq!(usage.messages, 1);
        assert_eq!(f.semantic.len().await, 2);

        let raw = f
            .short_term
            .get(&SessionState::storage_key("session-1"))
            .await
            .unwrap()
            .unwrap();
        let state: SessionState = serde_json::from_str(&raw).unwrap();
        assert_eq!(state.turns, 1);
        assert_eq!(state.last_persona.as_deref(), Some("assistant"));
    }

    #[tokio::test]
    async fn unknown_chat_caller_is_rejected_before_routing() {
        let f = fixture();
        let engine = build_pipeline(&f.deps, []);
        let err = engine
            .run(&mut chat("ghost", json!({"message": "hi"})))
            .await
            .unwrap_err();

        assert_eq!(
            rejection(err),
            (PipelineStage::ContextAnalysis, ErrorCode::UserNotFound)
        );
        assert_eq!(f.openai.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let f = fixture();
        let engine = build_pipeline(&f.deps, []);
        let err = engine
            .run(&mut chat("mallory", json!({"message": "hi"})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPlan);
    }

    #[tokio::test]
    async fn unknown_target_persona_is_rejected() {
        let f = fixture();
        let engine = build_pipeline(&f.deps, []);
        let mut ctx = PipelineContext::new(
            PipelineEvent::new(EventKind::Chat, "alice", "s", json!({"message": "hi"}))
                .with_target_persona("pirate"),
            CancellationSignal::never(),
        );
        let err = engine.run(&mut ctx).await.unwrap_err();
        assert_eq!(
            rejection(err),
            (PipelineStage::PersonalityRouting, ErrorCode::PersonaNotFound)
        );
    }

    #[tokio::test]
    async fn targeted_persona_must_allow_the_task() {
        let f = fixture();
        let engine = build_pipeline(&f.deps, []);
        let mut ctx = PipelineContext::new(
            PipelineEvent::new(
                EventKind::Chat,
                "alice",
                "s",
                json!({"message": "write a poem", "task": "creative"}),
            )
            .with_target_persona("coach"),
            CancellationSignal::never(),
        );
        let err = engine.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TaskNotAllowed);
    }

    #[tokio::test]
    async fn coding_task_picks_a_persona_that_codes() {
        let f = fixture();
        let engine = build_pipeline(&f.deps, []);
        let mut ctx = chat("alice", json!({"message": "fix my loop", "task": "coding"}));
        engine.run(&mut ctx).await.unwrap();

        let persona: PersonaChoice = ctx.require(keys::PERSONA).unwrap();
        assert_eq!(persona.persona_id, "engineer");
        let model: ModelSelection = ctx.require(keys::MODEL).unwrap();
        assert_eq!(model.model, "claude-sonnet");
        assert_eq!(f.anthropic.call_count(), 1);
    }

    #[tokio::test]
    async fn free_plan_downgrades_disallowed_explicit_model() {
        let f = fixture();
        let engine = build_pipeline(&f.deps, []);
        let mut ctx = chat("frank", json!({"message": "hi", "model": "gpt-4o"}));
        engine.run(&mut ctx).await.unwrap();

        let model: ModelSelection = ctx.require(keys::MODEL).unwrap();
        assert_eq!(model.source, ModelSource::PlanDowngrade);
        assert_eq!(model.downgraded_from.as_deref(), Some("gpt-4o"));
        assert_eq!(model.model, "claude-haiku");
    }

    #[tokio::test]
    async fn unknown_explicit_model_is_rejected() {
        let f = fixture();
        let engine = build_pipeline(&f.deps, []);
        let err = engine
            .run(&mut chat("alice", json!({"message": "hi", "model": "gpt-9"})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ModelNotFound);
    }

    #[tokio::test]
    async fn exhausted_quota_degrades_history_window() {
        let f = fixture();
        let frank = UserId::new("frank").unwrap();
        let mut usage = UsageSnapshot::today();
        usage.messages = 50;
        f.profiles.set_usage(&frank, usage).await;
        let engine = build_pipeline(&f.deps, []);
        let mut ctx = chat("frank", json!({"message": "hi"}));

        engine.run(&mut ctx).await.unwrap();

        let caller: CallerContext = ctx.require(keys::CALLER).unwrap();
        assert!(caller.degraded);
        assert_eq!(caller.history_window, 5);
    }

    #[tokio::test]
    async fn corrupt_session_state_is_only_a_warning() {
        let f = fixture();
        f.short_term
            .set(
                &SessionState::storage_key("session-1"),
                "not json",
                std::time::Duration::from_secs(60),
            )
            .await
            .unwrap();
        let engine = build_pipeline(&f.deps, []);
        let mut ctx = chat("alice", json!({"message": "hi"}));

        engine.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.warnings().len(), 1);
        assert_eq!(ctx.warnings()[0].step, "load_session_state");
    }

    #[tokio::test]
    async fn recalled_memory_reaches_the_provider() {
        let f = fixture();
        let engine = build_pipeline(&f.deps, []);
        engine
            .run(&mut chat(
                "alice",
                json!({"message": "I really love hiking in the alps"}),
            ))
            .await
            .unwrap();
        f.openai.clear_calls();

        let mut ctx = chat("alice", json!({"message": "any hiking tips for the alps?"}));
        engine.run(&mut ctx).await.unwrap();

        let excerpts: Vec<String> = ctx.require(keys::MEMORY_EXCERPTS).unwrap();
        assert!(excerpts.iter().any(|e| e.contains("hiking")));
        let calls = f.openai.calls();
        assert!(calls[0].messages[0].content.contains("hiking in the alps"));
    }
}
