//! Request orchestrator - the entry point for inbound requests.
//!
//! `route_message` drives a chat message through the full pipeline:
//!
//! 1. validate caller and plan
//! 2. resolve persona, check the task is allowed
//! 3. check quota (exhausted quota shrinks the history window)
//! 4. assemble context: persona prompt, memory excerpts, windowed history
//! 5. select the model
//! 6. route to a provider
//! 7. persist and index both sides of the exchange
//! 8. count usage
//! 9. spawn memory extraction without waiting for it
//!
//! `process_event` runs the same pipeline for capability events.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::errors::OrchestratorError;
use super::memory_extraction::{ExtractionJob, MemoryExtractor};
use super::stages::keys::{self, CallerContext, CapabilitySummary};
use super::stages::{build_pipeline, PipelineDeps};
use crate::adapters::events::TracingStageObserver;
use crate::domain::capability::{CapabilityExecutionResult, CapabilityRegistry};
use crate::domain::catalog::{Catalog, ModelSelection, TaskKind};
use crate::domain::foundation::{
    cancellation_pair, ConversationId, EventId, MessageId, ValidationError,
};
use crate::domain::pipeline::{
    CapabilityCall, EventKind, PersonaChoice, PipelineContext, PipelineEngine, PipelineEvent,
    PipelineIssue, StageObserver, StageTiming,
};
use crate::domain::routing::{ProviderRouter, RoutedResponse, RoutingMetadata};

/// Default bound on one request's total processing time.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A chat message to route.
#[derive(Debug, Clone, Default)]
pub struct RouteMessageRequest {
    pub caller_id: String,
    pub session_id: String,
    pub message: String,
    pub conversation_id: Option<ConversationId>,
    pub model: Option<String>,
    pub task: Option<TaskKind>,
    /// Persona the caller asks for explicitly.
    pub persona: Option<String>,
    pub capability: Option<CapabilityCall>,
    pub priority: Option<u8>,
    /// Providers to try after the plan-derived fallbacks.
    pub fallback_providers: Vec<String>,
}

impl RouteMessageRequest {
    pub fn new(
        caller_id: impl Into<String>,
        session_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            session_id: session_id.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_task(mut self, task: TaskKind) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_capability(mut self, name: impl Into<String>, parameters: Value) -> Self {
        self.capability = Some(CapabilityCall {
            name: name.into(),
            parameters,
        });
        self
    }

    fn into_event(self) -> PipelineEvent {
        let mut payload = Map::new();
        payload.insert("message".into(), Value::String(self.message));
        if let Some(id) = self.conversation_id {
            payload.insert("conversation_id".into(), Value::String(id.to_string()));
        }
        if let Some(model) = self.model {
            payload.insert("model".into(), Value::String(model));
        }
        if let Some(task) = self.task {
            payload.insert("task".into(), Value::String(task.as_str().to_string()));
        }
        if let Some(call) = self.capability {
            payload.insert(
                "capability".into(),
                json!({"name": call.name, "parameters": call.parameters}),
            );
        }

        let mut event = PipelineEvent::new(
            EventKind::Chat,
            self.caller_id,
            self.session_id,
            Value::Object(payload),
        )
        .with_fallback_chain(self.fallback_providers);
        if let Some(persona) = self.persona {
            event = event.with_target_persona(persona);
        }
        if let Some(priority) = self.priority {
            event = event.with_priority(priority);
        }
        event
    }
}

/// Execution details returned with every routed message.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub event_id: EventId,
    pub persona: String,
    pub model: ModelSelection,
    pub routing: RoutingMetadata,
    /// The caller's daily quota was exhausted and history was shortened.
    pub degraded: bool,
    pub context_hash: String,
    pub capability: Option<CapabilityExecutionResult>,
    pub stage_timings: Vec<StageTiming>,
    pub warnings: Vec<PipelineIssue>,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteMessageResult {
    pub response_text: String,
    pub metadata: ResponseMetadata,
    pub conversation_id: ConversationId,
    /// Id of the stored assistant message.
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessEventResult {
    pub event_id: EventId,
    pub kind: EventKind,
    pub persona: Option<String>,
    pub capability: Option<CapabilityExecutionResult>,
    /// Matches of a capability availability query.
    pub capabilities: Vec<CapabilitySummary>,
    pub stage_timings: Vec<StageTiming>,
    pub warnings: Vec<PipelineIssue>,
    pub total_ms: u64,
}

/// Top-level entry point. Cheap to share as `Arc<RequestOrchestrator>`.
pub struct RequestOrchestrator {
    deps: PipelineDeps,
    engine: PipelineEngine,
    observers: Vec<Arc<dyn StageObserver>>,
    extractor: Arc<MemoryExtractor>,
    request_timeout: Duration,
}

impl RequestOrchestrator {
    /// Creates an orchestrator that logs stage transitions via `tracing`.
    pub fn new(deps: PipelineDeps) -> Self {
        let observers: Vec<Arc<dyn StageObserver>> = vec![Arc::new(TracingStageObserver)];
        let engine = build_pipeline(&deps, observers.iter().cloned());
        let extractor = Arc::new(MemoryExtractor::new(
            Arc::clone(&deps.semantic),
            Arc::clone(&deps.embedder),
        ));
        Self {
            deps,
            engine,
            observers,
            extractor,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Adds a stage observer.
    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observers.push(observer);
        self.engine = build_pipeline(&self.deps, self.observers.iter().cloned());
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.deps.catalog
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.deps.registry
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.deps.router
    }

    pub fn engine(&self) -> &PipelineEngine {
        &self.engine
    }

    /// Routes a chat message and returns the generated reply.
    #[tracing::instrument(
        skip_all,
        fields(caller_id = %request.caller_id, session_id = %request.session_id)
    )]
    pub async fn route_message(
        &self,
        request: RouteMessageRequest,
    ) -> Result<RouteMessageResult, OrchestratorError> {
        let ctx = self.run(request.into_event()).await?;

        let response: RoutedResponse = read(&ctx, keys::RESPONSE)?;
        let caller: CallerContext = read(&ctx, keys::CALLER)?;
        let persona: PersonaChoice = read(&ctx, keys::PERSONA)?;
        let model: ModelSelection = read(&ctx, keys::MODEL)?;
        let conversation_id: ConversationId = read(&ctx, keys::CONVERSATION_ID)?;
        let message_id: MessageId = read(&ctx, keys::MESSAGE_ID)?;
        let context_hash: String = read(&ctx, keys::CONTEXT_HASH)?;
        let capability: Option<CapabilityExecutionResult> = ctx
            .get(keys::CAPABILITY_RESULT)
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        if let Some(chat) = ctx.validated().and_then(|v| v.payload.as_chat()) {
            self.extractor.spawn(ExtractionJob {
                caller_id: caller.caller_id.clone(),
                conversation_id,
                user_message: chat.message.clone(),
            });
        }

        let total_ms = ctx.metrics().total().as_millis() as u64;
        tracing::info!(
            event_id = %ctx.event().id(),
            persona = %persona.persona_id,
            served_by = %response.metadata.served_by,
            model = %response.metadata.model,
            fallback_used = response.metadata.fallback_used,
            cost_micros = response.metadata.cost_micros,
            total_ms,
            "message routed"
        );

        Ok(RouteMessageResult {
            response_text: response.content,
            metadata: ResponseMetadata {
                event_id: ctx.event().id(),
                persona: persona.persona_id,
                model,
                routing: response.metadata,
                degraded: caller.degraded,
                context_hash,
                capability,
                stage_timings: ctx.metrics().timings(),
                warnings: ctx.warnings().to_vec(),
                total_ms,
            },
            conversation_id,
            message_id,
        })
    }

    /// Runs a capability invocation or availability event.
    #[tracing::instrument(skip_all, fields(event_id = %event.id(), kind = %event.kind()))]
    pub async fn process_event(
        &self,
        event: PipelineEvent,
    ) -> Result<ProcessEventResult, OrchestratorError> {
        if event.kind() == EventKind::Chat {
            return Err(ValidationError::invalid_format(
                "kind",
                "chat events are routed with route_message",
            )
            .into());
        }
        let ctx = self.run(event).await?;

        let persona: Option<PersonaChoice> = ctx
            .get(keys::PERSONA)
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
        let capability: Option<CapabilityExecutionResult> = ctx
            .get(keys::CAPABILITY_RESULT)
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
        let capabilities: Vec<CapabilitySummary> = ctx
            .get(keys::CAPABILITY_MATCHES)
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?
            .unwrap_or_default();

        let total_ms = ctx.metrics().total().as_millis() as u64;
        tracing::info!(
            capability = capability.as_ref().map(|c| c.capability.as_str()).unwrap_or("-"),
            success = ?capability.as_ref().map(|c| c.success),
            matches = capabilities.len(),
            total_ms,
            "event processed"
        );

        Ok(ProcessEventResult {
            event_id: ctx.event().id(),
            kind: ctx.event().kind(),
            persona: persona.map(|p| p.persona_id),
            capability,
            capabilities,
            stage_timings: ctx.metrics().timings(),
            warnings: ctx.warnings().to_vec(),
            total_ms,
        })
    }

    /// Runs the pipeline under the request timeout.
    async fn run(&self, event: PipelineEvent) -> Result<PipelineContext, OrchestratorError> {
        let (handle, signal) = cancellation_pair();
        let _deadline = handle.cancel_after(self.request_timeout);
        let mut ctx = PipelineContext::new(event, signal);

        match self.engine.run(&mut ctx).await {
            Ok(()) => Ok(ctx),
            Err(err) => {
                let error = OrchestratorError::from(err.clone());
                match &error {
                    OrchestratorError::Validation(_) => {
                        tracing::debug!(stage = %err.stage(), error = %err, "request rejected")
                    }
                    OrchestratorError::ServiceUnavailable | OrchestratorError::Timeout => {
                        tracing::error!(stage = %err.stage(), error = %err, "request failed")
                    }
                    _ => tracing::warn!(stage = %err.stage(), code = %err.code(), "request refused"),
                }
                Err(error)
            }
        }
    }
}

fn read<T: serde::de::DeserializeOwned>(
    ctx: &PipelineContext,
    key: &str,
) -> Result<T, OrchestratorError> {
    ctx.require(key)
        .map_err(|e| OrchestratorError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::RecordingStageObserver;
    use crate::application::stages::test_support::fixture;
    use crate::domain::capability::{CapabilityDefinition, FnHandler, HandlerError};
    use crate::domain::foundation::ErrorCode;
    use crate::domain::pipeline::PipelineStage;
    use crate::ports::{HistoryStore, MemoryFilter, SemanticMemory};
    use serde_json::json;

    fn register_echo(registry: &CapabilityRegistry) {
        registry
            .register(CapabilityDefinition::new(
                "echo",
                "utility",
                "Returns its parameters",
                Arc::new(FnHandler::new(|params: Value, _ctx| async move {
                    Ok::<_, HandlerError>(json!({"echoed": params}))
                })),
            ))
            .unwrap();
    }

    #[tokio::test]
    async fn route_message_persists_exchange_and_reports_metadata() {
        let f = fixture();
        let history = f.history.clone();
        let orchestrator = RequestOrchestrator::new(f.deps);

        let result = orchestrator
            .route_message(RouteMessageRequest::new("alice", "s-1", "hello"))
            .await
            .unwrap();

        assert_eq!(result.response_text, "echo: hello");
        assert_eq!(result.metadata.persona, "assistant");
        assert_eq!(result.metadata.routing.served_by, "openai");
        assert_eq!(result.metadata.stage_timings.len(), 8);
        let stored = history.get_history(&result.conversation_id, 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].id, result.message_id);
    }

    #[tokio::test]
    async fn follow_up_uses_conversation_history() {
        let f = fixture();
        let openai = f.openai.clone();
        let orchestrator = RequestOrchestrator::new(f.deps);

        let first = orchestrator
            .route_message(RouteMessageRequest::new("alice", "s-1", "first"))
            .await
            .unwrap();
        orchestrator
            .route_message(
                RouteMessageRequest::new("alice", "s-1", "second")
                    .with_conversation(first.conversation_id),
            )
            .await
            .unwrap();

        let calls = openai.calls();
        let contents: Vec<&str> = calls[1].messages.iter().map(|m| m.content.as_str()).collect();
        assert!(contents.contains(&"first"));
        assert!(contents.contains(&"echo: first"));
        assert_eq!(contents.last(), Some(&"second"));
    }

    #[tokio::test]
    async fn chat_capability_output_reaches_the_provider() {
        let f = fixture();
        register_echo(&f.deps.registry);
        let openai = f.openai.clone();
        let orchestrator = RequestOrchestrator::new(f.deps);

        let result = orchestrator
            .route_message(
                RouteMessageRequest::new("alice", "s-1", "run it")
                    .with_capability("echo", json!({"x": 1})),
            )
            .await
            .unwrap();

        assert!(result.metadata.capability.unwrap().success);
        let calls = openai.calls();
        assert!(calls[0]
            .messages
            .iter()
            .any(|m| m.content.starts_with("Result of capability 'echo'")));
    }

    #[tokio::test]
    async fn memory_extraction_runs_in_background() {
        let f = fixture();
        let semantic = f.semantic.clone();
        let orchestrator = RequestOrchestrator::new(f.deps);

        orchestrator
            .route_message(RouteMessageRequest::new(
                "alice",
                "s-1",
                "I work as a lighthouse keeper",
            ))
            .await
            .unwrap();

        let mut facts = Vec::new();
        for _ in 0..50 {
            let probe = vec![1.0; crate::adapters::memory::DEFAULT_EMBEDDING_DIMENSIONS];
            facts = semantic
                .query(&probe, 10, &MemoryFilter::new().with("kind", "fact"))
                .await
                .unwrap();
            if !facts.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].record.text, "I work as a lighthouse keeper");
    }

    #[tokio::test]
    async fn process_event_invokes_capability() {
        let f = fixture();
        register_echo(&f.deps.registry);
        let recorder = RecordingStageObserver::new();
        let orchestrator =
            RequestOrchestrator::new(f.deps).with_observer(Arc::new(recorder.clone()));

        let result = orchestrator
            .process_event(PipelineEvent::new(
                EventKind::CapabilityInvocation,
                "ghost",
                "s-1",
                json!({"name": "echo", "parameters": {"y": 2}}),
            ))
            .await
            .unwrap();

        let capability = result.capability.unwrap();
        assert!(capability.success);
        assert_eq!(capability.output, Some(json!({"echoed": {"y": 2}})));
        assert!(result.persona.is_some());
        assert_eq!(recorder.completed_stages(), PipelineStage::ORDER.to_vec());
    }

    #[tokio::test]
    async fn process_event_answers_availability_queries() {
        let f = fixture();
        register_echo(&f.deps.registry);
        let orchestrator = RequestOrchestrator::new(f.deps);

        let result = orchestrator
            .process_event(PipelineEvent::new(
                EventKind::CapabilityAvailability,
                "alice",
                "s-1",
                json!({"query": "param"}),
            ))
            .await
            .unwrap();

        assert_eq!(result.capabilities.len(), 1);
        assert_eq!(result.capabilities[0].name, "echo");
        assert!(result.capability.is_none());
    }

    #[tokio::test]
    async fn unknown_capability_fails_the_event() {
        let f = fixture();
        let orchestrator = RequestOrchestrator::new(f.deps);

        let err = orchestrator
            .process_event(PipelineEvent::new(
                EventKind::CapabilityInvocation,
                "alice",
                "s-1",
                json!({"name": "missing"}),
            ))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::CapabilityNotFound);
    }

    #[tokio::test]
    async fn process_event_refuses_chat() {
        let f = fixture();
        let orchestrator = RequestOrchestrator::new(f.deps);
        let err = orchestrator
            .process_event(PipelineEvent::new(
                EventKind::Chat,
                "alice",
                "s-1",
                json!({"message": "hi"}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_requests_leave_no_deadline_tasks_behind() {
        let f = fixture();
        register_echo(&f.deps.registry);
        let orchestrator = RequestOrchestrator::new(f.deps);

        for _ in 0..5 {
            orchestrator
                .process_event(PipelineEvent::new(
                    EventKind::CapabilityInvocation,
                    "alice",
                    "s-1",
                    json!({"name": "echo", "parameters": {"n": 1}}),
                ))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(tokio::runtime::Handle::current().metrics().num_alive_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_hits_request_timeout() {
        let f = fixture();
        let openai = f
            .openai
            .clone()
            .with_delay(Duration::from_secs(10));
        let router = ProviderRouter::new(
            Arc::clone(&f.deps.catalog),
            Arc::new(crate::adapters::resilience::CircuitBreakerRegistry::default()),
        )
        .with_adapter(Arc::new(openai));
        let mut deps = f.deps;
        deps.router = Arc::new(router);
        let orchestrator =
            RequestOrchestrator::new(deps).with_request_timeout(Duration::from_secs(2));

        let err = orchestrator
            .route_message(RouteMessageRequest::new("alice", "s-1", "hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Timeout));
    }
}
