//! HTTP DTOs for the orchestrator endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::stages::keys::CapabilitySummary;
use crate::application::{
    OrchestratorError, ProcessEventResult, ResponseMetadata, RouteMessageRequest,
    RouteMessageResult,
};
use crate::domain::catalog::TaskKind;
use crate::domain::foundation::{ConversationId, ValidationError};
use crate::domain::pipeline::{EventKind, PipelineEvent};
use crate::ports::{CircuitSnapshot, ProviderDescriptor};

// ════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════

/// Body of `POST /messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub caller_id: String,
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub capability: Option<CapabilityCallRequest>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub fallback_providers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityCallRequest {
    pub name: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl SendMessageRequest {
    /// Parses the loosely typed fields into a [`RouteMessageRequest`].
    pub fn into_request(self) -> Result<RouteMessageRequest, ValidationError> {
        let mut request = RouteMessageRequest::new(self.caller_id, self.session_id, self.message);
        if let Some(raw) = self.conversation_id {
            let id = raw.parse::<ConversationId>().map_err(|_| {
                ValidationError::invalid_format("conversation_id", "expected a UUID")
            })?;
            request = request.with_conversation(id);
        }
        if let Some(task) = self.task {
            request = request.with_task(TaskKind::parse_field("task", &task)?);
        }
        if let Some(model) = self.model {
            request = request.with_model(model);
        }
        if let Some(persona) = self.persona {
            request = request.with_persona(persona);
        }
        if let Some(call) = self.capability {
            request = request.with_capability(call.name, call.parameters);
        }
        request.priority = self.priority;
        request.fallback_providers = self.fallback_providers;
        Ok(request)
    }
}

/// Body of `POST /events`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitEventRequest {
    pub kind: EventKind,
    pub caller_id: String,
    pub session_id: String,
    #[serde(default = "empty_object")]
    pub payload: Value,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub target_persona: Option<String>,
    #[serde(default)]
    pub fallback_chain: Vec<String>,
}

impl From<SubmitEventRequest> for PipelineEvent {
    fn from(req: SubmitEventRequest) -> Self {
        let mut event = PipelineEvent::new(req.kind, req.caller_id, req.session_id, req.payload)
            .with_fallback_chain(req.fallback_chain);
        if let Some(priority) = req.priority {
            event = event.with_priority(priority);
        }
        if let Some(persona) = req.target_persona {
            event = event.with_target_persona(persona);
        }
        event
    }
}

/// Query string of `GET /capabilities`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapabilitiesQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageResponse {
    pub response: String,
    pub conversation_id: String,
    pub message_id: String,
    pub metadata: ResponseMetadata,
}

impl From<RouteMessageResult> for SendMessageResponse {
    fn from(result: RouteMessageResult) -> Self {
        Self {
            response: result.response_text,
            conversation_id: result.conversation_id.to_string(),
            message_id: result.message_id.to_string(),
            metadata: result.metadata,
        }
    }
}

pub type SubmitEventResponse = ProcessEventResult;

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityListResponse {
    pub capabilities: Vec<CapabilitySummary>,
    pub total: usize,
}

impl From<Vec<CapabilitySummary>> for CapabilityListResponse {
    fn from(capabilities: Vec<CapabilitySummary>) -> Self {
        Self {
            total: capabilities.len(),
            capabilities,
        }
    }
}

/// One provider in `GET /health/providers`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthEntry {
    pub name: String,
    pub models: Vec<String>,
    pub enabled: bool,
    pub fallback_priority: u32,
    /// `None` until the provider has been called once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit: Option<CircuitSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthResponse {
    pub providers: Vec<ProviderHealthEntry>,
}

impl ProviderHealthResponse {
    pub fn new(
        descriptors: Vec<ProviderDescriptor>,
        circuits: Vec<(String, CircuitSnapshot)>,
    ) -> Self {
        let providers = descriptors
            .into_iter()
            .map(|d| ProviderHealthEntry {
                circuit: circuits
                    .iter()
                    .find(|(name, _)| *name == d.name)
                    .map(|(_, snapshot)| snapshot.clone()),
                name: d.name,
                models: d.models,
                enabled: d.enabled,
                fallback_priority: d.fallback_priority,
            })
            .collect();
        Self { providers }
    }
}

/// Standard error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
        }
    }
}

impl From<&OrchestratorError> for ErrorResponse {
    fn from(err: &OrchestratorError) -> Self {
        let mut response = Self::new(err.code().to_string(), err.to_string());
        if let OrchestratorError::Validation(validation) = err {
            response.field = Some(validation.field().to_string());
        }
        response
    }
}

impl From<&ValidationError> for ErrorResponse {
    fn from(err: &ValidationError) -> Self {
        Self {
            code: "VALIDATION_FAILED".to_string(),
            message: err.to_string(),
            field: Some(err.field().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_message_request_parses_optional_fields() {
        let req: SendMessageRequest = serde_json::from_value(json!({
            "caller_id": "alice",
            "session_id": "s-1",
            "message": "hi",
            "task": "coding",
            "capability": {"name": "echo"}
        }))
        .unwrap();

        let request = req.into_request().unwrap();
        assert_eq!(request.task, Some(TaskKind::Coding));
        assert_eq!(request.capability.unwrap().parameters, json!({}));
        assert!(request.conversation_id.is_none());
    }

    #[test]
    fn malformed_conversation_id_names_the_field() {
        let req: SendMessageRequest = serde_json::from_value(json!({
            "caller_id": "alice",
            "session_id": "s-1",
            "message": "hi",
            "conversation_id": "not-a-uuid"
        }))
        .unwrap();

        let err = req.into_request().unwrap_err();
        assert_eq!(err.field(), "conversation_id");
    }

    #[test]
    fn unknown_task_is_rejected() {
        let req: SendMessageRequest = serde_json::from_value(json!({
            "caller_id": "alice",
            "session_id": "s-1",
            "message": "hi",
            "task": "juggling"
        }))
        .unwrap();
        assert_eq!(req.into_request().unwrap_err().field(), "task");
    }

    #[test]
    fn submit_event_request_builds_event() {
        let req: SubmitEventRequest = serde_json::from_value(json!({
            "kind": "capability_invocation",
            "caller_id": "alice",
            "session_id": "s-1",
            "payload": {"name": "echo"},
            "priority": 9,
            "target_persona": "engineer"
        }))
        .unwrap();

        let event = PipelineEvent::from(req);
        assert_eq!(event.kind(), EventKind::CapabilityInvocation);
        assert_eq!(event.priority(), 9);
        assert_eq!(event.target_persona(), Some("engineer"));
    }

    #[test]
    fn orchestrator_error_body_carries_code() {
        let body = ErrorResponse::from(&OrchestratorError::UserNotFound("ghost".into()));
        assert_eq!(body.code, "USER_NOT_FOUND");
        assert!(body.field.is_none());
    }
}
