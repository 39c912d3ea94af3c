//! Inbound pipeline events and their validation.
//!
//! A [`PipelineEvent`] is immutable once built. Raw caller-supplied fields
//! (identifiers, JSON payload) are only trusted after [`PipelineEvent::validate`]
//! turns them into a [`ValidatedEvent`]; the Validate stage calls it exactly once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::domain::catalog::TaskKind;
use crate::domain::foundation::{
    validate_identifier, ConversationId, EventId, SessionId, Timestamp, UserId, ValidationError,
};

/// Longest accepted chat message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 32_000;

/// Highest accepted event priority.
pub const MAX_PRIORITY: u8 = 10;

const DEFAULT_PRIORITY: u8 = 5;

/// Kind of work an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A conversational message expecting a generated reply.
    Chat,
    /// A direct request to run a named capability.
    CapabilityInvocation,
    /// A query for which capabilities are currently available.
    CapabilityAvailability,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::Chat,
        EventKind::CapabilityInvocation,
        EventKind::CapabilityAvailability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Chat => "chat",
            EventKind::CapabilityInvocation => "capability_invocation",
            EventKind::CapabilityAvailability => "capability_availability",
        }
    }

    /// Parses a wire name, naming `field` on failure.
    pub fn parse_field(field: &str, value: &str) -> Result<Self, ValidationError> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == value)
            .ok_or_else(|| {
                let allowed: Vec<&str> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
                ValidationError::not_in_enum(field, &allowed, value)
            })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An inbound request as it enters the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineEvent {
    id: EventId,
    kind: EventKind,
    caller_id: String,
    session_id: String,
    timestamp: Timestamp,
    payload: Value,
    priority: u8,
    context_hash: Option<String>,
    target_persona: Option<String>,
    fallback_chain: Vec<String>,
}

impl PipelineEvent {
    /// Creates an event stamped now with default priority.
    pub fn new(
        kind: EventKind,
        caller_id: impl Into<String>,
        session_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            kind,
            caller_id: caller_id.into(),
            session_id: session_id.into(),
            timestamp: Timestamp::now(),
            payload,
            priority: DEFAULT_PRIORITY,
            context_hash: None,
            target_persona: None,
            fallback_chain: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_target_persona(mut self, persona: impl Into<String>) -> Self {
        self.target_persona = Some(persona.into());
        self
    }

    pub fn with_context_hash(mut self, hash: impl Into<String>) -> Self {
        self.context_hash = Some(hash.into());
        self
    }

    pub fn with_fallback_chain(mut self, chain: Vec<String>) -> Self {
        self.fallback_chain = chain;
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn context_hash(&self) -> Option<&str> {
        self.context_hash.as_deref()
    }

    pub fn target_persona(&self) -> Option<&str> {
        self.target_persona.as_deref()
    }

    pub fn fallback_chain(&self) -> &[String] {
        &self.fallback_chain
    }

    /// Checks every caller-supplied field and decodes the payload for this
    /// event's kind. The returned error names the offending field.
    pub fn validate(&self) -> Result<ValidatedEvent, ValidationError> {
        let caller_id = UserId::new(self.caller_id.clone())?;
        let session_id = SessionId::new(self.session_id.clone())?;

        if self.priority > MAX_PRIORITY {
            return Err(ValidationError::out_of_range(
                "priority",
                0,
                i64::from(MAX_PRIORITY),
                i64::from(self.priority),
            ));
        }
        if let Some(persona) = &self.target_persona {
            validate_identifier("target_persona", persona)?;
        }
        if let Some(hash) = &self.context_hash {
            validate_hash("context_hash", hash)?;
        }
        for provider in &self.fallback_chain {
            validate_identifier("fallback_chain", provider)?;
        }
        if !self.payload.is_object() {
            return Err(ValidationError::invalid_format(
                "payload",
                "must be a JSON object",
            ));
        }

        let payload = match self.kind {
            EventKind::Chat => EventPayload::Chat(decode_chat(&self.payload)?),
            EventKind::CapabilityInvocation => {
                let raw: RawCapabilityCall = decode("payload", &self.payload)?;
                EventPayload::CapabilityInvocation(raw.into_call("payload")?)
            }
            EventKind::CapabilityAvailability => {
                let raw: RawAvailability = decode("payload", &self.payload)?;
                if let Some(category) = &raw.category {
                    validate_identifier("payload.category", category)?;
                }
                EventPayload::CapabilityAvailability(AvailabilityQuery {
                    query: raw.query.unwrap_or_default(),
                    category: raw.category,
                })
            }
        };

        Ok(ValidatedEvent {
            caller_id,
            session_id,
            payload,
        })
    }
}

/// The trusted form of an event, produced by validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedEvent {
    pub caller_id: UserId,
    pub session_id: SessionId,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Chat(ChatRequest),
    CapabilityInvocation(CapabilityCall),
    CapabilityAvailability(AvailabilityQuery),
}

impl EventPayload {
    /// The capability this payload asks to run, if any.
    pub fn capability_call(&self) -> Option<&CapabilityCall> {
        match self {
            EventPayload::Chat(chat) => chat.capability.as_ref(),
            EventPayload::CapabilityInvocation(call) => Some(call),
            EventPayload::CapabilityAvailability(_) => None,
        }
    }

    pub fn as_chat(&self) -> Option<&ChatRequest> {
        match self {
            EventPayload::Chat(chat) => Some(chat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<ConversationId>,
    /// Model explicitly requested by the caller.
    pub model: Option<String>,
    pub task: TaskKind,
    /// Capability to run before generating the reply.
    pub capability: Option<CapabilityCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCall {
    pub name: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    /// Substring matched against capability names, descriptions and tags.
    pub query: String,
    pub category: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawChat {
    message: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    capability: Option<RawCapabilityCall>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCapabilityCall {
    name: String,
    #[serde(default)]
    parameters: Option<Value>,
}

impl RawCapabilityCall {
    fn into_call(self, prefix: &str) -> Result<CapabilityCall, ValidationError> {
        validate_identifier(&format!("{prefix}.name"), &self.name)?;
        let parameters = self
            .parameters
            .unwrap_or_else(|| Value::Object(Default::default()));
        if !parameters.is_object() {
            return Err(ValidationError::invalid_format(
                format!("{prefix}.parameters"),
                "must be a JSON object",
            ));
        }
        Ok(CapabilityCall {
            name: self.name,
            parameters,
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAvailability {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

fn decode<T: serde::de::DeserializeOwned>(field: &str, value: &Value) -> Result<T, ValidationError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ValidationError::invalid_format(field, e.to_string()))
}

fn decode_chat(payload: &Value) -> Result<ChatRequest, ValidationError> {
    let raw: RawChat = decode("payload", payload)?;

    if raw.message.trim().is_empty() {
        return Err(ValidationError::empty_field("payload.message"));
    }
    let chars = raw.message.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(ValidationError::out_of_range(
            "payload.message",
            1,
            MAX_MESSAGE_CHARS as i64,
            chars as i64,
        ));
    }

    let conversation_id = raw
        .conversation_id
        .map(|id| {
            id.parse::<ConversationId>()
                .map_err(|e| ValidationError::invalid_format("payload.conversation_id", e.to_string()))
        })
        .transpose()?;

    if let Some(model) = &raw.model {
        validate_identifier("payload.model", model)?;
    }

    let task = match raw.task {
        Some(task) => TaskKind::parse_field("payload.task", &task)?,
        None => TaskKind::Chat,
    };

    let capability = raw
        .capability
        .map(|c| c.into_call("payload.capability"))
        .transpose()?;

    Ok(ChatRequest {
        message: raw.message,
        conversation_id,
        model: raw.model,
        task,
        capability,
    })
}

fn validate_hash(field: &str, value: &str) -> Result<(), ValidationError> {
    let ok = value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
    if ok {
        Ok(())
    } else {
        Err(ValidationError::invalid_format(
            field,
            "must be 64 lowercase hex characters",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chat(payload: Value) -> PipelineEvent {
        PipelineEvent::new(EventKind::Chat, "alice", "session-1", payload)
    }

    #[test]
    fn valid_chat_event_decodes() {
        let event = chat(json!({"message": "hello", "task": "coding"}));
        let validated = event.validate().unwrap();
        assert_eq!(validated.caller_id.as_str(), "alice");
        let chat = validated.payload.as_chat().unwrap();
        assert_eq!(chat.message, "hello");
        assert_eq!(chat.task, TaskKind::Coding);
        assert!(chat.conversation_id.is_none());
    }

    #[test]
    fn task_defaults_to_chat() {
        let validated = chat(json!({"message": "hi"})).validate().unwrap();
        assert_eq!(validated.payload.as_chat().unwrap().task, TaskKind::Chat);
    }

    #[test]
    fn missing_message_is_rejected() {
        let err = chat(json!({"task": "chat"})).validate().unwrap_err();
        assert_eq!(err.field(), "payload");
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn blank_message_names_field() {
        let err = chat(json!({"message": "   "})).validate().unwrap_err();
        assert_eq!(err.field(), "payload.message");
    }

    #[test]
    fn unknown_task_is_enum_error() {
        let err = chat(json!({"message": "hi", "task": "dance"})).validate().unwrap_err();
        assert!(matches!(err, ValidationError::NotInEnum { .. }));
        assert_eq!(err.field(), "payload.task");
    }

    #[test]
    fn bad_caller_identifier_is_rejected() {
        let event = PipelineEvent::new(EventKind::Chat, "bob smith", "s1", json!({"message": "hi"}));
        assert_eq!(event.validate().unwrap_err().field(), "caller_id");
    }

    #[test]
    fn priority_out_of_range_is_rejected() {
        let err = chat(json!({"message": "hi"})).with_priority(11).validate().unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn malformed_context_hash_is_rejected() {
        let err = chat(json!({"message": "hi"}))
            .with_context_hash("abc")
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), "context_hash");
    }

    #[test]
    fn unknown_payload_fields_are_rejected() {
        let err = chat(json!({"message": "hi", "colour": "red"})).validate().unwrap_err();
        assert_eq!(err.field(), "payload");
    }

    #[test]
    fn capability_invocation_defaults_parameters() {
        let event = PipelineEvent::new(
            EventKind::CapabilityInvocation,
            "alice",
            "s1",
            json!({"name": "weather"}),
        );
        let validated = event.validate().unwrap();
        let call = validated.payload.capability_call().unwrap();
        assert_eq!(call.name, "weather");
        assert_eq!(call.parameters, json!({}));
    }

    #[test]
    fn capability_parameters_must_be_object() {
        let event = PipelineEvent::new(
            EventKind::CapabilityInvocation,
            "alice",
            "s1",
            json!({"name": "weather", "parameters": [1, 2]}),
        );
        assert_eq!(event.validate().unwrap_err().field(), "payload.parameters");
    }

    #[test]
    fn event_kind_parse_names_field() {
        assert_eq!(
            EventKind::parse_field("kind", "capability_invocation").unwrap(),
            EventKind::CapabilityInvocation
        );
        let err = EventKind::parse_field("kind", "shout").unwrap_err();
        assert_eq!(err.field(), "kind");
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert_eq!(chat(json!("hi")).validate().unwrap_err().field(), "payload");
    }
}
