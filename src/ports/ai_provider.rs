//! AI Provider Port - Interface for language-model provider integrations.
//!
//! Every backend is reached through a [`ProviderAdapter`]. The router only
//! sees this contract: a normalized request in, generated text plus token
//! usage out, and a descriptor declaring which models the adapter serves and
//! what each unit of usage costs.
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//!
//! struct EchoProvider;
//!
//! #[async_trait]
//! impl ProviderAdapter for EchoProvider {
//!     async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
//!         Ok(ProviderResponse::new("hello", request.model, TokenUsage::new(3, 1)))
//!     }
//!
//!     fn descriptor(&self) -> ProviderDescriptor {
//!         ProviderDescriptor::new("echo", vec!["echo-1".into()])
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConversationId, SessionId, UserId};

/// Port for language-model provider calls.
///
/// Implementations translate between the provider-specific wire format and
/// these normalized types. Adapters are stateless from the router's point of
/// view; resilience (retry, circuit breaking, fallback) lives in the router.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Generate a single completion.
    async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Static description of this provider: name, models and costs.
    fn descriptor(&self) -> ProviderDescriptor;
}

/// Normalized request sent to a provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Model the request targets. Rewritten by the router on fallback.
    pub model: String,
    /// Conversation messages (history + current user message).
    pub messages: Vec<Message>,
    /// Persona instructions.
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Temperature for response randomness.
    pub temperature: Option<f32>,
    /// Request metadata for tracing and billing.
    pub metadata: RequestMetadata,
}

impl ProviderRequest {
    /// Creates a new request for the given model.
    pub fn new(model: impl Into<String>, metadata: RequestMetadata) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system_prompt: None,
            max_tokens: None,
            temperature: None,
            metadata,
        }
    }

    /// Adds a message to the conversation.
    pub fn with_message(mut self, role: MessageRole, content: impl Into<String>) -> Self {
        self.messages.push(Message::new(role, content));
        self
    }

    /// Replaces all messages.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Sets the temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Clone of this request retargeted at another model.
    pub fn for_model(&self, model: impl Into<String>) -> Self {
        let mut request = self.clone();
        request.model = model.into();
        request
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
}

impl Message {
    /// Creates a new message.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Role of the message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions (guides model behavior).
    System,
    /// User input.
    User,
    /// Assistant (model) response.
    Assistant,
}

/// Request metadata for tracing and billing.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// Caller making the request.
    pub caller_id: UserId,
    /// Session the request belongs to.
    pub session_id: SessionId,
    /// Conversation, when one is known.
    pub conversation_id: Option<ConversationId>,
    /// Trace ID for distributed tracing.
    pub trace_id: String,
}

impl RequestMetadata {
    /// Creates new request metadata.
    pub fn new(caller_id: UserId, session_id: SessionId, trace_id: impl Into<String>) -> Self {
        Self {
            caller_id,
            session_id,
            conversation_id: None,
            trace_id: trace_id.into(),
        }
    }

    /// Attaches a conversation id.
    pub fn with_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }
}

/// Response from a provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    /// Generated content.
    pub content: String,
    /// Model that generated the response.
    pub model: String,
    /// Token usage.
    pub usage: TokenUsage,
    /// Why the model stopped generating.
    pub finish_reason: FinishReason,
}

impl ProviderResponse {
    /// Creates a response that stopped naturally.
    pub fn new(content: impl Into<String>, model: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage,
            finish_reason: FinishReason::Stop,
        }
    }
}

/// Token usage information for billing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion).
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Creates new token usage.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Creates zero usage.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop (end of response).
    Stop,
    /// Hit max_tokens limit.
    Length,
    /// Content was filtered for safety.
    ContentFilter,
}

/// Per-unit pricing declared by a provider, in micro-dollars per 1000 tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTable {
    /// Price of 1000 prompt tokens.
    pub prompt_per_1k_micros: u64,
    /// Price of 1000 completion tokens.
    pub completion_per_1k_micros: u64,
}

impl CostTable {
    /// Creates a cost table.
    pub fn new(prompt_per_1k_micros: u64, completion_per_1k_micros: u64) -> Self {
        Self {
            prompt_per_1k_micros,
            completion_per_1k_micros,
        }
    }

    /// Cost of `usage` in micro-dollars, rounded up.
    pub fn cost_micros(&self, usage: &TokenUsage) -> u64 {
        let prompt = u64::from(usage.prompt_tokens).saturating_mul(self.prompt_per_1k_micros);
        let completion =
            u64::from(usage.completion_tokens).saturating_mul(self.completion_per_1k_micros);
        prompt.saturating_add(completion).div_ceil(1000)
    }
}

/// Static description of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Provider name (e.g., "openai", "anthropic").
    pub name: String,
    /// Model identifiers this provider serves.
    pub models: Vec<String>,
    /// Requests per minute the provider accepts.
    pub rate_limit_rpm: u32,
    /// Per-unit pricing.
    pub costs: CostTable,
    /// Ordering among fallback providers; lower is tried first.
    pub fallback_priority: u32,
    /// Disabled providers are never called.
    pub enabled: bool,
}

impl ProviderDescriptor {
    /// Creates an enabled descriptor with zero cost.
    pub fn new(name: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            name: name.into(),
            models,
            rate_limit_rpm: 60,
            costs: CostTable::default(),
            fallback_priority: 100,
            enabled: true,
        }
    }

    /// Sets per-unit pricing.
    pub fn with_costs(mut self, costs: CostTable) -> Self {
        self.costs = costs;
        self
    }

    /// Sets the fallback priority.
    pub fn with_fallback_priority(mut self, priority: u32) -> Self {
        self.fallback_priority = priority;
        self
    }

    /// Enables or disables the provider.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns true if this provider serves `model`.
    pub fn supports(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// The model used when this provider is reached as a fallback.
    pub fn default_model(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }
}

/// Provider errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Rate limited by provider.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until retry is allowed.
        retry_after_secs: u32,
    },

    /// Context (prompt + history) exceeds model limit.
    #[error("context too long: {tokens} tokens exceeds {max} limit")]
    ContextTooLong {
        /// Actual token count.
        tokens: u32,
        /// Maximum allowed.
        max: u32,
    },

    /// Content was filtered for safety.
    #[error("content filtered: {reason}")]
    ContentFiltered {
        /// Reason for filtering.
        reason: String,
    },

    /// Provider is unavailable.
    #[error("provider unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// API key or authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Network error during request.
    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse provider response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid request configuration.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request timed out.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The surrounding request was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Creates a rate limited error.
    pub fn rate_limited(retry_after_secs: u32) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Returns true if the same provider may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Unavailable { .. }
                | ProviderError::Network(_)
                | ProviderError::Timeout { .. }
        )
    }
}
