//! Capability definitions, execution policies and handlers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use super::execution::CapabilityExecutionContext;
use super::schema::{check_parameter_schema, check_return_schema};
use super::RegistryError;
use crate::domain::foundation::{validate_identifier, CapabilityId, Timestamp};

/// Failure reported by a capability handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The executable body of a capability.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Runs the capability with already-validated parameters.
    async fn call(
        &self,
        parameters: Value,
        ctx: &CapabilityExecutionContext,
    ) -> Result<Value, HandlerError>;
}

/// Adapts an async closure into a [`CapabilityHandler`].
///
/// ```ignore
/// let handler = FnHandler::new(|params, _ctx| async move {
///     Ok(json!({ "echo": params }))
/// });
/// ```
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(Value, CapabilityExecutionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(Value, CapabilityExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn call(
        &self,
        parameters: Value,
        ctx: &CapabilityExecutionContext,
    ) -> Result<Value, HandlerError> {
        (self.f)(parameters, ctx.clone()).await
    }
}

/// Sliding-window limits for one capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Requests admitted per window per caller.
    pub requests_per_window: u32,
    /// Requests admitted per burst interval per caller.
    pub burst_limit: u32,
    pub window_secs: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            burst_limit: 10,
            window_secs: 60,
        }
    }
}

impl RateLimitPolicy {
    /// A per-minute policy.
    pub fn per_minute(requests: u32, burst_limit: u32) -> Self {
        Self {
            requests_per_window: requests,
            burst_limit,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    pub timeout_ms: u64,
    /// Fallback hops allowed from this capability.
    pub max_retries: u32,
    pub fallback_capability: Option<String>,
    pub requires_auth: bool,
    pub rate_limit: RateLimitPolicy,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_retries: 1,
            fallback_capability: None,
            requires_auth: false,
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityMetadata {
    pub tags: Vec<String>,
    pub examples: Vec<Value>,
    pub last_updated: Timestamp,
}

impl Default for CapabilityMetadata {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            examples: Vec::new(),
            last_updated: Timestamp::now(),
        }
    }
}

/// A named, schema-described executable capability.
#[derive(Clone)]
pub struct CapabilityDefinition {
    pub id: CapabilityId,
    pub name: String,
    pub version: String,
    pub category: String,
    pub description: String,
    pub parameter_schema: Value,
    pub return_schema: Value,
    pub policy: ExecutionPolicy,
    pub metadata: CapabilityMetadata,
    pub handler: Arc<dyn CapabilityHandler>,
}

impl fmt::Debug for CapabilityDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("category", &self.category)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl CapabilityDefinition {
    /// Creates a definition with an open object parameter schema and
    /// default policy.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self {
            id: CapabilityId::new(),
            name: name.into(),
            version: "1.0.0".to_string(),
            category: category.into(),
            description: description.into(),
            parameter_schema: json!({"type": "object"}),
            return_schema: json!({}),
            policy: ExecutionPolicy::default(),
            metadata: CapabilityMetadata::default(),
            handler,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_parameter_schema(mut self, schema: Value) -> Self {
        self.parameter_schema = schema;
        self
    }

    pub fn with_return_schema(mut self, schema: Value) -> Self {
        self.return_schema = schema;
        self
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.policy.timeout_ms = timeout_ms;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitPolicy) -> Self {
        self.policy.rate_limit = rate_limit;
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>, max_retries: u32) -> Self {
        self.policy.fallback_capability = Some(fallback.into());
        self.policy.max_retries = max_retries;
        self
    }

    pub fn requiring_auth(mut self) -> Self {
        self.policy.requires_auth = true;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.metadata.tags = tags;
        self
    }

    /// Case-insensitive substring match over name, description and tags.
    /// `needle` must already be lowercase.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.name.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self
                .metadata
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(needle))
    }

    /// Checks the definition is registrable.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| RegistryError::SchemaInvalid {
            name: self.name.clone(),
            reason,
        };

        validate_identifier("name", &self.name).map_err(|e| invalid(e.to_string()))?;
        if self.category.trim().is_empty() {
            return Err(invalid("category must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(invalid("version must not be empty".into()));
        }
        check_parameter_schema(&self.parameter_schema)
            .map_err(|e| invalid(format!("parameter schema: {}", e)))?;
        check_return_schema(&self.return_schema)
            .map_err(|e| invalid(format!("return schema: {}", e)))?;

        let policy = &self.policy;
        if policy.timeout_ms == 0 {
            return Err(invalid("timeout_ms must be positive".into()));
        }
        let limit = &policy.rate_limit;
        if limit.requests_per_window == 0 || limit.burst_limit == 0 || limit.window_secs == 0 {
            return Err(invalid("rate limit values must be positive".into()));
        }
        if let Some(fallback) = &policy.fallback_capability {
            if fallback == &self.name {
                return Err(invalid("capability cannot fall back to itself".into()));
            }
            validate_identifier("fallback_capability", fallback)
                .map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }
}

/// Partial update applied by `CapabilityRegistry::update`.
#[derive(Default, Clone)]
pub struct CapabilityPatch {
    pub version: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub parameter_schema: Option<Value>,
    pub return_schema: Option<Value>,
    pub policy: Option<ExecutionPolicy>,
    pub tags: Option<Vec<String>>,
    pub examples: Option<Vec<Value>>,
    pub handler: Option<Arc<dyn CapabilityHandler>>,
}

impl CapabilityPatch {
    pub(crate) fn apply_to(self, def: &mut CapabilityDefinition) {
        if let Some(version) = self.version {
            def.version = version;
        }
        if let Some(category) = self.category {
            def.category = category;
        }
        if let Some(description) = self.description {
            def.description = description;
        }
        if let Some(schema) = self.parameter_schema {
            def.parameter_schema = schema;
        }
        if let Some(schema) = self.return_schema {
            def.return_schema = schema;
        }
        if let Some(policy) = self.policy {
            def.policy = policy;
        }
        if let Some(tags) = self.tags {
            def.metadata.tags = tags;
        }
        if let Some(examples) = self.examples {
            def.metadata.examples = examples;
        }
        if let Some(handler) = self.handler {
            def.handler = handler;
        }
        def.metadata.last_updated = Timestamp::now();
    }
}
