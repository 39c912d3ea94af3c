//! Mock provider adapter for testing.
//!
//! Provides a configurable implementation of the `ProviderAdapter` port,
//! allowing the router and orchestrator to run without a real backend.
//!
//! # Features
//!
//! - Pre-configured responses, consumed in order
//! - Error injection for fallback and circuit-breaker testing
//! - Simulated delays for timeout testing
//! - Call tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let provider = MockProviderAdapter::new("anthropic", &["claude-sonnet"])
//!     .with_response("Hello, I'm the assistant!")
//!     .with_delay(Duration::from_millis(100));
//!
//! let response = provider.call(request).await?;
//! assert_eq!(response.content, "Hello, I'm the assistant!");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    CostTable, FinishReason, MessageRole, ProviderAdapter, ProviderDescriptor, ProviderError,
    ProviderRequest, ProviderResponse, TokenUsage,
};

/// A configured mock outcome.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a successful completion.
    Success { content: String, usage: TokenUsage },
    /// Return an error.
    Error(ProviderError),
}

/// What to do once the scripted queue is empty.
#[derive(Debug, Clone)]
enum Fallthrough {
    /// Echo the last user message.
    Echo,
    /// Fail every further call with this error.
    AlwaysFail(ProviderError),
}

/// Mock provider adapter.
///
/// Clones share the response queue and call history, so a test can keep a
/// handle after moving the adapter into a router.
#[derive(Debug, Clone)]
pub struct MockProviderAdapter {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    descriptor: ProviderDescriptor,
    delay: Duration,
    fallthrough: Fallthrough,
    calls: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl MockProviderAdapter {
    /// Creates a mock serving `models` under the provider name `name`.
    pub fn new(name: impl Into<String>, models: &[&str]) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            descriptor: ProviderDescriptor::new(
                name,
                models.iter().map(|m| m.to_string()).collect(),
            ),
            delay: Duration::ZERO,
            fallthrough: Fallthrough::Echo,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adds a successful response to the queue.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.with_response_usage(content, TokenUsage::new(10, 20))
    }

    /// Adds a successful response with explicit token usage.
    pub fn with_response_usage(self, content: impl Into<String>, usage: TokenUsage) -> Self {
        self.enqueue(MockResponse::Success {
            content: content.into(),
            usage,
        });
        self
    }

    /// Adds an error response to the queue.
    pub fn with_error(self, error: ProviderError) -> Self {
        self.enqueue(MockResponse::Error(error));
        self
    }

    /// Fails every call once the queue is exhausted.
    pub fn always_failing(mut self, error: ProviderError) -> Self {
        self.fallthrough = Fallthrough::AlwaysFail(error);
        self
    }

    /// Sets simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets per-unit pricing.
    pub fn with_costs(mut self, costs: CostTable) -> Self {
        self.descriptor = self.descriptor.with_costs(costs);
        self
    }

    /// Sets the fallback priority.
    pub fn with_fallback_priority(mut self, priority: u32) -> Self {
        self.descriptor = self.descriptor.with_fallback_priority(priority);
        self
    }

    /// Enables or disables the provider.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.descriptor = self.descriptor.with_enabled(enabled);
        self
    }

    /// Returns the number of calls made to this provider.
    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// Returns all recorded calls.
    pub fn calls(&self) -> Vec<ProviderRequest> {
        self.lock_calls().clone()
    }

    /// Clears the call history.
    pub fn clear_calls(&self) {
        self.lock_calls().clear();
    }

    /// Queues a response on a mock already handed to a router; clones share
    /// the queue.
    pub fn enqueue(&self, response: MockResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<ProviderRequest>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_response(&self, request: &ProviderRequest) -> MockResponse {
        let scripted = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(response) = scripted {
            return response;
        }
        match &self.fallthrough {
            Fallthrough::AlwaysFail(err) => MockResponse::Error(err.clone()),
            Fallthrough::Echo => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == MessageRole::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                let prompt_tokens = request
                    .messages
                    .iter()
                    .map(|m| estimate_tokens(&m.content))
                    .sum();
                let content = format!("echo: {}", last_user);
                MockResponse::Success {
                    usage: TokenUsage::new(prompt_tokens, estimate_tokens(&content)),
                    content,
                }
            }
        }
    }
}

/// Rough approximation: ~4 characters per token.
fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4).max(1) as u32
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let response = self.next_response(&request);
        let model = request.model.clone();
        self.lock_calls().push(request);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match response {
            MockResponse::Success { content, usage } => Ok(ProviderResponse {
                content,
                model,
                usage,
                finish_reason: FinishReason::Stop,
            }),
            MockResponse::Error(err) => Err(err),
        }
    }

    fn descriptor(&self) -> ProviderDescriptor {
        self.descriptor.clone()
    }
}
