//! Per-invocation context and outcome of a capability execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CapabilityError;
use crate::domain::foundation::{CancellationSignal, CapabilityId, SessionId, UserId};

/// Everything a single capability execution needs besides the definition.
#[derive(Debug, Clone)]
pub struct CapabilityExecutionContext {
    /// Filled in by the registry when the capability is resolved.
    pub capability_id: Option<CapabilityId>,
    /// Identifies the caller for rate limiting, known or not.
    pub caller_id: Option<UserId>,
    /// Whether `caller_id` belongs to a known caller.
    pub authenticated: bool,
    pub session_id: Option<SessionId>,
    pub parameters: Value,
    /// Fallback hops taken so far.
    pub retry_count: u32,
    /// Capabilities that failed before this one, in order.
    pub fallback_chain: Vec<String>,
    pub cancellation: CancellationSignal,
}

impl CapabilityExecutionContext {
    pub fn new(parameters: Value) -> Self {
        Self {
            capability_id: None,
            caller_id: None,
            authenticated: false,
            session_id: None,
            parameters,
            retry_count: 0,
            fallback_chain: Vec::new(),
            cancellation: CancellationSignal::never(),
        }
    }

    /// Known caller; satisfies `requires_auth`.
    pub fn with_caller(mut self, caller_id: UserId) -> Self {
        self.caller_id = Some(caller_id);
        self.authenticated = true;
        self
    }

    /// Caller without a profile. Rate limited under its own id but
    /// rejected by capabilities that require auth.
    pub fn with_unauthenticated_caller(mut self, caller_id: UserId) -> Self {
        self.caller_id = Some(caller_id);
        self.authenticated = false;
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Context for the next fallback hop after `failed` gave up.
    pub(crate) fn next_hop(&self, failed: &str) -> Self {
        let mut next = self.clone();
        next.capability_id = None;
        next.retry_count += 1;
        next.fallback_chain.push(failed.to_string());
        next
    }
}

/// Outcome of `CapabilityRegistry::execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityExecutionResult {
    /// Capability whose outcome this is (the last one tried).
    pub capability: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<CapabilityError>,
    pub duration_ms: u64,
    /// Fallback capability that produced this result, if any.
    pub fallback_used: Option<String>,
    pub fallback_chain: Vec<String>,
}

impl CapabilityExecutionResult {
    pub(crate) fn succeeded(
        capability: &str,
        output: Value,
        duration_ms: u64,
        ctx: &CapabilityExecutionContext,
    ) -> Self {
        Self {
            capability: capability.to_string(),
            success: true,
            output: Some(output),
            error: None,
            duration_ms,
            fallback_used: None,
            fallback_chain: ctx.fallback_chain.clone(),
        }
    }

    pub(crate) fn failed(
        capability: &str,
        error: CapabilityError,
        duration_ms: u64,
        ctx: &CapabilityExecutionContext,
    ) -> Self {
        Self {
            capability: capability.to_string(),
            success: false,
            output: None,
            error: Some(error),
            duration_ms,
            fallback_used: None,
            fallback_chain: ctx.fallback_chain.clone(),
        }
    }
}
