//! Context data keys shared between pipeline steps and the typed values
//! stored under them.

use serde::{Deserialize, Serialize};

use crate::domain::catalog::PlanTier;
use crate::domain::capability::CapabilityStats;
use crate::domain::foundation::{ConversationId, EventId, Timestamp, UserId};
use crate::domain::pipeline::EventKind;
use crate::ports::UsageSnapshot;

pub const RECEIPT: &str = "receipt";
pub const CALLER: &str = "caller";
pub const SESSION_STATE: &str = "session_state";
pub const MEMORY_EXCERPTS: &str = "memory_excerpts";
pub const CONVERSATION_ID: &str = "conversation_id";
pub const HISTORY: &str = "history";
pub const CONTEXT_HASH: &str = "context_hash";
pub const PERSONA: &str = "persona";
pub const MODEL: &str = "model";
pub const CAPABILITY_RESULT: &str = "capability_result";
pub const CAPABILITY_MATCHES: &str = "capability_matches";
pub const RESPONSE: &str = "response";
pub const MESSAGE_ID: &str = "message_id";

/// Stamped by the ingest step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub event_id: EventId,
    pub kind: EventKind,
    pub priority: u8,
    pub received_at: Timestamp,
}

/// Who is calling and what their plan grants right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerContext {
    pub caller_id: UserId,
    /// `None` for callers without a profile; only capability events accept them.
    pub plan: Option<PlanTier>,
    pub preferred_persona: Option<String>,
    pub usage: UsageSnapshot,
    /// Daily quota reached; history is shrunk by the plan's degrade factor.
    pub degraded: bool,
    pub history_window: usize,
}

impl CallerContext {
    pub fn is_known(&self) -> bool {
        self.plan.is_some()
    }
}

/// Per-session state kept in short-term memory between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub turns: u32,
    pub last_persona: Option<String>,
    pub conversation_id: Option<ConversationId>,
    pub updated_at: Option<Timestamp>,
}

impl SessionState {
    pub fn storage_key(session_id: &str) -> String {
        format!("session:{}", session_id)
    }
}

/// A capability matched by an availability query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySummary {
    pub name: String,
    pub version: String,
    pub category: String,
    pub description: String,
    pub tags: Vec<String>,
    pub stats: Option<CapabilityStats>,
}
