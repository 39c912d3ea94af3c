//! ProfileStore port - caller profiles and daily usage counters.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// A caller as known to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerProfile {
    pub caller_id: UserId,
    /// Plan tier name as stored; resolved against the catalog per request.
    pub plan: String,
    pub display_name: Option<String>,
    /// Persona the caller prefers when none is targeted explicitly.
    pub preferred_persona: Option<String>,
}

impl CallerProfile {
    /// Creates a profile on the given plan.
    pub fn new(caller_id: UserId, plan: impl Into<String>) -> Self {
        Self {
            caller_id,
            plan: plan.into(),
            display_name: None,
            preferred_persona: None,
        }
    }

    /// Sets the preferred persona.
    pub fn with_preferred_persona(mut self, persona: impl Into<String>) -> Self {
        self.preferred_persona = Some(persona.into());
        self
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Usage counters for one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub day: NaiveDate,
    pub messages: u32,
    pub tokens: u64,
    pub cost_micros: u64,
}

impl UsageSnapshot {
    /// Zeroed counters for `day`.
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            messages: 0,
            tokens: 0,
            cost_micros: 0,
        }
    }

    /// Zeroed counters for today.
    pub fn today() -> Self {
        Self::empty(Timestamp::now().utc_day())
    }
}

/// Increment applied after a successful exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageDelta {
    pub messages: u32,
    pub tokens: u64,
    pub cost_micros: u64,
}

/// Port for caller profile lookup and usage accounting.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Find a caller's profile.
    async fn get_profile(&self, caller_id: &UserId) -> Result<Option<CallerProfile>, DomainError>;

    /// Today's usage for a caller. Unknown callers report zero usage.
    async fn get_usage(&self, caller_id: &UserId) -> Result<UsageSnapshot, DomainError>;

    /// Atomically add `delta` to today's counters, returning the new totals.
    ///
    /// Counters from a previous day are discarded first.
    async fn increment_usage(
        &self,
        caller_id: &UserId,
        delta: UsageDelta,
    ) -> Result<UsageSnapshot, DomainError>;
}
