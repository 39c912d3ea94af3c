//! Plan tiers and their limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Small context window, budget models only.
    Free,
    /// Full model catalog, larger context.
    Pro,
    /// Highest quotas and the gentlest degrade.
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Pro, PlanTier::Enterprise];

    /// Returns the wire name for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlanTier::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::not_in_enum("plan", &["free", "pro", "enterprise"], s))
    }
}

/// Limits and model access for one plan tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDefinition {
    pub tier: PlanTier,
    /// History messages sent to the provider when within quota.
    pub context_messages: usize,
    /// Messages per UTC day before degrading. `None` = unlimited.
    pub daily_message_quota: Option<u32>,
    /// Fraction of `context_messages` kept once the quota is exhausted.
    pub degrade_factor: f32,
    /// Models this plan may use.
    pub allowed_models: Vec<String>,
    /// Preferred-first model order used for fallback and for replacing
    /// disallowed models.
    pub downgrade_chain: Vec<String>,
}

impl PlanDefinition {
    /// Returns true if `messages_today` has reached the daily quota.
    pub fn quota_exhausted(&self, messages_today: u32) -> bool {
        self.daily_message_quota
            .map(|quota| messages_today >= quota)
            .unwrap_or(false)
    }

    /// History window size, shrunk by `degrade_factor` when degraded.
    ///
    /// Never drops below one message while the plan keeps any history.
    pub fn history_window(&self, degraded: bool) -> usize {
        if !degraded || self.context_messages == 0 {
            return self.context_messages;
        }
        let shrunk = (self.context_messages as f32 * self.degrade_factor).floor() as usize;
        shrunk.clamp(1, self.context_messages)
    }

    /// Returns true if this plan may use `model`.
    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models.iter().any(|m| m == model)
    }

    /// First model of the downgrade chain this plan allows.
    pub fn first_permitted_model(&self) -> Option<&str> {
        self.downgrade_chain
            .iter()
            .find(|m| self.allows_model(m))
            .map(String::as_str)
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.degrade_factor) {
            return Err(ValidationError::invalid_format(
                format!("plans.{}.degrade_factor", self.tier),
                "must be within 0.0..=1.0",
            ));
        }
        if self.allowed_models.is_empty() {
            return Err(ValidationError::empty_field(format!(
                "plans.{}.allowed_models",
                self.tier
            )));
        }
        if self.first_permitted_model().is_none() {
            return Err(ValidationError::invalid_format(
                format!("plans.{}.downgrade_chain", self.tier),
                "must contain at least one allowed model",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> PlanDefinition {
        PlanDefinition {
            tier: PlanTier::Free,
            context_messages: 10,
            daily_message_quota: Some(50),
            degrade_factor: 0.5,
            allowed_models: vec!["small".into(), "tiny".into()],
            downgrade_chain: vec!["large".into(), "small".into(), "tiny".into()],
        }
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("PRO".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert_eq!("free".parse::<PlanTier>().unwrap(), PlanTier::Free);
    }

    #[test]
    fn unknown_tier_names_plan_field() {
        let err = "platinum".parse::<PlanTier>().unwrap_err();
        assert_eq!(err.field(), "plan");
    }

    #[test]
    fn tier_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PlanTier::Enterprise).unwrap(), "\"enterprise\"");
    }

    #[test]
    fn quota_exhausted_at_limit() {
        let plan = plan();
        assert!(!plan.quota_exhausted(49));
        assert!(plan.quota_exhausted(50));
    }

    #[test]
    fn unlimited_quota_never_exhausts() {
        let mut plan = plan();
        plan.daily_message_quota = None;
        assert!(!plan.quota_exhausted(u32::MAX));
    }

    #[test]
    fn degraded_window_is_shrunk() {
        let plan = plan();
        assert_eq!(plan.history_window(false), 10);
        assert_eq!(plan.history_window(true), 5);
    }

    #[test]
    fn degraded_window_keeps_at_least_one() {
        let mut plan = plan();
        plan.degrade_factor = 0.0;
        assert_eq!(plan.history_window(true), 1);
    }

    #[test]
    fn first_permitted_model_skips_disallowed() {
        assert_eq!(plan().first_permitted_model(), Some("small"));
    }

    #[test]
    fn validate_rejects_bad_degrade_factor() {
        let mut plan = plan();
        plan.degrade_factor = 1.5;
        assert!(plan.validate().is_err());
    }
}
