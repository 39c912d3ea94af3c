//! Personas, task kinds and emotional tones.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{validate_identifier, ValidationError};
use crate::domain::pipeline::EventKind;

/// Kind of work a message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Chat,
    Coding,
    Analysis,
    Creative,
    Support,
    Summarize,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Chat,
        TaskKind::Coding,
        TaskKind::Analysis,
        TaskKind::Creative,
        TaskKind::Support,
        TaskKind::Summarize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Chat => "chat",
            TaskKind::Coding => "coding",
            TaskKind::Analysis => "analysis",
            TaskKind::Creative => "creative",
            TaskKind::Support => "support",
            TaskKind::Summarize => "summarize",
        }
    }

    /// Parses a task name, naming `field` on failure.
    pub fn parse_field(field: &str, value: &str) -> Result<Self, ValidationError> {
        TaskKind::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| {
                let allowed: Vec<&str> = TaskKind::ALL.iter().map(|t| t.as_str()).collect();
                ValidationError::not_in_enum(field, &allowed, value)
            })
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_field("task", s)
    }
}

/// Coarse emotional signal read from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalTone {
    Neutral,
    Positive,
    Negative,
    Distressed,
}

/// A persona the orchestrator can answer as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub display_name: String,
    pub system_prompt: String,
    pub default_model: String,
    pub allowed_tasks: Vec<TaskKind>,
    /// Tie-break order; lower wins.
    pub priority: u32,
    #[serde(default)]
    pub event_affinity: Vec<EventKind>,
    #[serde(default)]
    pub tone_affinity: Vec<EmotionalTone>,
}

impl Persona {
    /// Returns true if this persona may handle `task`.
    pub fn allows_task(&self, task: TaskKind) -> bool {
        self.allowed_tasks.contains(&task)
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier("personas.id", &self.id)?;
        if self.system_prompt.trim().is_empty() {
            return Err(ValidationError::empty_field(format!(
                "personas.{}.system_prompt",
                self.id
            )));
        }
        if self.allowed_tasks.is_empty() {
            return Err(ValidationError::empty_field(format!(
                "personas.{}.allowed_tasks",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_kind_parses_known_names() {
        assert_eq!("coding".parse::<TaskKind>().unwrap(), TaskKind::Coding);
    }

    #[test]
    fn task_kind_rejection_names_field() {
        let err = TaskKind::parse_field("payload.task", "juggling").unwrap_err();
        assert_eq!(err.field(), "payload.task");
        assert!(matches!(err, ValidationError::NotInEnum { .. }));
    }

    #[test]
    fn persona_checks_allowed_tasks() {
        let persona = Persona {
            id: "coach".into(),
            display_name: "Coach".into(),
            system_prompt: "Be kind.".into(),
            default_model: "small".into(),
            allowed_tasks: vec![TaskKind::Chat, TaskKind::Support],
            priority: 1,
            event_affinity: vec![],
            tone_affinity: vec![EmotionalTone::Distressed],
        };
        assert!(persona.allows_task(TaskKind::Support));
        assert!(!persona.allows_task(TaskKind::Coding));
        assert!(persona.validate().is_ok());
    }
}
