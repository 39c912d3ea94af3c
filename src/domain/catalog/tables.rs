//! The static configuration tables: plans, personas and models.
//!
//! Built-in defaults cover the common deployment; operators may replace them
//! with a YAML document of the same shape.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use super::{EmotionalTone, ModelDescriptor, Persona, PlanDefinition, PlanTier, TaskKind};
use crate::domain::foundation::ValidationError;
use crate::domain::pipeline::EventKind;

/// Errors raised while loading or querying the catalog.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(String),

    #[error("failed to parse catalog: {0}")]
    Parse(String),

    #[error("invalid catalog: {0}")]
    Invalid(#[from] ValidationError),

    #[error("unknown model '{0}'")]
    UnknownModel(String),
}

/// How the model for a request was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// Named by the caller.
    Explicit,
    /// Recommended for the task among models the plan allows.
    Recommended,
    /// The persona's default model.
    PersonaDefault,
    /// Replaced because the plan does not permit the chosen model.
    PlanDowngrade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub model: String,
    pub source: ModelSource,
    /// Model that was replaced by a plan downgrade.
    pub downgraded_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    plans: Vec<PlanDefinition>,
    personas: Vec<Persona>,
    models: Vec<ModelDescriptor>,
}

impl Catalog {
    /// Builds a catalog, checking cross references.
    pub fn new(
        plans: Vec<PlanDefinition>,
        personas: Vec<Persona>,
        models: Vec<ModelDescriptor>,
    ) -> Result<Self, CatalogError> {
        let catalog = Self {
            plans,
            personas,
            models,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parses a YAML catalog document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let raw: Catalog =
            serde_yaml::from_str(yaml).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(raw.plans, raw.personas, raw.models)
    }

    /// Reads and parses a YAML catalog file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| CatalogError::Io(e.to_string()))?;
        Self::from_yaml_str(&contents)
    }

    pub fn plan(&self, tier: PlanTier) -> Option<&PlanDefinition> {
        self.plans.iter().find(|p| p.tier == tier)
    }

    pub fn persona(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn model(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Name of the provider serving `model`.
    pub fn provider_for_model(&self, model: &str) -> Option<&str> {
        self.model(model).map(|m| m.provider.as_str())
    }

    /// Picks the model for a request.
    ///
    /// Precedence: explicit request, then a task recommendation among models
    /// the plan allows, then the persona default. A choice the plan does not
    /// permit is replaced by the first permitted model of the plan's
    /// downgrade chain.
    pub fn select_model(
        &self,
        plan: &PlanDefinition,
        persona: &Persona,
        task: TaskKind,
        explicit: Option<&str>,
    ) -> Result<ModelSelection, CatalogError> {
        let (candidate, source) = match explicit {
            Some(model) => {
                if self.model(model).is_none() {
                    return Err(CatalogError::UnknownModel(model.to_string()));
                }
                (model.to_string(), ModelSource::Explicit)
            }
            None => match self.recommend(plan, persona, task) {
                Some(model) => (model.to_string(), ModelSource::Recommended),
                None => (persona.default_model.clone(), ModelSource::PersonaDefault),
            },
        };

        if plan.allows_model(&candidate) {
            return Ok(ModelSelection {
                model: candidate,
                source,
                downgraded_from: None,
            });
        }

        let replacement = plan
            .first_permitted_model()
            .ok_or_else(|| CatalogError::UnknownModel(candidate.clone()))?;
        Ok(ModelSelection {
            model: replacement.to_string(),
            source: ModelSource::PlanDowngrade,
            downgraded_from: Some(candidate),
        })
    }

    fn recommend<'a>(
        &self,
        plan: &'a PlanDefinition,
        persona: &'a Persona,
        task: TaskKind,
    ) -> Option<&'a str> {
        let recommended = |id: &str| {
            plan.allows_model(id) && self.model(id).is_some_and(|m| m.recommended_for(task))
        };
        if recommended(&persona.default_model) {
            return Some(persona.default_model.as_str());
        }
        plan.downgrade_chain
            .iter()
            .chain(plan.allowed_models.iter())
            .find(|id| recommended(id))
            .map(String::as_str)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut model_ids = HashSet::new();
        for model in &self.models {
            if !model_ids.insert(model.id.as_str()) {
                return Err(ValidationError::invalid_format(
                    "models.id",
                    format!("duplicate model '{}'", model.id),
                ));
            }
        }
        let known = |field: String, id: &str| {
            if model_ids.contains(id) {
                Ok(())
            } else {
                Err(ValidationError::invalid_format(
                    field,
                    format!("unknown model '{}'", id),
                ))
            }
        };

        if self.personas.is_empty() {
            return Err(ValidationError::empty_field("personas"));
        }
        let mut persona_ids = HashSet::new();
        for persona in &self.personas {
            persona.validate()?;
            if !persona_ids.insert(persona.id.as_str()) {
                return Err(ValidationError::invalid_format(
                    "personas.id",
                    format!("duplicate persona '{}'", persona.id),
                ));
            }
            known(format!("personas.{}.default_model", persona.id), &persona.default_model)?;
        }

        let mut tiers = HashSet::new();
        for plan in &self.plans {
            plan.validate()?;
            if !tiers.insert(plan.tier) {
                return Err(ValidationError::invalid_format(
                    "plans.tier",
                    format!("duplicate plan '{}'", plan.tier),
                ));
            }
            for id in plan.allowed_models.iter().chain(plan.downgrade_chain.iter()) {
                known(format!("plans.{}", plan.tier), id)?;
            }
        }
        Ok(())
    }

    fn builtin() -> Self {
        let s = |v: &[&str]| v.iter().map(|m| m.to_string()).collect::<Vec<_>>();
        let full_chain = s(&[
            "claude-sonnet",
            "gpt-4o",
            "claude-haiku",
            "gpt-4o-mini",
            "llama-3-70b",
        ]);

        let plans = vec![
            PlanDefinition {
                tier: PlanTier::Free,
                context_messages: 10,
                daily_message_quota: Some(50),
                degrade_factor: 0.5,
                allowed_models: s(&["gpt-4o-mini", "claude-haiku", "llama-3-70b"]),
                downgrade_chain: full_chain.clone(),
            },
            PlanDefinition {
                tier: PlanTier::Pro,
                context_messages: 40,
                daily_message_quota: Some(500),
                degrade_factor: 0.5,
                allowed_models: full_chain.clone(),
                downgrade_chain: full_chain.clone(),
            },
            PlanDefinition {
                tier: PlanTier::Enterprise,
                context_messages: 100,
                daily_message_quota: None,
                degrade_factor: 0.75,
                allowed_models: full_chain.clone(),
                downgrade_chain: full_chain,
            },
        ];

        let personas = vec![
            Persona {
                id: "assistant".into(),
                display_name: "Assistant".into(),
                system_prompt: "You are a helpful, concise assistant.".into(),
                default_model: "gpt-4o-mini".into(),
                allowed_tasks: vec![
                    TaskKind::Chat,
                    TaskKind::Analysis,
                    TaskKind::Summarize,
                    TaskKind::Support,
                ],
                priority: 0,
                event_affinity: vec![EventKind::Chat, EventKind::CapabilityAvailability],
                tone_affinity: vec![EmotionalTone::Neutral],
            },
            Persona {
                id: "coach".into(),
                display_name: "Coach".into(),
                system_prompt: "You are a patient, encouraging coach. Acknowledge feelings before giving advice.".into(),
                default_model: "claude-haiku".into(),
                allowed_tasks: vec![TaskKind::Chat, TaskKind::Support],
                priority: 1,
                event_affinity: vec![EventKind::Chat],
                tone_affinity: vec![EmotionalTone::Negative, EmotionalTone::Distressed],
            },
            Persona {
                id: "engineer".into(),
                display_name: "Engineer".into(),
                system_prompt: "You are a precise software engineer. Prefer working code and concrete steps.".into(),
                default_model: "claude-sonnet".into(),
                allowed_tasks: vec![TaskKind::Chat, TaskKind::Coding, TaskKind::Analysis],
                priority: 2,
                event_affinity: vec![EventKind::CapabilityInvocation],
                tone_affinity: vec![],
            },
            Persona {
                id: "storyteller".into(),
                display_name: "Storyteller".into(),
                system_prompt: "You are an imaginative storyteller with a warm voice.".into(),
                default_model: "gpt-4o".into(),
                allowed_tasks: vec![TaskKind::Chat, TaskKind::Creative],
                priority: 3,
                event_affinity: vec![],
                tone_affinity: vec![EmotionalTone::Positive],
            },
        ];

        let model = |id: &str, provider: &str, tasks: &[TaskKind], context_tokens: u32| {
            ModelDescriptor {
                id: id.into(),
                provider: provider.into(),
                recommended_tasks: tasks.to_vec(),
                context_tokens,
            }
        };
        let models = vec![
            model(
                "claude-sonnet",
                "anthropic",
                &[TaskKind::Coding, TaskKind::Analysis, TaskKind::Creative],
                200_000,
            ),
            model(
                "gpt-4o",
                "openai",
                &[TaskKind::Chat, TaskKind::Coding, TaskKind::Analysis, TaskKind::Creative],
                128_000,
            ),
            model(
                "claude-haiku",
                "anthropic",
                &[TaskKind::Chat, TaskKind::Support, TaskKind::Summarize],
                200_000,
            ),
            model(
                "gpt-4o-mini",
                "openai",
                &[TaskKind::Chat, TaskKind::Summarize, TaskKind::Support],
                128_000,
            ),
            model("llama-3-70b", "local", &[TaskKind::Chat, TaskKind::Summarize], 8_192),
        ];

        Self {
            plans,
            personas,
            models,
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
