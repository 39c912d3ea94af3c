//! PersonalityRouting step: persona scoring, task check and model selection.

use async_trait::async_trait;
use std::sync::Arc;

use super::keys::{self, CallerContext};
use super::validated_event;
use crate::domain::catalog::{Catalog, CatalogError, EmotionalTone, ModelSource, Persona, TaskKind};
use crate::domain::foundation::ErrorCode;
use crate::domain::pipeline::{
    detect_tone, select_persona, PersonaSignals, PipelineContext, PipelineStep, StepError,
};

pub struct SelectPersonaStep {
    pub catalog: Arc<Catalog>,
}

impl SelectPersonaStep {
    /// Personas eligible for `task`. An explicit target is always eligible so
    /// that a mismatch surfaces as `TaskNotAllowed` instead of being ignored.
    fn candidates(&self, task: TaskKind, target: Option<&str>) -> Vec<Persona> {
        self.catalog
            .personas()
            .iter()
            .filter(|p| target == Some(p.id.as_str()) || (target.is_none() && p.allows_task(task)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PipelineStep for SelectPersonaStep {
    fn name(&self) -> &'static str {
        "select_persona"
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let event = validated_event(ctx)?;
        let caller: CallerContext = ctx.require(keys::CALLER)?;
        let kind = ctx.event().kind();
        let target = ctx.event().target_persona().map(str::to_string);

        if let Some(target) = &target {
            if self.catalog.persona(target).is_none() {
                return Err(StepError::rejected(
                    ErrorCode::PersonaNotFound,
                    format!("persona '{}' does not exist", target),
                ));
            }
        }

        let chat = event.payload.as_chat();
        let tone = chat
            .map(|c| detect_tone(&c.message))
            .unwrap_or(EmotionalTone::Neutral);
        let task = chat.map(|c| c.task).unwrap_or(TaskKind::Chat);
        // A stale preference for a removed persona is ignored.
        let preferred = caller
            .preferred_persona
            .as_deref()
            .filter(|p| self.catalog.persona(p).is_some());

        let candidates = self.candidates(task, target.as_deref());
        let signals = PersonaSignals {
            kind,
            tone,
            task,
            target: target.as_deref(),
            preferred,
        };
        let choice = select_persona(&candidates, &signals).ok_or_else(|| {
            StepError::rejected(
                ErrorCode::TaskNotAllowed,
                format!("no persona handles {} tasks", task.as_str()),
            )
        })?;
        let persona = candidates
            .iter()
            .find(|p| p.id == choice.persona_id)
            .ok_or_else(|| {
                StepError::rejected(ErrorCode::PersonaNotFound, "selected persona vanished")
            })?;

        if let Some(chat) = chat {
            if !persona.allows_task(chat.task) {
                return Err(StepError::rejected(
                    ErrorCode::TaskNotAllowed,
                    format!(
                        "persona '{}' does not handle {} tasks",
                        persona.id,
                        chat.task.as_str()
                    ),
                ));
            }
            let plan = caller
                .plan
                .and_then(|tier| self.catalog.plan(tier))
                .ok_or_else(|| {
                    StepError::rejected(ErrorCode::InvalidPlan, "caller has no usable plan")
                })?;
            let selection = self
                .catalog
                .select_model(plan, persona, chat.task, chat.model.as_deref())
                .map_err(|err| match err {
                    CatalogError::UnknownModel(model) => StepError::rejected(
                        ErrorCode::ModelNotFound,
                        format!("model '{}' is not known", model),
                    ),
                    other => StepError::rejected(ErrorCode::InternalError, other.to_string()),
                })?;
            if selection.source == ModelSource::PlanDowngrade {
                tracing::info!(
                    requested = selection.downgraded_from.as_deref().unwrap_or_default(),
                    model = %selection.model,
                    plan = %plan.tier,
                    "model not permitted by plan, downgraded"
                );
            }
            ctx.insert(keys::MODEL, &selection)?;
        }

        tracing::debug!(persona = %choice.persona_id, score = choice.score, ?tone, "persona selected");
        ctx.insert(keys::PERSONA, &choice)?;
        Ok(())
    }
}
