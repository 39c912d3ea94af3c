//! Pipeline engine - runs the fixed stage sequence over one context.
//!
//! ```text
//! Ingest → Validate → ContextAnalysis → PersonalityRouting →
//! CapabilityExecution → MemoryUpdate → ResponseGeneration → FeedbackLoop
//! ```
//!
//! Every stage is announced to observers even when it has no steps, so
//! subscribers always see all eight transitions of a successful run.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

use super::{
    PipelineContext, PipelineIssue, PipelineStage, PipelineStep, StageNotification,
    StageObserver, StepError,
};
use crate::domain::foundation::ErrorCode;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("stage {stage} failed in step {step}: {source}")]
    StageFailed {
        stage: PipelineStage,
        step: &'static str,
        #[source]
        source: StepError,
    },

    #[error("pipeline cancelled during {stage}")]
    Cancelled { stage: PipelineStage },
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::StageFailed { source, .. } => source.code(),
            PipelineError::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::StageFailed { stage, .. } | PipelineError::Cancelled { stage } => *stage,
        }
    }
}

struct RegisteredStep {
    step: Arc<dyn PipelineStep>,
    best_effort: bool,
}

#[derive(Default)]
pub struct PipelineEngineBuilder {
    stages: BTreeMap<PipelineStage, Vec<RegisteredStep>>,
    observers: Vec<Arc<dyn StageObserver>>,
}

impl PipelineEngineBuilder {
    /// Appends a required step; its failure aborts the pipeline.
    pub fn step(mut self, stage: PipelineStage, step: Arc<dyn PipelineStep>) -> Self {
        self.stages.entry(stage).or_default().push(RegisteredStep {
            step,
            best_effort: false,
        });
        self
    }

    /// Appends a step whose failure is downgraded to a warning.
    pub fn best_effort_step(mut self, stage: PipelineStage, step: Arc<dyn PipelineStep>) -> Self {
        self.stages.entry(stage).or_default().push(RegisteredStep {
            step,
            best_effort: true,
        });
        self
    }

    pub fn observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> PipelineEngine {
        PipelineEngine {
            stages: self.stages,
            observers: self.observers,
        }
    }
}

pub struct PipelineEngine {
    stages: BTreeMap<PipelineStage, Vec<RegisteredStep>>,
    observers: Vec<Arc<dyn StageObserver>>,
}

impl PipelineEngine {
    pub fn builder() -> PipelineEngineBuilder {
        PipelineEngineBuilder::default()
    }

    /// Names of the steps registered for `stage`, in run order.
    pub fn steps(&self, stage: PipelineStage) -> Vec<&'static str> {
        self.stages
            .get(&stage)
            .map(|steps| steps.iter().map(|s| s.step.name()).collect())
            .unwrap_or_default()
    }

    fn notify(&self, notification: StageNotification) {
        for observer in &self.observers {
            observer.notify(&notification);
        }
    }

    /// Runs every stage in order.
    ///
    /// Stops at the first failing required step or when the context's
    /// cancellation signal fires. Stage timings are recorded either way.
    pub async fn run(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let cancel = ctx.cancellation().clone();
        let result = self.run_stages(ctx, &cancel).await;
        ctx.metrics_mut().finish();
        result
    }

    async fn run_stages(
        &self,
        ctx: &mut PipelineContext,
        cancel: &crate::domain::foundation::CancellationSignal,
    ) -> Result<(), PipelineError> {
        for stage in PipelineStage::ORDER {
            ctx.enter_stage(stage);
            self.notify(StageNotification::StageStarted {
                stage,
                snapshot: ctx.snapshot(),
            });
            tracing::debug!(%stage, event_id = %ctx.event().id(), "stage started");
            let started = Instant::now();

            for registered in self.stages.get(&stage).into_iter().flatten() {
                if cancel.is_cancelled() {
                    ctx.metrics_mut().record_stage(stage, started.elapsed());
                    return Err(PipelineError::Cancelled { stage });
                }
                let step_name = registered.step.name();
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(StepError::Cancelled),
                    res = registered.step.run(ctx) => res,
                };

                let err = match outcome {
                    Ok(()) => continue,
                    Err(StepError::Cancelled) => {
                        ctx.metrics_mut().record_stage(stage, started.elapsed());
                        return Err(PipelineError::Cancelled { stage });
                    }
                    Err(err) => err,
                };

                let issue = PipelineIssue {
                    stage,
                    step: step_name,
                    code: err.code(),
                    message: err.to_string(),
                };
                if registered.best_effort {
                    tracing::warn!(%stage, step = step_name, error = %err, "best-effort step failed");
                    ctx.warn(issue);
                    continue;
                }

                ctx.record_error(issue);
                ctx.metrics_mut().record_stage(stage, started.elapsed());
                self.notify(StageNotification::StageFailed {
                    stage,
                    step: step_name,
                    code: err.code(),
                    snapshot: ctx.snapshot(),
                });
                return Err(PipelineError::StageFailed {
                    stage,
                    step: step_name,
                    source: err,
                });
            }

            let elapsed = started.elapsed();
            ctx.metrics_mut().record_stage(stage, elapsed);
            self.notify(StageNotification::StageCompleted {
                stage,
                duration_ms: elapsed.as_millis() as u64,
                snapshot: ctx.snapshot(),
            });
        }
        Ok(())
    }
}
