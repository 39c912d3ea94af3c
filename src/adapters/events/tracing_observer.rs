//! Stage observer that writes transitions to the tracing subscriber.

use crate::domain::pipeline::{StageNotification, StageObserver};

/// Emits one structured event per stage transition.
///
/// Starts and completions log at `debug`; failures at `warn` so they show
/// up under the default filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStageObserver;

impl StageObserver for TracingStageObserver {
    fn notify(&self, notification: &StageNotification) {
        match notification {
            StageNotification::StageStarted { stage, snapshot } => {
                tracing::debug!(
                    event_id = %snapshot.event_id,
                    %stage,
                    "stage started"
                );
            }
            StageNotification::StageCompleted {
                stage,
                duration_ms,
                snapshot,
            } => {
                tracing::debug!(
                    event_id = %snapshot.event_id,
                    %stage,
                    duration_ms,
                    warnings = snapshot.warnings,
                    "stage completed"
                );
            }
            StageNotification::StageFailed {
                stage,
                step,
                code,
                snapshot,
            } => {
                tracing::warn!(
                    event_id = %snapshot.event_id,
                    %stage,
                    step,
                    %code,
                    "stage failed"
                );
            }
        }
    }
}
