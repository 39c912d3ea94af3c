//! In-memory stage observer for assertions.

use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::pipeline::{PipelineStage, StageNotification, StageObserver};

/// Captures every notification in arrival order.
///
/// Clones share the same buffer, so a clone can be handed to the engine
/// while the original is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingStageObserver {
    notifications: Arc<Mutex<Vec<StageNotification>>>,
}

impl RecordingStageObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<StageNotification> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stages that reported `StageStarted`, in order.
    pub fn started_stages(&self) -> Vec<PipelineStage> {
        self.notifications()
            .iter()
            .filter(|n| matches!(n, StageNotification::StageStarted { .. }))
            .map(StageNotification::stage)
            .collect()
    }

    /// Stages that reported `StageCompleted`, in order.
    pub fn completed_stages(&self) -> Vec<PipelineStage> {
        self.notifications()
            .iter()
            .filter(|n| matches!(n, StageNotification::StageCompleted { .. }))
            .map(StageNotification::stage)
            .collect()
    }

    pub fn failures(&self) -> Vec<StageNotification> {
        self.notifications()
            .into_iter()
            .filter(|n| matches!(n, StageNotification::StageFailed { .. }))
            .collect()
    }

    pub fn clear(&self) {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl StageObserver for RecordingStageObserver {
    fn notify(&self, notification: &StageNotification) {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
    }
}
