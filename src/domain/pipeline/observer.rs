//! Stage transition notifications.
//!
//! Observers are invoked inline by the engine and must return promptly.
//! [`BroadcastStageObserver`] fans notifications out over a
//! `tokio::sync::broadcast` channel; slow subscribers lag and lose messages
//! rather than holding up the pipeline.

use serde::Serialize;
use tokio::sync::broadcast;

use super::{ContextSnapshot, PipelineStage};
use crate::domain::foundation::ErrorCode;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageNotification {
    StageStarted {
        stage: PipelineStage,
        snapshot: ContextSnapshot,
    },
    StageCompleted {
        stage: PipelineStage,
        duration_ms: u64,
        snapshot: ContextSnapshot,
    },
    StageFailed {
        stage: PipelineStage,
        step: &'static str,
        code: ErrorCode,
        snapshot: ContextSnapshot,
    },
}

impl StageNotification {
    pub fn stage(&self) -> PipelineStage {
        match self {
            StageNotification::StageStarted { stage, .. }
            | StageNotification::StageCompleted { stage, .. }
            | StageNotification::StageFailed { stage, .. } => *stage,
        }
    }
}

/// Receives stage transitions. Must not block.
pub trait StageObserver: Send + Sync {
    fn notify(&self, notification: &StageNotification);
}

/// Publishes every notification on a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastStageObserver {
    sender: broadcast::Sender<StageNotification>,
}

impl BroadcastStageObserver {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageNotification> {
        self.sender.subscribe()
    }
}

impl StageObserver for BroadcastStageObserver {
    fn notify(&self, notification: &StageNotification) {
        // No subscribers is not an error.
        let _ = self.sender.send(notification.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::EventId;

    fn snapshot() -> ContextSnapshot {
        ContextSnapshot {
            event_id: EventId::new(),
            stage: Some(PipelineStage::Ingest),
            data_keys: vec![],
            warnings: 0,
            errors: 0,
            elapsed_ms: 0,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let observer = BroadcastStageObserver::new(8);
        let mut rx = observer.subscribe();

        observer.notify(&StageNotification::StageStarted {
            stage: PipelineStage::Ingest,
            snapshot: snapshot(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.stage(), PipelineStage::Ingest);
    }

    #[test]
    fn notify_without_subscribers_is_silent() {
        let observer = BroadcastStageObserver::new(1);
        observer.notify(&StageNotification::StageStarted {
            stage: PipelineStage::Ingest,
            snapshot: snapshot(),
        });
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let observer = BroadcastStageObserver::new(2);
        let mut rx = observer.subscribe();

        for stage in PipelineStage::ORDER.iter().take(4) {
            observer.notify(&StageNotification::StageStarted {
                stage: *stage,
                snapshot: snapshot(),
            });
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().stage(), PipelineStage::ContextAnalysis);
    }
}
