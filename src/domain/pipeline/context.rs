//! Per-request pipeline state.
//!
//! A [`PipelineContext`] is owned by exactly one in-flight request. Steps
//! share intermediate results through its JSON data map, using the typed
//! [`insert`](PipelineContext::insert) / [`get`](PipelineContext::get)
//! helpers so that every value crossing a step boundary is serializable.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use super::{PipelineEvent, PipelineStage, ValidatedEvent};
use crate::domain::foundation::{CancellationSignal, ErrorCode, EventId};

/// Failure reading or writing the data map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextDataError {
    #[error("context key '{key}' is missing")]
    Missing { key: String },

    #[error("context key '{key}' could not be encoded: {message}")]
    Encode { key: String, message: String },

    #[error("context key '{key}' has unexpected shape: {message}")]
    Decode { key: String, message: String },
}

/// A warning or error recorded against a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineIssue {
    pub stage: PipelineStage,
    pub step: &'static str,
    pub code: ErrorCode,
    pub message: String,
}

/// Wall-clock duration of one completed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    pub stage: PipelineStage,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    started_at: Instant,
    stage_durations: Vec<(PipelineStage, Duration)>,
    total: Option<Duration>,
}

impl PipelineMetrics {
    fn start() -> Self {
        Self {
            started_at: Instant::now(),
            stage_durations: Vec::with_capacity(PipelineStage::ORDER.len()),
            total: None,
        }
    }

    pub(crate) fn record_stage(&mut self, stage: PipelineStage, duration: Duration) {
        self.stage_durations.push((stage, duration));
    }

    pub(crate) fn finish(&mut self) {
        self.total = Some(self.started_at.elapsed());
    }

    pub fn stage_duration(&self, stage: PipelineStage) -> Option<Duration> {
        self.stage_durations
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }

    pub fn timings(&self) -> Vec<StageTiming> {
        self.stage_durations
            .iter()
            .map(|(stage, d)| StageTiming {
                stage: *stage,
                duration_ms: d.as_millis() as u64,
            })
            .collect()
    }

    /// Total duration once the run has finished, elapsed time before that.
    pub fn total(&self) -> Duration {
        self.total.unwrap_or_else(|| self.started_at.elapsed())
    }
}

/// Serializable view of a context handed to stage observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub event_id: EventId,
    pub stage: Option<PipelineStage>,
    pub data_keys: Vec<String>,
    pub warnings: usize,
    pub errors: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
pub struct PipelineContext {
    event: PipelineEvent,
    validated: Option<ValidatedEvent>,
    stage: Option<PipelineStage>,
    data: Map<String, Value>,
    warnings: Vec<PipelineIssue>,
    errors: Vec<PipelineIssue>,
    metrics: PipelineMetrics,
    cancellation: CancellationSignal,
}

impl PipelineContext {
    pub fn new(event: PipelineEvent, cancellation: CancellationSignal) -> Self {
        Self {
            event,
            validated: None,
            stage: None,
            data: Map::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            metrics: PipelineMetrics::start(),
            cancellation,
        }
    }

    pub fn event(&self) -> &PipelineEvent {
        &self.event
    }

    /// The event after the Validate stage accepted it.
    pub fn validated(&self) -> Option<&ValidatedEvent> {
        self.validated.as_ref()
    }

    pub fn set_validated(&mut self, validated: ValidatedEvent) {
        self.validated = Some(validated);
    }

    pub fn stage(&self) -> Option<PipelineStage> {
        self.stage
    }

    pub(crate) fn enter_stage(&mut self, stage: PipelineStage) {
        self.stage = Some(stage);
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), ContextDataError> {
        let encoded = serde_json::to_value(value).map_err(|e| ContextDataError::Encode {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.data.insert(key.to_string(), encoded);
        Ok(())
    }

    /// Reads `key`, `Ok(None)` when absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ContextDataError> {
        match self.data.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ContextDataError::Decode {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Reads `key`, failing when absent.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextDataError> {
        self.get(key)?.ok_or_else(|| ContextDataError::Missing {
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn warn(&mut self, issue: PipelineIssue) {
        self.warnings.push(issue);
    }

    pub fn warnings(&self) -> &[PipelineIssue] {
        &self.warnings
    }

    pub(crate) fn record_error(&mut self, issue: PipelineIssue) {
        self.errors.push(issue);
    }

    pub fn errors(&self) -> &[PipelineIssue] {
        &self.errors
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub(crate) fn metrics_mut(&mut self) -> &mut PipelineMetrics {
        &mut self.metrics
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            event_id: self.event.id(),
            stage: self.stage,
            data_keys: self.data.keys().cloned().collect(),
            warnings: self.warnings.len(),
            errors: self.errors.len(),
            elapsed_ms: self.metrics.total().as_millis() as u64,
        }
    }
}
