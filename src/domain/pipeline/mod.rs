//! Pipeline module - the staged request state machine.
//!
//! # Module Structure
//!
//! - `event` - Inbound events, payload kinds and one-time validation
//! - `stage` - The fixed eight-stage order
//! - `context` - Per-request data map, issues and timings
//! - `step` - The `PipelineStep` trait and step errors
//! - `engine` - Runs stages in order with best-effort and cancellation handling
//! - `observer` - Stage notifications and the broadcast observer
//! - `context_hash` - Deterministic SHA-256 context hashing
//! - `persona_selector` - Tone detection and persona scoring

mod context;
mod context_hash;
mod engine;
mod event;
mod observer;
mod persona_selector;
mod stage;
mod step;

pub use context::{
    ContextDataError, ContextSnapshot, PipelineContext, PipelineIssue, PipelineMetrics,
    StageTiming,
};
pub use context_hash::{context_hash, hash_value, ContextHashInput};
pub use engine::{PipelineEngine, PipelineEngineBuilder, PipelineError};
pub use event::{
    AvailabilityQuery, CapabilityCall, ChatRequest, EventKind, EventPayload, PipelineEvent,
    ValidatedEvent, MAX_MESSAGE_CHARS, MAX_PRIORITY,
};
pub use observer::{BroadcastStageObserver, StageNotification, StageObserver};
pub use persona_selector::{
    detect_tone, score_persona, select_persona, PersonaChoice, PersonaSignals,
};
pub use stage::PipelineStage;
pub use step::{PipelineStep, StepError};
