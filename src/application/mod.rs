//! Application layer - request orchestration over the pipeline.
//!
//! `RequestOrchestrator` is the entry point; `stages` holds the pipeline
//! steps that adapt ports into the fixed stage sequence.

pub mod errors;
pub mod memory_extraction;
pub mod orchestrator;
pub mod stages;

pub use errors::OrchestratorError;
pub use memory_extraction::{extract_facts, ExtractionJob, MemoryExtractor};
pub use orchestrator::{
    ProcessEventResult, RequestOrchestrator, ResponseMetadata, RouteMessageRequest,
    RouteMessageResult, DEFAULT_REQUEST_TIMEOUT,
};
pub use stages::{build_pipeline, PipelineDeps, StageSettings};
