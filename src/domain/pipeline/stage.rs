//! The fixed pipeline stage sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pipeline stage. Stages always run in [`PipelineStage::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Ingest,
    Validate,
    ContextAnalysis,
    PersonalityRouting,
    CapabilityExecution,
    MemoryUpdate,
    ResponseGeneration,
    FeedbackLoop,
}

impl PipelineStage {
    pub const ORDER: [PipelineStage; 8] = [
        PipelineStage::Ingest,
        PipelineStage::Validate,
        PipelineStage::ContextAnalysis,
        PipelineStage::PersonalityRouting,
        PipelineStage::CapabilityExecution,
        PipelineStage::MemoryUpdate,
        PipelineStage::ResponseGeneration,
        PipelineStage::FeedbackLoop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Ingest => "ingest",
            PipelineStage::Validate => "validate",
            PipelineStage::ContextAnalysis => "context_analysis",
            PipelineStage::PersonalityRouting => "personality_routing",
            PipelineStage::CapabilityExecution => "capability_execution",
            PipelineStage::MemoryUpdate => "memory_update",
            PipelineStage::ResponseGeneration => "response_generation",
            PipelineStage::FeedbackLoop => "feedback_loop",
        }
    }

    /// Zero-based position in the stage order.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
