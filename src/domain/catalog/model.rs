//! Model descriptors: which provider serves a model and what it is good at.

use serde::{Deserialize, Serialize};

use super::TaskKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    /// Name of the provider adapter that serves this model.
    pub provider: String,
    /// Tasks this model is recommended for.
    #[serde(default)]
    pub recommended_tasks: Vec<TaskKind>,
    pub context_tokens: u32,
}

impl ModelDescriptor {
    pub fn recommended_for(&self, task: TaskKind) -> bool {
        self.recommended_tasks.contains(&task)
    }
}
