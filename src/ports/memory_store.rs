//! Memory ports - short-term key/value cache, long-term semantic memory, and
//! the embedder that turns text into vectors for semantic recall.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::foundation::DomainError;

/// Port for short-lived session state with per-entry time-to-live.
#[async_trait]
pub trait ShortTermMemory: Send + Sync {
    /// Read a value; expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Write a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    /// Remove a value.
    async fn delete(&self, key: &str) -> Result<(), DomainError>;
}

/// A record in semantic memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Upsert key.
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Exact-match filter fields (caller, kind, conversation).
    pub metadata: HashMap<String, String>,
}

impl MemoryRecord {
    /// Creates a record without metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding,
            metadata: HashMap::new(),
        }
    }

    /// Adds a metadata field.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Exact-match metadata filter; every entry must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFilter {
    pub equals: HashMap<String, String>,
}

impl MemoryFilter {
    /// An empty filter matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `key == value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    /// Returns true if `metadata` satisfies every condition.
    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|m| m == v))
    }
}

/// A semantic memory hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMatch {
    pub record: MemoryRecord,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Port for vector-indexed long-term memory.
#[async_trait]
pub trait SemanticMemory: Send + Sync {
    /// Insert or replace a record by id.
    async fn upsert(&self, record: MemoryRecord) -> Result<(), DomainError>;

    /// The `top_k` records most similar to `embedding` that pass `filter`,
    /// best first.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryMatch>, DomainError>;
}

/// Port for text embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text` into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError>;

    /// Vector dimension.
    fn dimensions(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let record = MemoryRecord::new("1", "hello", vec![1.0]);
        assert!(MemoryFilter::new().matches(&record.metadata));
    }

    #[test]
    fn filter_requires_all_fields() {
        let record = MemoryRecord::new("1", "hello", vec![1.0])
            .with_metadata("caller_id", "alice")
            .with_metadata("kind", "fact");

        assert!(MemoryFilter::new()
            .with("caller_id", "alice")
            .matches(&record.metadata));
        assert!(!MemoryFilter::new()
            .with("caller_id", "alice")
            .with("kind", "message")
            .matches(&record.metadata));
        assert!(!MemoryFilter::new()
            .with("conversation_id", "c1")
            .matches(&record.metadata));
    }
}
