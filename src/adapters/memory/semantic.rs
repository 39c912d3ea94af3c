//! In-process vector store and a deterministic feature-hashing embedder.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{Embedder, MemoryFilter, MemoryMatch, MemoryRecord, SemanticMemory};

/// Default embedding width of [`HashingEmbedder`].
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;

/// Cosine similarity; zero when either vector has no magnitude or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Brute-force cosine search over records held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySemanticMemory {
    records: Arc<RwLock<HashMap<String, MemoryRecord>>>,
}

impl InMemorySemanticMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SemanticMemory for InMemorySemanticMemory {
    async fn upsert(&self, record: MemoryRecord) -> Result<(), DomainError> {
        if record.embedding.is_empty() {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("memory record {} has an empty embedding", record.id),
            ));
        }
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryMatch>, DomainError> {
        let records = self.records.read().await;
        let mut matches: Vec<MemoryMatch> = records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| MemoryMatch {
                score: cosine_similarity(embedding, &r.embedding),
                record: r.clone(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// Bag-of-words feature hashing: each lowercase token is hashed with
/// SHA-256 into a bucket and a sign, and the result is L2-normalised.
///
/// Deterministic across processes, so stored vectors stay comparable.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dimensions;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
