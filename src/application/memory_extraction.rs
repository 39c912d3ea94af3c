//! Background extraction of durable facts from a finished exchange.
//!
//! Runs on its own task after the response has been assembled. Nothing
//! waits for it and its failures are only logged.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::domain::foundation::{ConversationId, DomainError, UserId};
use crate::ports::{Embedder, MemoryRecord, SemanticMemory};

const FACT_MARKERS: &[&str] = &[
    "i am ", "i'm ", "i like ", "i love ", "i prefer ", "i work ", "i live ", "i have ", "my ",
];

/// Sentences of `text` that state something about the speaker.
pub fn extract_facts(text: &str) -> Vec<String> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| s.split_whitespace().count() >= 3)
        .filter(|s| {
            let lower = format!("{} ", s.to_lowercase());
            FACT_MARKERS
                .iter()
                .any(|m| lower.starts_with(m) || lower.contains(&format!(" {}", m)))
        })
        .map(str::to_string)
        .collect()
}

/// Input for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub caller_id: UserId,
    pub conversation_id: ConversationId,
    pub user_message: String,
}

pub struct MemoryExtractor {
    semantic: Arc<dyn SemanticMemory>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryExtractor {
    pub fn new(semantic: Arc<dyn SemanticMemory>, embedder: Arc<dyn Embedder>) -> Self {
        Self { semantic, embedder }
    }

    /// Spawns the extraction and returns immediately.
    pub fn spawn(self: &Arc<Self>, job: ExtractionJob) -> JoinHandle<()> {
        let extractor = Arc::clone(self);
        tokio::spawn(async move {
            match extractor.extract(&job).await {
                Ok(0) => {}
                Ok(stored) => tracing::debug!(
                    caller_id = %job.caller_id,
                    facts = stored,
                    "memory extraction stored facts"
                ),
                Err(err) => tracing::warn!(
                    caller_id = %job.caller_id,
                    error = %err,
                    "memory extraction failed"
                ),
            }
        })
    }

    /// Stores each extracted fact, keyed by caller and text so repeats
    /// overwrite instead of piling up.
    pub async fn extract(&self, job: &ExtractionJob) -> Result<usize, DomainError> {
        let facts = extract_facts(&job.user_message);
        for fact in &facts {
            let mut hasher = Sha256::new();
            hasher.update(job.caller_id.as_str().as_bytes());
            hasher.update(fact.to_lowercase().as_bytes());
            let id = format!("fact:{:x}", hasher.finalize());

            let embedding = self.embedder.embed(fact).await?;
            let record = MemoryRecord::new(id, fact.clone(), embedding)
                .with_metadata("caller_id", job.caller_id.as_str())
                .with_metadata("conversation_id", job.conversation_id.to_string())
                .with_metadata("kind", "fact");
            self.semantic.upsert(record).await?;
        }
        Ok(facts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{HashingEmbedder, InMemorySemanticMemory};
    use crate::ports::MemoryFilter;

    #[test]
    fn picks_first_person_statements() {
        let facts = extract_facts(
            "Hi there. I work as a nurse in Leeds! What is the weather? My dog is called Rex.",
        );
        assert_eq!(
            facts,
            vec!["I work as a nurse in Leeds", "My dog is called Rex"]
        );
        assert!(extract_facts("What time is it?").is_empty());
    }

    #[tokio::test]
    async fn spawned_extraction_stores_deduplicated_facts() {
        let semantic = InMemorySemanticMemory::new();
        let extractor = Arc::new(MemoryExtractor::new(
            Arc::new(semantic.clone()),
            Arc::new(HashingEmbedder::default()),
        ));
        let job = ExtractionJob {
            caller_id: UserId::new("alice").unwrap(),
            conversation_id: ConversationId::new(),
            user_message: "I love climbing. I love climbing.".into(),
        };

        extractor.spawn(job.clone()).await.unwrap();
        extractor.spawn(job).await.unwrap();

        assert_eq!(semantic.len().await, 1);
        let embedding = HashingEmbedder::default().embed("climbing").await.unwrap();
        let found = semantic
            .query(&embedding, 5, &MemoryFilter::new().with("kind", "fact"))
            .await
            .unwrap();
        assert_eq!(found[0].record.text, "I love climbing");
    }
}
