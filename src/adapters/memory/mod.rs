//! Memory adapters.
//!
//! - `InMemoryShortTermMemory` - TTL map for session state
//! - `RedisShortTermMemory` - Redis `SET EX` session state
//! - `InMemorySemanticMemory` - Cosine-similarity vector store
//! - `HashingEmbedder` - Deterministic feature-hashing embeddings

mod semantic;
mod short_term;

pub use semantic::{
    cosine_similarity, HashingEmbedder, InMemorySemanticMemory, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use short_term::{InMemoryShortTermMemory, RedisShortTermMemory};
