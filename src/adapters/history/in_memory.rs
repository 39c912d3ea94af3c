//! In-memory conversation history.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{ConversationId, DomainError};
use crate::ports::{HistoryStore, StoredMessage};

/// Messages per conversation in append order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryStore {
    conversations: Arc<RwLock<HashMap<ConversationId, Vec<StoredMessage>>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total messages stored for `conversation_id`.
    pub async fn message_count(&self, conversation_id: &ConversationId) -> usize {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_history(
        &self,
        conversation_id: &ConversationId,
        max_items: usize,
    ) -> Result<Vec<StoredMessage>, DomainError> {
        let conversations = self.conversations.read().await;
        let Some(messages) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let skip = messages.len().saturating_sub(max_items);
        Ok(messages[skip..].to_vec())
    }

    async fn append(&self, messages: &[StoredMessage]) -> Result<(), DomainError> {
        let mut conversations = self.conversations.write().await;
        for message in messages {
            conversations
                .entry(message.conversation_id)
                .or_default()
                .push(message.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MessageRole;

    #[tokio::test]
    async fn history_returns_most_recent_oldest_first() {
        let store = InMemoryHistoryStore::new();
        let conv = ConversationId::new();
        let messages: Vec<_> = (0..5)
            .map(|i| StoredMessage::new(conv, MessageRole::User, format!("m{i}")))
            .collect();
        store.append(&messages).await.unwrap();

        let recent = store.get_history(&conv, 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let store = InMemoryHistoryStore::new();
        let (a, b) = (ConversationId::new(), ConversationId::new());
        store
            .append(&[
                StoredMessage::new(a, MessageRole::User, "hi"),
                StoredMessage::new(b, MessageRole::User, "yo"),
                StoredMessage::new(a, MessageRole::Assistant, "hello").with_model("gpt-4o-mini"),
            ])
            .await
            .unwrap();

        assert_eq!(store.message_count(&a).await, 2);
        assert_eq!(store.message_count(&b).await, 1);
        assert!(store
            .get_history(&ConversationId::new(), 10)
            .await
            .unwrap()
            .is_empty());
    }
}
