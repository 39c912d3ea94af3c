//! HistoryStore port - persisted conversation messages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConversationId, DomainError, MessageId, Timestamp};
use crate::ports::{Message, MessageRole};

/// A message persisted in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    /// Model that produced an assistant message.
    pub model: Option<String>,
    pub created_at: Timestamp,
}

impl StoredMessage {
    /// Creates a message stamped now.
    pub fn new(
        conversation_id: ConversationId,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            role,
            content: content.into(),
            model: None,
            created_at: Timestamp::now(),
        }
    }

    /// Records the model that produced this message.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Provider-facing form of this message.
    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.content.clone())
    }
}

/// Port for conversation history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The most recent `max_items` messages, oldest first.
    async fn get_history(
        &self,
        conversation_id: &ConversationId,
        max_items: usize,
    ) -> Result<Vec<StoredMessage>, DomainError>;

    /// Append messages to their conversations in order.
    async fn append(&self, messages: &[StoredMessage]) -> Result<(), DomainError>;
}
