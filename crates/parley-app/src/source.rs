//! Conversation lookup abstraction.

use std::future::Future;

use parley_proto::{ChatRoom, MessagePayload};

/// Metadata and history of one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConversation {
    /// Conversation metadata.
    pub room: ChatRoom,
    /// Message history, oldest first.
    pub messages: Vec<MessagePayload>,
}

/// Fetches conversations, typically over HTTP.
pub trait ConversationSource: Send {
    /// Source-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Load metadata and history for `conversation_id`.
    fn load(
        &mut self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<LoadedConversation, Self::Error>> + Send;
}
