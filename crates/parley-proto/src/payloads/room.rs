//! Conversation metadata.

use serde::{Deserialize, Serialize};

use super::{ConversationId, Username};

/// Kind of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatRoomType {
    /// One-to-one conversation.
    Private,
    /// Conversation with more than two participants.
    Group,
}

/// Conversation as returned by the conversation lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    /// Conversation identifier.
    pub id: ConversationId,

    /// Private or group conversation.
    pub chat_room_type: ChatRoomType,

    /// Participants, including the local user.
    #[serde(default)]
    pub users_in_chat: Vec<Username>,

    /// Display name. Private conversations usually have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatRoom {
    /// Recipient for messages sent by `local_user`.
    ///
    /// The first participant that is not `local_user`. A conversation with
    /// only the local user in it addresses messages back to that user.
    pub fn counterpart(&self, local_user: &str) -> Username {
        self.users_in_chat
            .iter()
            .find(|user| user.as_str() != local_user)
            .cloned()
            .unwrap_or_else(|| local_user.to_owned())
    }
}
