//! Presence payloads: typing signals and read receipts.

use serde::{Deserialize, Serialize};

use super::{ConversationId, ServerId, Username};

/// "User is typing" signal.
///
/// Published on transitions only. Receivers treat a `typing: true` signal as
/// a lease that expires unless refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPayload {
    /// Conversation the signal applies to.
    #[serde(rename = "chatRoomId")]
    pub conversation_id: ConversationId,

    /// User whose compose state changed.
    pub username: Username,

    /// Whether the user currently has non-blank text in the compose box.
    #[serde(rename = "typing")]
    pub is_typing: bool,
}

/// Read receipt for a persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceiptPayload {
    /// Server identifier of the message that was read.
    #[serde(rename = "messageId")]
    pub message_server_id: ServerId,

    /// Original author, so the server can route the status update.
    #[serde(rename = "senderUsername")]
    pub sender_id: Username,
}
