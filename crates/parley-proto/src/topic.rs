//! Logical destinations and topics.
//!
//! Names are configurable so the client can follow whatever routing prefix
//! the broker is deployed with. Defaults match the reference server.

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the conversation id in per-conversation
/// topic templates.
pub const CONVERSATION_PLACEHOLDER: &str = "{conversationId}";

/// Outbound destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Destinations {
    /// Where new messages are published.
    pub send_message: String,
    /// Where typing transitions are published.
    pub typing: String,
    /// Where read receipts are published.
    pub read_receipt: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            send_message: "/app/send.message".to_owned(),
            typing: "/app/typing".to_owned(),
            read_receipt: "/app/read.receipt".to_owned(),
        }
    }
}

/// Inbound topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topics {
    /// Personal queue delivering messages addressed to or echoed for the user.
    pub messages: String,
    /// Personal queue delivering delivery-status updates.
    pub message_status: String,
    /// Per-conversation typing topic template. Must contain
    /// [`CONVERSATION_PLACEHOLDER`].
    pub typing: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            messages: "/user/queue/messages".to_owned(),
            message_status: "/user/queue/message-status".to_owned(),
            typing: format!("/topic/chat.{CONVERSATION_PLACEHOLDER}.typing"),
        }
    }
}

impl Topics {
    /// Typing topic for a specific conversation.
    pub fn typing_for(&self, conversation_id: &str) -> String {
        self.typing.replace(CONVERSATION_PLACEHOLDER, conversation_id)
    }
}
