//! Chat message payload and delivery status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, CorrelationToken, ServerId, Username};

/// Delivery progress of a message.
///
/// Variants are declared in lifecycle order so `Ord` reflects progress:
/// `Sending < Sent < Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Created locally, not yet confirmed by the server.
    Sending,
    /// Persisted by the server.
    Sent,
    /// Read by the receiver.
    Read,
}

impl DeliveryStatus {
    /// The furthest of two statuses. Status never moves backwards.
    #[must_use]
    pub fn advance(self, other: Self) -> Self {
        self.max(other)
    }
}

/// A chat message on the wire.
///
/// Used for outbound sends (no `id` yet), inbound deliveries on the personal
/// message queue, and status updates on the message-status queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Server-assigned identifier. Absent on outbound sends.
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<ServerId>,

    /// Client correlation token. The server may or may not echo it.
    #[serde(rename = "correlationToken", default, skip_serializing_if = "Option::is_none")]
    pub correlation_token: Option<CorrelationToken>,

    /// Conversation the message belongs to.
    #[serde(rename = "chatRoomId")]
    pub conversation_id: ConversationId,

    /// Author of the message. Status updates may omit it.
    #[serde(rename = "senderUsername", default)]
    pub sender_id: Username,

    /// Recipient of the message. Status updates may omit it.
    #[serde(rename = "receiverUsername", default)]
    pub receiver_id: Username,

    /// Message text. Status updates may omit it.
    #[serde(default)]
    pub content: String,

    /// Send time. Assigned by the server; optimistic copies carry local time.
    #[serde(rename = "sendAt", default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,

    /// Delivery status. Servers that predate receipts omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
}
