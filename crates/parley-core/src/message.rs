//! Ledger message model.

use chrono::{DateTime, Utc};
use parley_proto::{
    ConversationId, CorrelationToken, DeliveryStatus, MessagePayload, ServerId, Username,
};

use crate::{LedgerError, identity::IdentityKey};

/// One chat message as held by the ledger.
///
/// Unlike [`MessagePayload`], the delivery status is always known: inbound
/// payloads without a status are persisted messages and default to
/// [`DeliveryStatus::Sent`].
///
/// # Invariants
///
/// - A message stored in a [`crate::Ledger`] has a server id, a correlation
///   token, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned identifier, once persisted.
    pub server_id: Option<ServerId>,
    /// Local token for messages this client originated.
    pub correlation_token: Option<CorrelationToken>,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: Username,
    /// Recipient.
    pub receiver_id: Username,
    /// Text.
    pub content: String,
    /// Send time, if known.
    pub sent_at: Option<DateTime<Utc>>,
    /// Delivery progress.
    pub delivery_status: DeliveryStatus,
}

impl Message {
    /// Build a ledger message from an inbound payload.
    pub fn from_payload(payload: MessagePayload) -> Self {
        Self {
            server_id: payload.server_id,
            correlation_token: payload.correlation_token,
            conversation_id: payload.conversation_id,
            sender_id: payload.sender_id,
            receiver_id: payload.receiver_id,
            content: payload.content,
            sent_at: payload.sent_at,
            delivery_status: payload.status.unwrap_or(DeliveryStatus::Sent),
        }
    }

    /// Wire form of this message.
    pub fn to_payload(&self) -> MessagePayload {
        MessagePayload {
            server_id: self.server_id.clone(),
            correlation_token: self.correlation_token.clone(),
            conversation_id: self.conversation_id.clone(),
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            content: self.content.clone(),
            sent_at: self.sent_at,
            status: Some(self.delivery_status),
        }
    }

    /// Identity key of this message. See [`crate::identity::identity_of`].
    pub fn identity(&self) -> Result<IdentityKey, LedgerError> {
        crate::identity::identity_of(self)
    }

    /// Copy of this message advanced to `status`.
    ///
    /// Used to build optimistic updates that are then merged back through the
    /// ledger, never to mutate a stored message directly.
    #[must_use]
    pub fn with_status(&self, status: DeliveryStatus) -> Self {
        Self { delivery_status: status, ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(status: Option<DeliveryStatus>) -> MessagePayload {
        MessagePayload {
            server_id: Some(ServerId::new("1")),
            correlation_token: None,
            conversation_id: "c1".into(),
            sender_id: "ana".into(),
            receiver_id: "bia".into(),
            content: "oi".into(),
            sent_at: None,
            status,
        }
    }

    #[test]
    fn inbound_without_status_is_sent() {
        let message = Message::from_payload(payload(None));
        assert_eq!(message.delivery_status, DeliveryStatus::Sent);
    }

    #[test]
    fn inbound_status_is_kept() {
        let message = Message::from_payload(payload(Some(DeliveryStatus::Read)));
        assert_eq!(message.delivery_status, DeliveryStatus::Read);
    }

    #[test]
    fn payload_always_carries_status() {
        let message = Message::from_payload(payload(None));
        assert_eq!(message.to_payload().status, Some(DeliveryStatus::Sent));
    }
}
