//! Read receipts for inbound messages.

use parley_proto::{DeliveryStatus, Outbound, ReadReceiptPayload};

use crate::{Ledger, OutboundFrame, PublishPurpose, SyncError};

/// Emits one receipt per inbound message the local user has not yet read.
///
/// A message is marked `Read` in the ledger as soon as its receipt frame is
/// produced, so dispatching twice over the same ledger yields nothing the
/// second time. Messages authored locally, messages without a known author
/// and messages without a server id never get a receipt.
#[derive(Debug, Clone)]
pub struct ReadReceiptDispatcher {
    destination: String,
}

impl ReadReceiptDispatcher {
    /// Create a dispatcher publishing to `destination`.
    pub fn new(destination: impl Into<String>) -> Self {
        Self { destination: destination.into() }
    }

    /// Produce receipts for every unread inbound message in `ledger`.
    ///
    /// # Errors
    ///
    /// - `SyncError::Protocol` if a receipt cannot be encoded. The ledger is
    ///   left unchanged.
    pub fn dispatch(
        &self,
        ledger: &mut Ledger,
        local_user: &str,
    ) -> Result<Vec<OutboundFrame>, SyncError> {
        let unread: Vec<_> = ledger
            .snapshot()
            .iter()
            .filter(|message| {
                !message.sender_id.is_empty()
                    && message.sender_id != local_user
                    && message.delivery_status != DeliveryStatus::Read
            })
            .filter_map(|message| {
                message.server_id.clone().map(|server_id| (server_id, message.clone()))
            })
            .collect();

        // Encoded before any upsert; an encode failure leaves the ledger untouched.
        let mut encoded = Vec::with_capacity(unread.len());
        for (server_id, message) in unread {
            let payload = Outbound::ReadReceipt(ReadReceiptPayload {
                message_server_id: server_id.clone(),
                sender_id: message.sender_id.clone(),
            })
            .encode()?;
            encoded.push((server_id, message, payload));
        }

        let mut frames = Vec::with_capacity(encoded.len());
        for (server_id, message, payload) in encoded {
            // Left unread on failure, so the next dispatch retries it.
            if let Err(error) = ledger.upsert(message.with_status(DeliveryStatus::Read)) {
                tracing::warn!(%server_id, %error, "cannot mark message read");
                continue;
            }
            frames.push(OutboundFrame {
                destination: self.destination.clone(),
                payload,
                purpose: PublishPurpose::ReadReceipt { server_id },
            });
        }

        if !frames.is_empty() {
            tracing::debug!(
                conversation = %ledger.conversation_id(),
                count = frames.len(),
                "dispatching read receipts"
            );
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use parley_proto::{CorrelationToken, ServerId};

    use super::*;
    use crate::Message;

    fn message(server_id: Option<&str>, sender: &str, status: DeliveryStatus) -> Message {
        Message {
            server_id: server_id.map(ServerId::from),
            correlation_token: server_id.is_none().then(|| CorrelationToken::new("t1")),
            conversation_id: "c1".into(),
            sender_id: sender.into(),
            receiver_id: "ana".into(),
            content: "oi".into(),
            sent_at: None,
            delivery_status: status,
        }
    }

    fn dispatcher() -> ReadReceiptDispatcher {
        ReadReceiptDispatcher::new("/app/read.receipt")
    }

    #[test]
    fn receipts_only_for_unread_inbound_messages() {
        let mut ledger = Ledger::new("c1");
        ledger.upsert(message(Some("1"), "bia", DeliveryStatus::Sent)).unwrap();
        ledger.upsert(message(Some("2"), "ana", DeliveryStatus::Sent)).unwrap();
        ledger.upsert(message(Some("3"), "bia", DeliveryStatus::Read)).unwrap();
        ledger.upsert(message(None, "bia", DeliveryStatus::Sending)).unwrap();

        let frames = dispatcher().dispatch(&mut ledger, "ana").unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].purpose, PublishPurpose::ReadReceipt { server_id: ServerId::new("1") });
        let receipt: ReadReceiptPayload = serde_json::from_slice(&frames[0].payload).unwrap();
        assert_eq!(receipt.sender_id, "bia");
        assert_eq!(ledger.snapshot()[0].delivery_status, DeliveryStatus::Read);
    }

    #[test]
    fn dispatch_is_idempotent() {
        let mut ledger = Ledger::new("c1");
        ledger.upsert(message(Some("1"), "bia", DeliveryStatus::Sent)).unwrap();
        ledger.upsert(message(Some("2"), "bia", DeliveryStatus::Sent)).unwrap();

        assert_eq!(dispatcher().dispatch(&mut ledger, "ana").unwrap().len(), 2);
        let revision = ledger.revision();
        assert!(dispatcher().dispatch(&mut ledger, "ana").unwrap().is_empty());
        assert_eq!(ledger.revision(), revision);
    }

    #[test]
    fn entries_without_author_get_no_receipt() {
        let mut ledger = Ledger::new("c1");
        ledger.upsert(message(Some("1"), "", DeliveryStatus::Sent)).unwrap();

        assert!(dispatcher().dispatch(&mut ledger, "ana").unwrap().is_empty());
        assert_eq!(ledger.snapshot()[0].delivery_status, DeliveryStatus::Sent);
    }

    #[test]
    fn every_marked_message_has_its_frame() {
        let mut ledger = Ledger::new("c1");
        for id in ["1", "2", "3"] {
            ledger.upsert(message(Some(id), "bia", DeliveryStatus::Sent)).unwrap();
        }

        let frames = dispatcher().dispatch(&mut ledger, "ana").unwrap();

        let read: Vec<_> = ledger
            .snapshot()
            .iter()
            .filter(|m| m.delivery_status == DeliveryStatus::Read)
            .filter_map(|m| m.server_id.clone())
            .collect();
        let receipted: Vec<_> = frames
            .iter()
            .filter_map(|frame| match &frame.purpose {
                PublishPurpose::ReadReceipt { server_id } => Some(server_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(read, receipted);
    }
}
