//! Payload encoding and decoding.
//!
//! Inbound bytes are decoded according to the topic they arrived on, never by
//! sniffing their contents.

use serde::de::DeserializeOwned;

use crate::{
    MessagePayload, ReadReceiptPayload, TypingPayload,
    errors::{ProtocolError, Result},
};

/// Largest payload accepted from the broker (256 KiB).
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024;

/// Inbound topic families a subscription can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    /// Personal message queue.
    Message,
    /// Personal message-status queue.
    MessageStatus,
    /// Per-conversation typing topic.
    Typing,
}

impl InboundKind {
    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::MessageStatus => "message-status",
            Self::Typing => "typing",
        }
    }
}

/// A decoded inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// New or echoed message.
    Message(MessagePayload),
    /// Status update for a message.
    MessageStatus(MessagePayload),
    /// Typing signal.
    Typing(TypingPayload),
}

impl Inbound {
    /// Decode `bytes` as the payload type carried by `kind`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if `bytes` exceeds
    ///   [`MAX_PAYLOAD_SIZE`]
    /// - `ProtocolError::Decode` if the JSON does not match the expected shape
    pub fn decode(kind: InboundKind, bytes: &[u8]) -> Result<Self> {
        match kind {
            InboundKind::Message => decode_json(kind.name(), bytes).map(Self::Message),
            InboundKind::MessageStatus => decode_json(kind.name(), bytes).map(Self::MessageStatus),
            InboundKind::Typing => decode_json(kind.name(), bytes).map(Self::Typing),
        }
    }

    /// Topic family this payload arrived on.
    pub fn kind(&self) -> InboundKind {
        match self {
            Self::Message(_) => InboundKind::Message,
            Self::MessageStatus(_) => InboundKind::MessageStatus,
            Self::Typing(_) => InboundKind::Typing,
        }
    }
}

/// An outbound payload ready to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Message send.
    Message(MessagePayload),
    /// Typing transition.
    Typing(TypingPayload),
    /// Read receipt.
    ReadReceipt(ReadReceiptPayload),
}

impl Outbound {
    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn encode(&self) -> Result<Vec<u8>> {
        let encoded = match self {
            Self::Message(payload) => serde_json::to_vec(payload),
            Self::Typing(payload) => serde_json::to_vec(payload),
            Self::ReadReceipt(payload) => serde_json::to_vec(payload),
        };
        encoded.map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Decode a message-history response (a JSON array of messages).
///
/// History is fetched over HTTP rather than the broker, so no size limit is
/// applied.
///
/// # Errors
///
/// - `ProtocolError::Decode` if the body is not an array of messages
pub fn decode_history(bytes: &[u8]) -> Result<Vec<MessagePayload>> {
    serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::Decode { kind: "history", reason: e.to_string() })
}

fn decode_json<T: DeserializeOwned>(kind: &'static str, bytes: &[u8]) -> Result<T> {
    if bytes.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge { size: bytes.len(), max: MAX_PAYLOAD_SIZE });
    }

    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode { kind, reason: e.to_string() })
}
