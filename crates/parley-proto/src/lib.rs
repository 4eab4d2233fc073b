//! Protocol
//!
//! Wire payloads exchanged with the chat broker, and the names of the
//! destinations and topics they travel on.
//!
//! Payloads are JSON objects whose field names match the remote service
//! (`chatRoomId`, `senderUsername`, `sendAt`, ...). The transport itself
//! (STOMP framing, reconnects) is owned by the caller; this crate only turns
//! bytes into typed payloads and back.
//!
//! # Components
//!
//! - [`MessagePayload`]: a chat message as it appears on the wire
//! - [`TypingPayload`]: ephemeral "user is typing" signal
//! - [`ReadReceiptPayload`]: acknowledgement that a message was read
//! - [`ChatRoom`]: conversation metadata returned by the initial load
//! - [`Inbound`] / [`Outbound`]: codec entry points
//! - [`Destinations`] / [`Topics`]: logical routing names

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod codec;
pub mod errors;
pub mod payloads;
mod topic;

pub use codec::{Inbound, InboundKind, MAX_PAYLOAD_SIZE, Outbound, decode_history};
pub use errors::{ProtocolError, Result};
pub use payloads::{
    ChatRoom, ChatRoomType, ConversationId, CorrelationToken, DeliveryStatus, MessagePayload,
    ReadReceiptPayload, ServerId, TypingPayload, Username,
};
pub use topic::{CONVERSATION_PLACEHOLDER, Destinations, Topics};
