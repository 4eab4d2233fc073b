//! JSON payloads carried over the broker.
//!
//! Every payload is a plain JSON object. Field names follow the remote
//! service's conventions, so Rust-side names are mapped with `serde(rename)`.
//!
//! # Invariants
//!
//! - Optional fields are omitted on encode rather than written as `null`.
//! - Unknown fields are ignored on decode, so the server can grow its schema
//!   without breaking older clients.

mod message;
mod presence;
mod room;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use message::{DeliveryStatus, MessagePayload};
pub use presence::{ReadReceiptPayload, TypingPayload};
pub use room::{ChatRoom, ChatRoomType};

/// Conversation (chat room) identifier assigned by the remote service.
pub type ConversationId = String;

/// Stable user handle. The remote service keys users by username.
pub type Username = String;

/// Identifier assigned by the remote service once a message is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Wrap a server-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Client-generated token that ties an optimistic message to its server echo.
///
/// Tokens are only meaningful to the client that minted them. The server
/// copies the token back verbatim when it echoes the message (if it supports
/// doing so).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Wrap an existing token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token rendered from 128 random bits as 32 lowercase hex digits.
    pub fn from_u128(bits: u128) -> Self {
        Self(format!("{bits:032x}"))
    }

    /// Token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_token_is_fixed_width_hex() {
        let token = CorrelationToken::from_u128(0xab);
        assert_eq!(token.as_str().len(), 32);
        assert!(token.as_str().ends_with("ab"));
        assert!(token.as_str().starts_with("0000"));
    }

    #[test]
    fn ids_serialize_as_bare_strings() {
        let json = serde_json::to_string(&ServerId::new("42")).unwrap();
        assert_eq!(json, "\"42\"");
    }
}
