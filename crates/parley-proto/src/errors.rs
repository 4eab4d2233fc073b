//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload bytes did not match the expected shape.
    #[error("malformed {kind} payload: {reason}")]
    Decode {
        /// Payload kind that was expected
        kind: &'static str,
        /// Parser diagnostic
        reason: String,
    },

    /// Payload exceeds [`crate::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Received size
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),
}
