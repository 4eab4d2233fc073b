//! Error types for the synchronization core.
//!
//! Errors follow the failure taxonomy of the engine:
//!
//! - Precondition errors: an action was attempted without an active
//!   conversation or identity. Surfaced to the caller immediately.
//! - Integrity errors: a message violates the identity invariant. Rejected at
//!   the ledger boundary.
//! - Transport errors: reported back to the engine as events, never raised by
//!   it.
//! - Malformed inbound payloads: logged and dropped, never raised.

use parley_proto::{ConversationId, CorrelationToken, ProtocolError, Username};
use thiserror::Error;

/// Errors raised by the [`crate::Ledger`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Message has neither a server id nor a correlation token.
    #[error("message from {sender_id} in {conversation_id} has no server id or correlation token")]
    UnresolvableIdentity {
        /// Conversation the message claims to belong to
        conversation_id: ConversationId,
        /// Author of the message
        sender_id: Username,
    },

    /// Message belongs to a different conversation than the ledger.
    #[error("message for conversation {found} offered to ledger of {expected}")]
    ForeignConversation {
        /// Conversation the ledger holds
        expected: ConversationId,
        /// Conversation the message belongs to
        found: ConversationId,
    },
}

/// Errors raised by [`crate::SyncEngine`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Operation needs a selected conversation.
    #[error("no active conversation")]
    NoActiveConversation,

    /// Conversation is selected but its metadata has not loaded yet.
    #[error("conversation {conversation_id} is still loading")]
    ConversationNotReady {
        /// Conversation being loaded
        conversation_id: ConversationId,
    },

    /// Operation needs an authenticated identity.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Message text is empty or whitespace.
    #[error("message is empty")]
    EmptyMessage,

    /// Message text exceeds the configured limit.
    #[error("message too long: {len} characters (max {max})")]
    MessageTooLong {
        /// Length of the rejected text
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Retry requested for a message that is not awaiting retry.
    #[error("no failed send with correlation token {token}")]
    UnknownCorrelationToken {
        /// Token the caller supplied
        token: CorrelationToken,
    },

    /// Subscribing to a topic failed.
    #[error("subscription to {topic} failed: {reason}")]
    SubscribeFailed {
        /// Topic that could not be subscribed
        topic: String,
        /// Transport diagnostic
        reason: String,
    },

    /// Loading conversation history failed.
    #[error("loading conversation {conversation_id} failed: {reason}")]
    LoadFailed {
        /// Conversation that failed to load
        conversation_id: ConversationId,
        /// Collaborator diagnostic
        reason: String,
    },

    /// Configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Ledger rejected a message.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Payload could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SyncError {
    /// Returns true if the caller attempted an action the current session
    /// state does not allow.
    ///
    /// Precondition errors are resolved by selecting a conversation, waiting
    /// for it to load, or authenticating, then retrying.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoActiveConversation
                | Self::ConversationNotReady { .. }
                | Self::NotAuthenticated
                | Self::EmptyMessage
                | Self::MessageTooLong { .. }
                | Self::UnknownCorrelationToken { .. }
        )
    }
}
