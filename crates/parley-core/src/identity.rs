//! Message identity and merge.
//!
//! A message can reach the client twice: once as the optimistic local copy
//! created at send time, and again as the server's echo. Redeliveries after a
//! reconnect and status updates add more copies. This module decides when two
//! copies describe the same message and how to fold them into one.
//!
//! # Invariants
//!
//! - The identity key is the server id when present, otherwise the
//!   correlation token.
//! - Merging never moves delivery status backwards.
//! - For copies that agree on the text fields they both set, `merge(a, b) ==
//!   merge(b, a)`, whatever their statuses and send times. Arrival order
//!   across topics is unspecified, so the result must not depend on it.

use parley_proto::{CorrelationToken, ServerId};

use crate::{LedgerError, Message};

/// Key used to deduplicate messages across local and remote origins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    /// Server-assigned identifier.
    Server(ServerId),
    /// Client correlation token, for messages the server has not confirmed.
    Local(CorrelationToken),
}

/// Identity key of `message`.
///
/// # Errors
///
/// - `LedgerError::UnresolvableIdentity` if the message has neither a server
///   id nor a correlation token
pub fn identity_of(message: &Message) -> Result<IdentityKey, LedgerError> {
    if let Some(server_id) = &message.server_id {
        return Ok(IdentityKey::Server(server_id.clone()));
    }

    if let Some(token) = &message.correlation_token {
        return Ok(IdentityKey::Local(token.clone()));
    }

    Err(LedgerError::UnresolvableIdentity {
        conversation_id: message.conversation_id.clone(),
        sender_id: message.sender_id.clone(),
    })
}

/// Returns true if `existing` and `incoming` are copies of the same message.
///
/// Two copies match when their identity keys are equal, or when a
/// server-confirmed copy carries the correlation token of an optimistic one.
/// Two different server ids never match, even if they share a token.
pub fn same_message(existing: &Message, incoming: &Message) -> bool {
    match (&existing.server_id, &incoming.server_id) {
        (Some(a), Some(b)) => a == b,
        _ => match (&existing.correlation_token, &incoming.correlation_token) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

/// Returns true if `incoming` looks like the tokenless server echo of the
/// optimistic `existing` message.
///
/// Servers that drop the correlation token still echo the author and text, so
/// an unconfirmed local message with the same author and content is taken to
/// be the one the server just persisted.
pub fn is_tokenless_echo(existing: &Message, incoming: &Message) -> bool {
    existing.server_id.is_none()
        && existing.correlation_token.is_some()
        && incoming.server_id.is_some()
        && incoming.correlation_token.is_none()
        && existing.sender_id == incoming.sender_id
        && existing.content == incoming.content
}

/// Fold `incoming` into `existing`.
///
/// Every field `incoming` sets wins; fields it leaves unset (absent options,
/// empty strings) keep the existing value. Delivery status is the furthest of
/// the two and the send time the latest, so neither depends on which copy
/// came first. The server stamps a message after the optimistic local stamp,
/// so the persisted time replaces it.
#[must_use]
pub fn merge(existing: &Message, incoming: &Message) -> Message {
    Message {
        server_id: incoming.server_id.clone().or_else(|| existing.server_id.clone()),
        correlation_token: incoming
            .correlation_token
            .clone()
            .or_else(|| existing.correlation_token.clone()),
        conversation_id: prefer(&incoming.conversation_id, &existing.conversation_id),
        sender_id: prefer(&incoming.sender_id, &existing.sender_id),
        receiver_id: prefer(&incoming.receiver_id, &existing.receiver_id),
        content: prefer(&incoming.content, &existing.content),
        sent_at: existing.sent_at.max(incoming.sent_at),
        delivery_status: existing.delivery_status.advance(incoming.delivery_status),
    }
}

fn prefer(incoming: &str, existing: &str) -> String {
    if incoming.is_empty() { existing.to_owned() } else { incoming.to_owned() }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use parley_proto::DeliveryStatus;

    use super::*;

    fn message(server_id: Option<&str>, token: Option<&str>, status: DeliveryStatus) -> Message {
        Message {
            server_id: server_id.map(ServerId::from),
            correlation_token: token.map(CorrelationToken::from),
            conversation_id: "c1".into(),
            sender_id: "ana".into(),
            receiver_id: "bia".into(),
            content: "oi".into(),
            sent_at: None,
            delivery_status: status,
        }
    }

    #[test]
    fn server_id_takes_precedence() {
        let m = message(Some("42"), Some("t1"), DeliveryStatus::Sent);
        assert_eq!(identity_of(&m), Ok(IdentityKey::Server(ServerId::new("42"))));
    }

    #[test]
    fn token_used_until_confirmed() {
        let m = message(None, Some("t1"), DeliveryStatus::Sending);
        assert_eq!(identity_of(&m), Ok(IdentityKey::Local(CorrelationToken::new("t1"))));
    }

    #[test]
    fn no_identity_is_an_error() {
        let m = message(None, None, DeliveryStatus::Sent);
        assert!(matches!(identity_of(&m), Err(LedgerError::UnresolvableIdentity { .. })));
    }

    #[test]
    fn echo_matches_optimistic_copy_by_token() {
        let local = message(None, Some("t1"), DeliveryStatus::Sending);
        let echo = message(Some("42"), Some("t1"), DeliveryStatus::Sent);
        assert!(same_message(&local, &echo));
        assert!(same_message(&echo, &local));
    }

    #[test]
    fn distinct_server_ids_never_match() {
        let a = message(Some("1"), Some("t1"), DeliveryStatus::Sent);
        let b = message(Some("2"), Some("t1"), DeliveryStatus::Sent);
        assert!(!same_message(&a, &b));
    }

    #[test]
    fn history_copy_matches_echo_by_server_id() {
        let history = message(Some("42"), None, DeliveryStatus::Sent);
        let echo = message(Some("42"), Some("t1"), DeliveryStatus::Sent);
        assert!(same_message(&history, &echo));
    }

    #[test]
    fn merge_takes_server_fields_and_keeps_token() {
        let local = message(None, Some("t1"), DeliveryStatus::Sending);
        let echo = message(Some("42"), None, DeliveryStatus::Sent);
        let merged = merge(&local, &echo);

        assert_eq!(merged.server_id, Some(ServerId::new("42")));
        assert_eq!(merged.correlation_token, Some(CorrelationToken::new("t1")));
        assert_eq!(merged.delivery_status, DeliveryStatus::Sent);
    }

    #[test]
    fn merge_never_regresses_status() {
        let read = message(Some("42"), None, DeliveryStatus::Read);
        let stale = message(Some("42"), None, DeliveryStatus::Sent);
        assert_eq!(merge(&read, &stale).delivery_status, DeliveryStatus::Read);

        let sent = message(Some("42"), None, DeliveryStatus::Sent);
        let sending = message(Some("42"), Some("t1"), DeliveryStatus::Sending);
        assert_eq!(merge(&sent, &sending).delivery_status, DeliveryStatus::Sent);
    }

    #[test]
    fn send_time_merge_is_order_independent() {
        let local_stamp = DateTime::from_timestamp_millis(1_000);
        let server_stamp = DateTime::from_timestamp_millis(1_250);
        let local = Message { sent_at: local_stamp, ..message(None, Some("t1"), DeliveryStatus::Sending) };
        let echo = Message { sent_at: server_stamp, ..message(Some("42"), Some("t1"), DeliveryStatus::Sent) };
        let bare = message(Some("42"), None, DeliveryStatus::Read);

        assert_eq!(merge(&local, &echo), merge(&echo, &local));
        assert_eq!(merge(&local, &echo).sent_at, server_stamp);
        assert_eq!(merge(&echo, &bare).sent_at, server_stamp);
        assert_eq!(merge(&bare, &echo).sent_at, server_stamp);
    }

    #[test]
    fn empty_fields_do_not_erase() {
        let full = message(Some("42"), None, DeliveryStatus::Sent);
        let status_only = Message {
            sender_id: String::new(),
            receiver_id: String::new(),
            content: String::new(),
            ..message(Some("42"), None, DeliveryStatus::Read)
        };

        let merged = merge(&full, &status_only);
        assert_eq!(merged.content, "oi");
        assert_eq!(merged.sender_id, "ana");
        assert_eq!(merged.delivery_status, DeliveryStatus::Read);
    }

    #[test]
    fn tokenless_echo_needs_same_author_and_text() {
        let local = message(None, Some("t1"), DeliveryStatus::Sending);
        let echo = message(Some("42"), None, DeliveryStatus::Sent);
        assert!(is_tokenless_echo(&local, &echo));

        let other_text = Message { content: "tchau".into(), ..echo.clone() };
        assert!(!is_tokenless_echo(&local, &other_text));

        let other_author = Message { sender_id: "bia".into(), ..echo };
        assert!(!is_tokenless_echo(&local, &other_author));
    }
}
