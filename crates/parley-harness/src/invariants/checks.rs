//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use parley_core::{BindingState, IdentityKey};

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// No two ledger entries share an identity key.
///
/// Confirmed entries are keyed by server id; unconfirmed entries by
/// correlation token. A token may appear on at most one entry either way.
pub struct IdentityUniqueness;

impl Invariant for IdentityUniqueness {
    fn name(&self) -> &'static str {
        "IdentityUniqueness"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let mut server_ids = HashSet::new();
            let mut tokens = HashSet::new();

            for (position, entry) in session.ledger.iter().enumerate() {
                if entry.server_id.is_none() && entry.correlation_token.is_none() {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("session {}: entry {position} has no identity", session.id),
                    });
                }
                let duplicate_server = entry.server_id.as_ref().is_some_and(|id| !server_ids.insert(id));
                let duplicate_token =
                    entry.correlation_token.as_ref().is_some_and(|token| !tokens.insert(token));
                if duplicate_server || duplicate_token {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "session {}: entry {position} ({:?}/{:?}) duplicates an earlier entry",
                            session.id, entry.server_id, entry.correlation_token
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Delivery status never moves backwards while a ledger is live.
///
/// `Read` never returns to `Sent` or `Sending`; `Sent` never returns to
/// `Sending`.
pub struct StatusMonotonicity;

impl Invariant for StatusMonotonicity {
    fn name(&self) -> &'static str {
        "StatusMonotonicity"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            for (key, history) in &session.status_history {
                for window in history.windows(2) {
                    if window[1] < window[0] {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "session {} entry {}: status regressed {:?} → {:?}",
                                session.id,
                                describe(key),
                                window[0],
                                window[1]
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Entries never move later in the display while a ledger is live.
///
/// Updates merge in place; only coalescing a duplicate may shift later
/// entries, and only towards the front.
pub struct PositionStability;

impl Invariant for PositionStability {
    fn name(&self) -> &'static str {
        "PositionStability"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            for (key, history) in &session.position_history {
                for window in history.windows(2) {
                    if window[1] > window[0] {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "session {} entry {}: moved from {} to {}",
                                session.id,
                                describe(key),
                                window[0],
                                window[1]
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Typing state belongs to the bound conversation only.
///
/// The typing tracker is scoped to exactly the conversation the lifecycle is
/// bound to, and holds no timers or leases while unbound.
pub struct TypingScopedToConversation;

impl Invariant for TypingScopedToConversation {
    fn name(&self) -> &'static str {
        "TypingScopedToConversation"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            if session.typing_conversation != session.conversation_id {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "session {}: typing scoped to {:?}, bound to {:?}",
                        session.id, session.typing_conversation, session.conversation_id
                    ),
                });
            }

            let unbound = session.binding_state == Some(BindingState::Unbound);
            if unbound && (session.typing_timers > 0 || !session.typing_users.is_empty()) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "session {}: {} timers and {:?} typing while unbound",
                        session.id, session.typing_timers, session.typing_users
                    ),
                });
            }
        }
        Ok(())
    }
}

fn describe(key: &IdentityKey) -> String {
    match key {
        IdentityKey::Server(server_id) => format!("server:{server_id}"),
        IdentityKey::Local(token) => format!("local:{token}"),
    }
}
