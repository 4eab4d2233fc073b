//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of an engine at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::collections::HashMap;

use parley_core::{
    BindingGeneration, BindingState, ConversationId, CorrelationToken, DeliveryStatus, Environment,
    IdentityKey, ServerId, SyncEngine, Username,
};

/// Snapshot of every simulated session.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-session snapshots.
    pub sessions: Vec<EngineSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no sessions).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single session.
    pub fn single(session: EngineSnapshot) -> Self {
        Self { sessions: vec![session] }
    }
}

/// One ledger entry as observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Server id, once confirmed.
    pub server_id: Option<ServerId>,
    /// Correlation token, for locally sent messages.
    pub correlation_token: Option<CorrelationToken>,
    /// Delivery status.
    pub status: DeliveryStatus,
}

impl EntrySnapshot {
    /// Key that survives server confirmation: the token if the message has
    /// one, otherwise the server id.
    pub fn tracking_key(&self) -> Option<IdentityKey> {
        self.correlation_token
            .clone()
            .map(IdentityKey::Local)
            .or_else(|| self.server_id.clone().map(IdentityKey::Server))
    }
}

/// Snapshot of a single engine's observable state.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    /// Session identifier.
    pub id: u64,
    /// Conversation the lifecycle is bound to.
    pub conversation_id: Option<ConversationId>,
    /// Binding state.
    pub binding_state: Option<BindingState>,
    /// Ledger generation and load flag; histories reset when it changes.
    pub ledger_epoch: Option<(BindingGeneration, bool)>,
    /// Ledger contents in display order.
    pub ledger: Vec<EntrySnapshot>,
    /// Conversation the typing tracker is scoped to.
    pub typing_conversation: Option<ConversationId>,
    /// Remote users with a live typing lease.
    pub typing_users: Vec<Username>,
    /// Armed typing timers.
    pub typing_timers: usize,
    /// Status observations per entry since the ledger epoch began.
    pub status_history: HashMap<IdentityKey, Vec<DeliveryStatus>>,
    /// Position observations per entry since the ledger epoch began.
    pub position_history: HashMap<IdentityKey, Vec<usize>>,
}

impl EngineSnapshot {
    /// Capture the current state of `engine`.
    ///
    /// Histories start empty; use [`EngineSnapshot::following`] to carry
    /// them across snapshots.
    pub fn capture<E: Environment>(id: u64, engine: &SyncEngine<E>) -> Self {
        let lifecycle = engine.lifecycle();
        let ledger = engine
            .ledger()
            .map(|ledger| {
                ledger
                    .snapshot()
                    .iter()
                    .map(|message| EntrySnapshot {
                        server_id: message.server_id.clone(),
                        correlation_token: message.correlation_token.clone(),
                        status: message.delivery_status,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut snapshot = Self {
            id,
            conversation_id: engine.active_conversation().map(str::to_owned),
            binding_state: Some(engine.binding_state()),
            ledger_epoch: lifecycle.generation().map(|generation| (generation, lifecycle.is_loaded())),
            ledger,
            typing_conversation: engine.typing().conversation_id().map(str::to_owned),
            typing_users: engine.typing_users().map(str::to_owned).collect(),
            typing_timers: engine.typing().armed_timers(),
            status_history: HashMap::new(),
            position_history: HashMap::new(),
        };
        snapshot.record();
        snapshot
    }

    /// Capture `engine`, extending the histories of `previous` unless the
    /// ledger epoch changed.
    pub fn following<E: Environment>(previous: &Self, engine: &SyncEngine<E>) -> Self {
        let mut snapshot = Self::capture(previous.id, engine);
        if snapshot.ledger_epoch != previous.ledger_epoch
            || snapshot.conversation_id != previous.conversation_id
        {
            return snapshot;
        }

        let mut status_history = previous.status_history.clone();
        let mut position_history = previous.position_history.clone();
        for (key, statuses) in snapshot.status_history.drain() {
            status_history.entry(key).or_default().extend(statuses);
        }
        for (key, positions) in snapshot.position_history.drain() {
            position_history.entry(key).or_default().extend(positions);
        }
        snapshot.status_history = status_history;
        snapshot.position_history = position_history;
        snapshot
    }

    fn record(&mut self) {
        for (position, entry) in self.ledger.iter().enumerate() {
            let Some(key) = entry.tracking_key() else { continue };
            self.status_history.entry(key.clone()).or_default().push(entry.status);
            self.position_history.entry(key).or_default().push(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot() {
        let snapshot = SystemSnapshot::empty();
        assert!(snapshot.sessions.is_empty());
    }

    #[test]
    fn tracking_key_prefers_token() {
        let entry = EntrySnapshot {
            server_id: Some(ServerId::new("42")),
            correlation_token: Some(CorrelationToken::new("t1")),
            status: DeliveryStatus::Sent,
        };
        assert_eq!(entry.tracking_key(), Some(IdentityKey::Local(CorrelationToken::new("t1"))));
    }
}
