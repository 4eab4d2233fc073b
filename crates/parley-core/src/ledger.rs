//! Message ledger for the active conversation.
//!
//! The ledger is the ordered list of messages shown for one conversation. It
//! is replaced wholesale when the conversation changes and otherwise only
//! grows or merges in place.
//!
//! # Invariants
//!
//! - No two entries share an identity key (server id or, for unconfirmed
//!   messages, correlation token).
//! - An entry keeps its position when it is merged. Status updates never
//!   reorder the display.
//! - Every entry belongs to the ledger's conversation.
//! - A status update never creates an entry. Statuses for messages not yet
//!   seen wait until the message arrives.

use std::collections::HashMap;

use parley_proto::{ConversationId, CorrelationToken, DeliveryStatus, ServerId};

use crate::{
    LedgerError, Message,
    identity::{self, IdentityKey},
};

/// Status updates held for messages that have not arrived yet.
const MAX_HELD_STATUSES: usize = 1024;

/// Outcome of [`Ledger::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// Message was new and appended.
    Inserted {
        /// Position of the new entry.
        position: usize,
    },
    /// Message merged into an existing entry, which changed.
    Updated {
        /// Position of the merged entry.
        position: usize,
    },
    /// Message merged into an existing entry without changing it.
    Unchanged {
        /// Position of the matching entry.
        position: usize,
    },
}

impl Upsert {
    /// Position of the affected entry.
    pub fn position(self) -> usize {
        match self {
            Self::Inserted { position }
            | Self::Updated { position }
            | Self::Unchanged { position } => position,
        }
    }

    /// Returns true if the ledger contents changed.
    pub fn changed(self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }
}

/// Ordered, deduplicated messages of a single conversation.
#[derive(Debug, Clone)]
pub struct Ledger {
    conversation_id: ConversationId,
    entries: Vec<Message>,
    by_server_id: HashMap<ServerId, usize>,
    by_token: HashMap<CorrelationToken, usize>,
    /// Statuses that arrived before their message, folded in on insert.
    held_statuses: HashMap<ServerId, DeliveryStatus>,
    /// Bumped on every change; lets observers skip redundant renders.
    revision: u64,
}

impl Ledger {
    /// Create an empty ledger for `conversation_id`.
    pub fn new(conversation_id: impl Into<ConversationId>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            entries: Vec::new(),
            by_server_id: HashMap::new(),
            by_token: HashMap::new(),
            held_statuses: HashMap::new(),
            revision: 0,
        }
    }

    /// Conversation this ledger holds.
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Insert `message`, or merge it into the entry it duplicates.
    ///
    /// A new message is appended. A duplicate is merged in place and keeps
    /// the earliest position. If the message links two existing entries (an
    /// echo carrying both the server id of one and the token of another),
    /// they are coalesced into the earlier one.
    ///
    /// # Errors
    ///
    /// - `LedgerError::UnresolvableIdentity` if the message has no identity
    /// - `LedgerError::ForeignConversation` if it belongs to another
    ///   conversation
    pub fn upsert(&mut self, message: Message) -> Result<Upsert, LedgerError> {
        self.admit(&message)?;
        let message = self.fold_held_status(message);

        let positions = self.matching_positions(&message);
        let Some((&primary, absorbed)) = positions.split_first() else {
            let position = self.entries.len();
            self.index(position, &message);
            self.entries.push(message);
            self.revision += 1;
            return Ok(Upsert::Inserted { position });
        };

        let mut merged = self.entries[primary].clone();
        for &position in absorbed {
            merged = identity::merge(&merged, &self.entries[position]);
        }
        merged = identity::merge(&merged, &message);

        if absorbed.is_empty() && merged == self.entries[primary] {
            return Ok(Upsert::Unchanged { position: primary });
        }

        if absorbed.is_empty() {
            self.index(primary, &merged);
            self.entries[primary] = merged;
        } else {
            tracing::debug!(
                conversation = %self.conversation_id,
                position = primary,
                absorbed = absorbed.len(),
                "coalescing duplicate entries"
            );
            for &position in absorbed.iter().rev() {
                self.entries.remove(position);
            }
            self.entries[primary] = merged;
            self.reindex();
        }

        self.revision += 1;
        Ok(Upsert::Updated { position: primary })
    }

    /// Apply a delivery-status update.
    ///
    /// An update for a message already in the ledger is merged like any other
    /// copy. An update for a message not seen yet is never shown on its own:
    /// its status is held by server id and folded into the message when it
    /// arrives. Returns `None` when the update was held or dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::upsert`].
    pub fn apply_status(&mut self, update: Message) -> Result<Option<Upsert>, LedgerError> {
        self.admit(&update)?;

        if !self.matching_positions(&update).is_empty() {
            return self.upsert(update).map(Some);
        }

        let Some(server_id) = update.server_id else {
            tracing::debug!(
                conversation = %self.conversation_id,
                "dropping status update for unknown unconfirmed message"
            );
            return Ok(None);
        };

        if let Some(held) = self.held_statuses.get_mut(&server_id) {
            *held = held.advance(update.delivery_status);
        } else if self.held_statuses.len() < MAX_HELD_STATUSES {
            self.held_statuses.insert(server_id, update.delivery_status);
        } else {
            tracing::warn!(
                conversation = %self.conversation_id,
                %server_id,
                "held status limit reached, dropping update"
            );
        }
        Ok(None)
    }

    /// Status held for a message that has not arrived yet.
    pub fn held_status(&self, server_id: &ServerId) -> Option<DeliveryStatus> {
        self.held_statuses.get(server_id).copied()
    }

    /// Replace all entries with `messages`, in the given order.
    ///
    /// Used when a conversation is (re)loaded. Entries that violate the
    /// identity invariant or belong to another conversation are skipped and
    /// logged; duplicates within `messages` are merged.
    ///
    /// Returns the number of skipped entries.
    pub fn replace_all(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        self.entries.clear();
        self.by_server_id.clear();
        self.by_token.clear();
        self.revision += 1;

        let mut rejected = 0;
        for message in messages {
            if let Err(error) = self.upsert(message) {
                tracing::warn!(conversation = %self.conversation_id, %error, "skipping history entry");
                rejected += 1;
            }
        }
        rejected
    }

    /// Re-add an unconfirmed local message after a reload.
    ///
    /// If the reloaded history already holds the persisted copy (same author
    /// and text, no token), the local copy is folded into it instead of being
    /// appended twice.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::upsert`].
    pub fn restore_unconfirmed(&mut self, pending: Message) -> Result<Upsert, LedgerError> {
        if pending.conversation_id != self.conversation_id {
            return Err(LedgerError::ForeignConversation {
                expected: self.conversation_id.clone(),
                found: pending.conversation_id,
            });
        }

        let persisted =
            self.entries.iter().position(|entry| identity::is_tokenless_echo(&pending, entry));
        let Some(position) = persisted else {
            return self.upsert(pending);
        };

        let merged = identity::merge(&pending, &self.entries[position]);
        self.index(position, &merged);
        self.entries[position] = merged;
        self.revision += 1;
        Ok(Upsert::Updated { position })
    }

    /// Read-only, ordered view of the ledger.
    pub fn snapshot(&self) -> &[Message] {
        &self.entries
    }

    /// Entry with the given identity key.
    pub fn get(&self, key: &IdentityKey) -> Option<&Message> {
        self.position_of(key).map(|position| &self.entries[position])
    }

    /// Position of the entry with the given identity key.
    pub fn position_of(&self, key: &IdentityKey) -> Option<usize> {
        match key {
            IdentityKey::Server(server_id) => self.by_server_id.get(server_id).copied(),
            IdentityKey::Local(token) => self
                .by_token
                .get(token)
                .copied()
                .filter(|&position| self.entries[position].server_id.is_none()),
        }
    }

    /// Entry carrying the given correlation token, confirmed or not.
    pub fn by_token(&self, token: &CorrelationToken) -> Option<&Message> {
        self.by_token.get(token).map(|&position| &self.entries[position])
    }

    /// Entries the server has not confirmed yet.
    pub fn unconfirmed(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter(|message| message.server_id.is_none())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the ledger has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Change counter. Increases whenever the contents change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn admit(&self, message: &Message) -> Result<(), LedgerError> {
        identity::identity_of(message)?;

        if message.conversation_id != self.conversation_id {
            return Err(LedgerError::ForeignConversation {
                expected: self.conversation_id.clone(),
                found: message.conversation_id.clone(),
            });
        }
        Ok(())
    }

    fn fold_held_status(&mut self, mut message: Message) -> Message {
        let held = message.server_id.as_ref().and_then(|id| self.held_statuses.remove(id));
        if let Some(status) = held {
            message.delivery_status = message.delivery_status.advance(status);
        }
        message
    }

    /// Positions of entries that `incoming` duplicates, ascending.
    fn matching_positions(&self, incoming: &Message) -> Vec<usize> {
        let mut positions: Vec<usize> = [
            incoming.server_id.as_ref().and_then(|id| self.by_server_id.get(id)),
            incoming.correlation_token.as_ref().and_then(|token| self.by_token.get(token)),
        ]
        .into_iter()
        .flatten()
        .copied()
        .filter(|&position| identity::same_message(&self.entries[position], incoming))
        .collect();

        positions.sort_unstable();
        positions.dedup();

        if positions.is_empty() {
            if let Some(position) = self
                .entries
                .iter()
                .position(|existing| identity::is_tokenless_echo(existing, incoming))
            {
                positions.push(position);
            }
        }

        positions
    }

    fn index(&mut self, position: usize, message: &Message) {
        if let Some(server_id) = &message.server_id {
            self.by_server_id.insert(server_id.clone(), position);
        }
        if let Some(token) = &message.correlation_token {
            self.by_token.insert(token.clone(), position);
        }
    }

    fn reindex(&mut self) {
        self.by_server_id.clear();
        self.by_token.clear();
        for position in 0..self.entries.len() {
            let message = self.entries[position].clone();
            self.index(position, &message);
        }
    }
}
