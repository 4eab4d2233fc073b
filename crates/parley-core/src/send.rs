//! Optimistic send pipeline.
//!
//! A submitted message is inserted into the ledger as `Sending` before it is
//! published, so it shows immediately. The server echo (carrying the same
//! correlation token, or at least the same author and text) later merges into
//! that entry in place. A publish failure leaves the entry where it is and
//! marks its token as failed until the user retries or the echo shows up.

use std::collections::BTreeSet;

use parley_proto::{ChatRoom, CorrelationToken, DeliveryStatus, Outbound};

use crate::{
    Environment, Ledger, Message, OutboundFrame, PublishPurpose, SyncError,
    identity::IdentityKey,
};

/// Turns user text into optimistic ledger entries and outbound frames.
#[derive(Debug, Clone)]
pub struct SendPipeline {
    destination: String,
    max_content_len: usize,
    failed: BTreeSet<CorrelationToken>,
}

impl SendPipeline {
    /// Create a pipeline publishing to `destination`.
    pub fn new(destination: impl Into<String>, max_content_len: usize) -> Self {
        Self { destination: destination.into(), max_content_len, failed: BTreeSet::new() }
    }

    /// Check `text` against the content rules.
    ///
    /// # Errors
    ///
    /// - `SyncError::EmptyMessage` if `text` is blank
    /// - `SyncError::MessageTooLong` if it exceeds the configured length
    pub fn validate(&self, text: &str) -> Result<(), SyncError> {
        if text.trim().is_empty() {
            return Err(SyncError::EmptyMessage);
        }

        let len = text.chars().count();
        if len > self.max_content_len {
            return Err(SyncError::MessageTooLong { len, max: self.max_content_len });
        }

        Ok(())
    }

    /// Insert `text` into `ledger` as a `Sending` message from `sender` and
    /// return the frame that publishes it.
    ///
    /// The recipient is the first participant of `room` other than `sender`.
    ///
    /// # Errors
    ///
    /// - Content errors from [`SendPipeline::validate`]
    /// - `SyncError::Ledger` if the ledger rejects the message
    /// - `SyncError::Protocol` if the payload cannot be encoded
    pub fn submit<E: Environment>(
        &self,
        env: &E,
        ledger: &mut Ledger,
        room: &ChatRoom,
        sender: &str,
        text: &str,
    ) -> Result<OutboundFrame, SyncError> {
        self.validate(text)?;

        let token = CorrelationToken::from_u128(env.random_u128());
        let message = Message {
            server_id: None,
            correlation_token: Some(token.clone()),
            conversation_id: ledger.conversation_id().to_owned(),
            sender_id: sender.to_owned(),
            receiver_id: room.counterpart(sender),
            content: text.to_owned(),
            sent_at: Some(env.wall_clock()),
            delivery_status: DeliveryStatus::Sending,
        };

        let frame = self.frame(&message, token.clone())?;
        ledger.upsert(message)?;

        tracing::debug!(conversation = %ledger.conversation_id(), %token, "queued optimistic message");
        Ok(frame)
    }

    /// Record that publishing the message with `token` failed.
    ///
    /// Returns false if the message is no longer awaiting confirmation (the
    /// echo won the race, or the conversation changed).
    pub fn mark_failed(&mut self, ledger: &Ledger, token: &CorrelationToken) -> bool {
        let pending = ledger.position_of(&IdentityKey::Local(token.clone())).is_some();
        if pending {
            self.failed.insert(token.clone());
        }
        pending
    }

    /// Build a frame that republishes the failed message with `token`.
    ///
    /// The token is cleared from the failed set; it is marked again if the
    /// new attempt fails too.
    ///
    /// # Errors
    ///
    /// - `SyncError::UnknownCorrelationToken` if no failed message has `token`
    /// - `SyncError::Protocol` if the payload cannot be encoded
    pub fn retry(
        &mut self,
        ledger: &Ledger,
        token: &CorrelationToken,
    ) -> Result<OutboundFrame, SyncError> {
        let message = self
            .failed
            .contains(token)
            .then(|| ledger.get(&IdentityKey::Local(token.clone())))
            .flatten()
            .ok_or_else(|| SyncError::UnknownCorrelationToken { token: token.clone() })?;

        let frame = self.frame(message, token.clone())?;
        self.failed.remove(token);
        tracing::debug!(%token, "retrying failed message");
        Ok(frame)
    }

    /// Forget failure state for a message the server confirmed.
    ///
    /// Returns true if the token was marked failed.
    pub fn confirm(&mut self, token: &CorrelationToken) -> bool {
        self.failed.remove(token)
    }

    /// Drop failed tokens that no longer refer to an unconfirmed entry.
    pub fn prune(&mut self, ledger: &Ledger) {
        self.failed.retain(|token| ledger.position_of(&IdentityKey::Local(token.clone())).is_some());
    }

    /// Tokens of messages awaiting retry.
    pub fn failed(&self) -> impl Iterator<Item = &CorrelationToken> {
        self.failed.iter()
    }

    /// Returns true if the message with `token` awaits retry.
    pub fn is_failed(&self, token: &CorrelationToken) -> bool {
        self.failed.contains(token)
    }

    /// Forget all failure state.
    pub fn reset(&mut self) {
        self.failed.clear();
    }

    fn frame(&self, message: &Message, token: CorrelationToken) -> Result<OutboundFrame, SyncError> {
        let payload = Outbound::Message(message.to_payload()).encode()?;
        Ok(OutboundFrame {
            destination: self.destination.clone(),
            payload,
            purpose: PublishPurpose::Message { token },
        })
    }
}
