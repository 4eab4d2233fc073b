//! Synchronization engine.
//!
//! [`SyncEngine`] ties the components together for one user session. It owns
//! the binding of the active conversation (and through it the ledger), the
//! typing tracker, the send pipeline and the receipt dispatcher, and routes
//! every [`SyncEvent`] to them.
//!
//! After each event the engine compares what the presentation layer can
//! observe (binding state, ledger revision) before and after, and appends the
//! matching [`Notification`]s. Read receipts are dispatched in the same step
//! whenever the bound ledger changed, so the dispatcher runs at most once per
//! event and its own updates never retrigger it.

use parley_proto::{
    ChatRoom, ConversationId, CorrelationToken, Inbound, MessagePayload, Outbound,
    TypingPayload, Username,
};

use crate::{
    BindingGeneration, BindingState, Environment, Ledger, Message, Notification, OutboundFrame,
    PublishPurpose, ReadReceiptDispatcher, SendPipeline, SubscriptionId, SubscriptionLifecycle,
    SyncAction, SyncConfig, SyncError, SyncEvent, TypingChange, TypingTracker,
};

/// What the presentation layer can see; compared across an event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Observed {
    conversation_id: Option<ConversationId>,
    state: BindingState,
    revision: Option<u64>,
}

/// Chat synchronization engine for one session.
///
/// Generic over `E: Environment` so simulations can drive time and
/// randomness deterministically.
pub struct SyncEngine<E: Environment> {
    env: E,
    config: SyncConfig,
    identity: Option<Username>,
    connected: bool,
    lifecycle: SubscriptionLifecycle,
    typing: TypingTracker<E::Instant>,
    sender: SendPipeline,
    receipts: ReadReceiptDispatcher,
}

impl<E: Environment> SyncEngine<E> {
    /// Create an engine with no identity, no connection and no conversation.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidConfig` if `config` fails validation
    pub fn new(env: E, config: SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;

        Ok(Self {
            lifecycle: SubscriptionLifecycle::new(config.topics.clone()),
            typing: TypingTracker::new(config.typing_debounce, config.typing_liveness),
            sender: SendPipeline::new(
                config.destinations.send_message.clone(),
                config.max_content_len,
            ),
            receipts: ReadReceiptDispatcher::new(config.destinations.read_receipt.clone()),
            env,
            config,
            identity: None,
            connected: false,
        })
    }

    /// Process an event and return the actions the caller must execute.
    ///
    /// # Errors
    ///
    /// Only caller-facing intents fail: sending, retrying and selecting a
    /// conversation return precondition errors (see
    /// [`SyncError::is_precondition`]). Everything else is absorbed, logged,
    /// and surfaced as [`Notification::Error`] where the user should know.
    pub fn handle(&mut self, event: SyncEvent<E::Instant>) -> Result<Vec<SyncAction>, SyncError> {
        let before = self.observe();

        let mut actions = match event {
            SyncEvent::ProfileLoaded { username } => self.handle_profile_loaded(username),
            SyncEvent::ProfileCleared => self.handle_profile_cleared(),
            SyncEvent::Connected => self.handle_connected(),
            SyncEvent::Disconnected => self.handle_disconnected(),
            SyncEvent::SelectConversation { conversation_id } => {
                self.handle_select(conversation_id)?
            },
            SyncEvent::CloseConversation | SyncEvent::Teardown => self.handle_close(),
            SyncEvent::ConversationLoaded { conversation_id, generation, room, messages } => {
                self.handle_loaded(&conversation_id, generation, room, messages)
            },
            SyncEvent::ConversationLoadFailed { conversation_id, generation, reason } => {
                self.handle_load_failed(conversation_id, generation, reason)
            },
            SyncEvent::Subscribed { subscription } => self.handle_subscribed(subscription),
            SyncEvent::SubscribeFailed { subscription, reason } => {
                self.handle_subscribe_failed(subscription, reason)
            },
            SyncEvent::UnsubscribeFailed { subscription, reason } => {
                tracing::warn!(%subscription, %reason, "unsubscribe failed");
                Vec::new()
            },
            SyncEvent::FrameReceived { subscription, payload } => {
                self.handle_frame(subscription, &payload)
            },
            SyncEvent::PublishFailed { purpose, reason } => {
                self.handle_publish_failed(purpose, reason)
            },
            SyncEvent::SendMessage { text } => self.handle_send(&text)?,
            SyncEvent::RetrySend { token } => self.handle_retry(&token)?,
            SyncEvent::ComposeChanged { text } => self.handle_compose(&text),
            SyncEvent::Tick { now } => self.handle_tick(now),
        };

        self.settle(&before, &mut actions);
        Ok(actions)
    }

    /// Ledger of the active conversation.
    pub fn ledger(&self) -> Option<&Ledger> {
        self.lifecycle.ledger()
    }

    /// Binding state of the active conversation.
    pub fn binding_state(&self) -> BindingState {
        self.lifecycle.state()
    }

    /// Active conversation, if any.
    pub fn active_conversation(&self) -> Option<&str> {
        self.lifecycle.conversation_id()
    }

    /// Metadata of the active conversation, once loaded.
    pub fn room(&self) -> Option<&ChatRoom> {
        self.lifecycle.room()
    }

    /// Remote users currently typing in the active conversation.
    pub fn typing_users(&self) -> impl Iterator<Item = &str> {
        self.typing.typing_users()
    }

    /// Tokens of sends awaiting retry.
    pub fn failed_sends(&self) -> impl Iterator<Item = &CorrelationToken> {
        self.sender.failed()
    }

    /// Authenticated user, if any.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Returns true while the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Last typing state announced for the active conversation.
    pub fn is_announcing_typing(&self) -> bool {
        self.typing.is_announcing()
    }

    /// Typing tracker, for inspection.
    pub fn typing(&self) -> &TypingTracker<E::Instant> {
        &self.typing
    }

    /// Subscription lifecycle, for inspection.
    pub fn lifecycle(&self) -> &SubscriptionLifecycle {
        &self.lifecycle
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Environment the engine was built with.
    pub fn env(&self) -> &E {
        &self.env
    }

    fn handle_profile_loaded(&mut self, username: Username) -> Vec<SyncAction> {
        tracing::info!(%username, "profile loaded");
        self.identity = Some(username);
        Vec::new()
    }

    fn handle_profile_cleared(&mut self) -> Vec<SyncAction> {
        tracing::info!("profile cleared");
        self.identity = None;
        self.handle_close()
    }

    fn handle_connected(&mut self) -> Vec<SyncAction> {
        tracing::info!(conversation = ?self.lifecycle.conversation_id(), "transport connected");
        self.connected = true;
        // Peers may have missed transitions made while offline
        self.typing.forget_announced();
        self.lifecycle.on_connect()
    }

    fn handle_disconnected(&mut self) -> Vec<SyncAction> {
        tracing::info!("transport disconnected");
        self.connected = false;
        self.lifecycle.on_disconnect();
        Vec::new()
    }

    fn handle_select(&mut self, conversation_id: ConversationId) -> Result<Vec<SyncAction>, SyncError> {
        if self.identity.is_none() {
            return Err(SyncError::NotAuthenticated);
        }

        tracing::info!(conversation = %conversation_id, "selecting conversation");
        let actions = self.lifecycle.bind(&conversation_id, self.connected);
        self.typing.bind(conversation_id);
        self.sender.reset();
        Ok(actions)
    }

    fn handle_close(&mut self) -> Vec<SyncAction> {
        if let Some(conversation_id) = self.lifecycle.conversation_id() {
            tracing::info!(conversation = %conversation_id, "closing conversation");
        }

        self.typing.reset();
        self.sender.reset();
        self.lifecycle.unbind()
    }

    fn handle_loaded(
        &mut self,
        conversation_id: &str,
        generation: BindingGeneration,
        room: ChatRoom,
        messages: Vec<MessagePayload>,
    ) -> Vec<SyncAction> {
        if !self.lifecycle.expects_load(conversation_id, generation) {
            tracing::debug!(
                conversation = %conversation_id,
                generation = generation.value(),
                "discarding stale conversation load"
            );
            return Vec::new();
        }

        if let Some((ledger, _)) = self.lifecycle.ledger_mut() {
            let pending: Vec<Message> = ledger.unconfirmed().cloned().collect();

            let rejected = ledger.replace_all(messages.into_iter().map(Message::from_payload));
            if rejected > 0 {
                tracing::warn!(conversation = %conversation_id, rejected, "history contained invalid entries");
            }

            for message in pending {
                if let Err(error) = ledger.restore_unconfirmed(message) {
                    tracing::warn!(conversation = %conversation_id, %error, "dropping pending message");
                }
            }
            self.sender.prune(ledger);
        }

        let replay = self.lifecycle.complete_load(conversation_id, generation, room);
        tracing::debug!(conversation = %conversation_id, replayed = replay.len(), "conversation loaded");

        let mut actions = Vec::new();
        for frame in replay {
            actions.extend(self.apply_inbound(frame));
        }
        actions
    }

    fn handle_load_failed(
        &mut self,
        conversation_id: ConversationId,
        generation: BindingGeneration,
        reason: String,
    ) -> Vec<SyncAction> {
        if !self.lifecycle.expects_load(&conversation_id, generation) {
            return Vec::new();
        }

        tracing::warn!(conversation = %conversation_id, %reason, "conversation load failed");
        vec![SyncAction::Notify(Notification::Error(SyncError::LoadFailed {
            conversation_id,
            reason,
        }))]
    }

    fn handle_subscribed(&mut self, subscription: SubscriptionId) -> Vec<SyncAction> {
        if !self.lifecycle.acknowledge(subscription) {
            tracing::debug!(%subscription, "ignoring ack for released subscription");
        }
        Vec::new()
    }

    fn handle_subscribe_failed(
        &mut self,
        subscription: SubscriptionId,
        reason: String,
    ) -> Vec<SyncAction> {
        let Some(topic) = self.lifecycle.subscribe_failed(subscription) else {
            return Vec::new();
        };

        tracing::warn!(%subscription, %topic, %reason, "subscribe failed");
        vec![SyncAction::Notify(Notification::Error(SyncError::SubscribeFailed { topic, reason }))]
    }

    fn handle_frame(&mut self, subscription: SubscriptionId, payload: &[u8]) -> Vec<SyncAction> {
        let Some(kind) = self.lifecycle.kind_of(subscription) else {
            tracing::debug!(%subscription, "dropping frame from released subscription");
            return Vec::new();
        };

        let inbound = match Inbound::decode(kind, payload) {
            Ok(inbound) => inbound,
            Err(error) => {
                tracing::warn!(%subscription, %error, "dropping malformed frame");
                return Vec::new();
            },
        };

        if let Inbound::Typing(signal) = &inbound {
            return self.apply_typing(signal);
        }

        match self.lifecycle.buffer(inbound) {
            Some(inbound) => self.apply_inbound(inbound),
            None => Vec::new(),
        }
    }

    fn apply_inbound(&mut self, inbound: Inbound) -> Vec<SyncAction> {
        match inbound {
            Inbound::Typing(signal) => self.apply_typing(&signal),
            Inbound::Message(payload) => self.apply_message(payload, true),
            Inbound::MessageStatus(payload) => self.apply_message(payload, false),
        }
    }

    fn apply_message(&mut self, payload: MessagePayload, is_new: bool) -> Vec<SyncAction> {
        let Some((ledger, _)) = self.lifecycle.ledger_mut() else {
            return Vec::new();
        };

        if payload.conversation_id != ledger.conversation_id() {
            tracing::debug!(conversation = %payload.conversation_id, "frame for inactive conversation");
            return if is_new {
                vec![SyncAction::Notify(Notification::ConversationActivity {
                    conversation_id: payload.conversation_id,
                })]
            } else {
                Vec::new()
            };
        }

        let message = Message::from_payload(payload);
        let outcome =
            if is_new { ledger.upsert(message).map(Some) } else { ledger.apply_status(message) };

        match outcome {
            Ok(Some(outcome)) => {
                let entry = &ledger.snapshot()[outcome.position()];
                if let (Some(_), Some(token)) = (&entry.server_id, &entry.correlation_token) {
                    self.sender.confirm(token);
                }
                Vec::new()
            },
            Ok(None) => {
                tracing::debug!("status update held until its message arrives");
                Vec::new()
            },
            Err(error) => {
                tracing::warn!(%error, "rejecting inbound message");
                vec![SyncAction::Notify(Notification::Error(error.into()))]
            },
        }
    }

    fn apply_typing(&mut self, signal: &TypingPayload) -> Vec<SyncAction> {
        let now = self.env.now();
        self.typing
            .remote_signal(now, signal, self.identity.as_deref())
            .map(|change| self.typing_actions(change))
            .unwrap_or_default()
    }

    fn handle_publish_failed(&mut self, purpose: PublishPurpose, reason: String) -> Vec<SyncAction> {
        match purpose {
            PublishPurpose::Message { token } => {
                let marked = self
                    .lifecycle
                    .ledger()
                    .is_some_and(|ledger| self.sender.mark_failed(ledger, &token));
                if !marked {
                    tracing::debug!(%token, "publish failed for message no longer pending");
                    return Vec::new();
                }

                tracing::warn!(%token, %reason, "send failed");
                vec![SyncAction::Notify(Notification::SendFailed { token, reason })]
            },
            PublishPurpose::Typing { is_typing } => {
                tracing::warn!(is_typing, %reason, "typing publish failed");
                self.typing.forget_announced();
                Vec::new()
            },
            PublishPurpose::ReadReceipt { server_id } => {
                tracing::warn!(%server_id, %reason, "read receipt publish failed");
                Vec::new()
            },
        }
    }

    fn handle_send(&mut self, text: &str) -> Result<Vec<SyncAction>, SyncError> {
        let sender_id = self.identity.as_deref().ok_or(SyncError::NotAuthenticated)?;
        let (ledger, room) = self.lifecycle.ledger_mut().ok_or(SyncError::NoActiveConversation)?;
        let room = room.ok_or_else(|| SyncError::ConversationNotReady {
            conversation_id: ledger.conversation_id().to_owned(),
        })?;

        let frame = self.sender.submit(&self.env, ledger, room, sender_id, text)?;
        Ok(self.publish_message(frame))
    }

    fn handle_retry(&mut self, token: &CorrelationToken) -> Result<Vec<SyncAction>, SyncError> {
        let ledger = self.lifecycle.ledger().ok_or(SyncError::NoActiveConversation)?;
        let frame = self.sender.retry(ledger, token)?;
        Ok(self.publish_message(frame))
    }

    /// Publish a message frame, or mark it failed right away while offline.
    fn publish_message(&mut self, frame: OutboundFrame) -> Vec<SyncAction> {
        if self.connected {
            return vec![SyncAction::Publish(frame)];
        }

        match frame.purpose {
            PublishPurpose::Message { token } => {
                self.handle_publish_failed(PublishPurpose::Message { token }, "not connected".into())
            },
            _ => Vec::new(),
        }
    }

    fn handle_compose(&mut self, text: &str) -> Vec<SyncAction> {
        if self.identity.is_none() {
            return Vec::new();
        }

        let now = self.env.now();
        if !self.typing.compose_changed(now, text) {
            tracing::debug!("compose change without active conversation");
        }
        Vec::new()
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<SyncAction> {
        self.typing
            .expire(now)
            .into_iter()
            .flat_map(|change| self.typing_actions(change))
            .collect()
    }

    fn typing_actions(&self, change: TypingChange) -> Vec<SyncAction> {
        match change {
            TypingChange::Announce { is_typing } => match self.typing_frame(is_typing) {
                Ok(Some(frame)) => vec![SyncAction::Publish(frame)],
                Ok(None) => Vec::new(),
                Err(error) => {
                    tracing::warn!(%error, "cannot encode typing signal");
                    Vec::new()
                },
            },
            TypingChange::RemoteStarted { username } => {
                vec![SyncAction::Notify(Notification::TypingChanged { username, is_typing: true })]
            },
            TypingChange::RemoteStopped { username } => {
                vec![SyncAction::Notify(Notification::TypingChanged { username, is_typing: false })]
            },
        }
    }

    fn typing_frame(&self, is_typing: bool) -> Result<Option<OutboundFrame>, SyncError> {
        let (Some(conversation_id), Some(username)) =
            (self.typing.conversation_id(), self.identity.as_deref())
        else {
            return Ok(None);
        };

        if !self.connected {
            tracing::debug!(is_typing, "not connected, typing transition not published");
            return Ok(None);
        }

        let payload = Outbound::Typing(TypingPayload {
            conversation_id: conversation_id.to_owned(),
            username: username.to_owned(),
            is_typing,
        })
        .encode()?;

        Ok(Some(OutboundFrame {
            destination: self.config.destinations.typing.clone(),
            payload,
            purpose: PublishPurpose::Typing { is_typing },
        }))
    }

    fn observe(&self) -> Observed {
        Observed {
            conversation_id: self.lifecycle.conversation_id().map(str::to_owned),
            state: self.lifecycle.state(),
            revision: self.lifecycle.ledger().map(Ledger::revision),
        }
    }

    /// Dispatch receipts and append notifications for what changed since
    /// `before`.
    fn settle(&mut self, before: &Observed, actions: &mut Vec<SyncAction>) {
        let mid = self.observe();
        let ledger_moved =
            mid.conversation_id != before.conversation_id || mid.revision != before.revision;

        if mid.state == BindingState::Bound && (ledger_moved || mid.state != before.state) {
            actions.extend(self.dispatch_receipts());
        }

        let after = self.observe();
        if after.state != before.state || after.conversation_id != before.conversation_id {
            tracing::info!(conversation = ?after.conversation_id, state = ?after.state, "binding changed");
            actions.push(SyncAction::Notify(Notification::BindingChanged {
                conversation_id: after.conversation_id.clone(),
                state: after.state,
            }));
        }

        let ledger_changed = after.conversation_id != before.conversation_id
            || after.revision != before.revision;
        if let (true, Some(conversation_id)) = (ledger_changed, after.conversation_id) {
            actions.push(SyncAction::Notify(Notification::LedgerChanged { conversation_id }));
        }
    }

    fn dispatch_receipts(&mut self) -> Vec<SyncAction> {
        let Some(local_user) = self.identity.as_deref() else {
            return Vec::new();
        };
        let Some((ledger, _)) = self.lifecycle.ledger_mut() else {
            return Vec::new();
        };

        match self.receipts.dispatch(ledger, local_user) {
            Ok(frames) => frames.into_iter().map(SyncAction::Publish).collect(),
            Err(error) => {
                tracing::warn!(%error, "read receipt dispatch failed");
                vec![SyncAction::Notify(Notification::Error(error))]
            },
        }
    }
}
