//! Synchronous simulated session.
//!
//! `SimSession` wraps one [`SyncEngine`] over a [`SimEnv`] and executes its
//! actions against a tiny in-process server model: subscriptions are
//! acknowledged immediately, loads are answered from stored history, and
//! published messages are persisted and echoed back. It is the workhorse of
//! the property tests, where every step is followed by an invariant check.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    time::Duration,
};

use parley_core::{
    ChatRoom, Environment, Notification, OutboundFrame, PublishPurpose, ServerId,
    SubscriptionId, SyncAction, SyncConfig, SyncEngine, SyncError, SyncEvent,
};
use parley_proto::{
    DeliveryStatus, Inbound, InboundKind, MessagePayload, Outbound, TypingPayload,
};

use crate::{
    SimEnv,
    invariants::{EngineSnapshot, InvariantRegistry, SystemSnapshot},
};

/// How the simulated server echoes published messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoMode {
    /// Echo with the client's correlation token.
    #[default]
    WithToken,
    /// Echo without the correlation token.
    WithoutToken,
    /// Persist but never echo.
    Silent,
}

/// Engine plus server model, driven step by step.
pub struct SimSession {
    engine: SyncEngine<SimEnv>,
    env: SimEnv,
    conversations: HashMap<String, (ChatRoom, Vec<MessagePayload>)>,
    subscriptions: BTreeMap<SubscriptionId, String>,
    next_server_id: u64,
    echo: EchoMode,
    defer_loads: bool,
    pending_loads: VecDeque<SyncEvent<crate::SimInstant>>,
    echoes: VecDeque<MessagePayload>,
    published: Vec<OutboundFrame>,
    notifications: Vec<Notification>,
    invariants: Option<InvariantRegistry>,
    snapshot: Option<EngineSnapshot>,
}

impl SimSession {
    /// Create a session with default configuration and an RNG seeded with
    /// `seed`.
    pub fn new(seed: u64) -> Result<Self, SyncError> {
        let env = SimEnv::with_seed(seed);
        let engine = SyncEngine::new(env.clone(), SyncConfig::default())?;
        Ok(Self {
            engine,
            env,
            conversations: HashMap::new(),
            subscriptions: BTreeMap::new(),
            next_server_id: 1_000,
            echo: EchoMode::default(),
            defer_loads: false,
            pending_loads: VecDeque::new(),
            echoes: VecDeque::new(),
            published: Vec::new(),
            notifications: Vec::new(),
            invariants: None,
            snapshot: None,
        })
    }

    /// Check `registry` after every engine step.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Change how published messages are echoed.
    pub fn set_echo(&mut self, echo: EchoMode) {
        self.echo = echo;
    }

    /// Hold load answers until [`SimSession::complete_loads`].
    pub fn defer_loads(&mut self, defer: bool) {
        self.defer_loads = defer;
    }

    /// Store a conversation on the server.
    pub fn add_conversation(&mut self, room: ChatRoom, history: Vec<MessagePayload>) {
        self.conversations.insert(room.id.clone(), (room, history));
    }

    /// Feed `event` to the engine and run every follow-up to completion.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if `event` is rejected.
    pub fn apply(&mut self, event: SyncEvent<crate::SimInstant>) -> Result<(), SyncError> {
        let actions = self.engine.handle(event)?;
        self.after_step("event");

        let mut pending = VecDeque::new();
        self.execute(actions, &mut pending);
        while let Some(event) = pending.pop_front() {
            let actions = self.engine.handle(event)?;
            self.after_step("follow-up");
            self.execute(actions, &mut pending);
        }
        Ok(())
    }

    /// Log in, connect, and bind `conversation_id`.
    pub fn open(&mut self, username: &str, conversation_id: &str) -> Result<(), SyncError> {
        self.apply(SyncEvent::ProfileLoaded { username: username.into() })?;
        self.apply(SyncEvent::Connected)?;
        self.apply(SyncEvent::SelectConversation { conversation_id: conversation_id.into() })
    }

    /// Answer every deferred load.
    pub fn complete_loads(&mut self) -> Result<(), SyncError> {
        while let Some(event) = self.pending_loads.pop_front() {
            self.apply(event)?;
        }
        Ok(())
    }

    /// Submit a message.
    pub fn send(&mut self, text: &str) -> Result<(), SyncError> {
        self.apply(SyncEvent::SendMessage { text: text.into() })
    }

    /// Change the compose input.
    pub fn compose(&mut self, text: &str) -> Result<(), SyncError> {
        self.apply(SyncEvent::ComposeChanged { text: text.into() })
    }

    /// Advance virtual time by `millis` and tick the engine.
    pub fn advance(&mut self, millis: u64) -> Result<(), SyncError> {
        self.env.advance(Duration::from_millis(millis));
        let now = self.env.now();
        self.apply(SyncEvent::Tick { now })
    }

    /// Deliver every queued echo of published messages.
    pub fn flush_echoes(&mut self) -> Result<(), SyncError> {
        while let Some(echo) = self.echoes.pop_front() {
            self.deliver_message(&echo)?;
        }
        Ok(())
    }

    /// Deliver a message frame on the personal message queue.
    pub fn deliver_message(&mut self, payload: &MessagePayload) -> Result<(), SyncError> {
        let topic = self.engine.config().topics.messages.clone();
        self.deliver(&topic, Outbound::Message(payload.clone()).encode()?)
    }

    /// Deliver a status frame on the personal status queue.
    pub fn deliver_status(&mut self, payload: &MessagePayload) -> Result<(), SyncError> {
        let topic = self.engine.config().topics.message_status.clone();
        self.deliver(&topic, Outbound::Message(payload.clone()).encode()?)
    }

    /// Deliver a typing signal on its conversation's typing topic.
    pub fn deliver_typing(&mut self, signal: &TypingPayload) -> Result<(), SyncError> {
        let topic = self.engine.config().topics.typing_for(&signal.conversation_id);
        self.deliver(&topic, Outbound::Typing(signal.clone()).encode()?)
    }

    /// Deliver raw bytes to every live subscription on `topic`.
    pub fn deliver(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), SyncError> {
        let targets: Vec<SubscriptionId> = self
            .subscriptions
            .iter()
            .filter(|(_, subscribed)| subscribed.as_str() == topic)
            .map(|(id, _)| *id)
            .collect();

        for subscription in targets {
            self.apply(SyncEvent::FrameReceived { subscription, payload: payload.clone() })?;
        }
        Ok(())
    }

    /// Drop the connection.
    pub fn disconnect(&mut self) -> Result<(), SyncError> {
        self.subscriptions.clear();
        self.apply(SyncEvent::Disconnected)
    }

    /// Re-establish the connection.
    pub fn reconnect(&mut self) -> Result<(), SyncError> {
        self.apply(SyncEvent::Connected)
    }

    /// The engine under test.
    pub fn engine(&self) -> &SyncEngine<SimEnv> {
        &self.engine
    }

    /// The shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Take every frame published so far.
    pub fn take_published(&mut self) -> Vec<OutboundFrame> {
        std::mem::take(&mut self.published)
    }

    /// Take every notification emitted so far.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Topics with a live subscription.
    pub fn subscribed_topics(&self) -> Vec<&str> {
        self.subscriptions.values().map(String::as_str).collect()
    }

    /// Current observable state with histories.
    pub fn snapshot(&self) -> EngineSnapshot {
        match &self.snapshot {
            Some(previous) => EngineSnapshot::following(previous, &self.engine),
            None => EngineSnapshot::capture(0, &self.engine),
        }
    }

    fn after_step(&mut self, context: &str) {
        let snapshot = self.snapshot();
        if let Some(registry) = &self.invariants {
            registry.assert_all(&SystemSnapshot::single(snapshot.clone()), context);
        }
        self.snapshot = Some(snapshot);
    }

    fn execute(&mut self, actions: Vec<SyncAction>, pending: &mut VecDeque<SyncEvent<crate::SimInstant>>) {
        for action in actions {
            match action {
                SyncAction::Publish(frame) => {
                    if let PublishPurpose::Message { .. } = frame.purpose {
                        self.persist(&frame);
                    }
                    self.published.push(frame);
                },
                SyncAction::Subscribe { subscription, topic } => {
                    self.subscriptions.insert(subscription, topic);
                    pending.push_back(SyncEvent::Subscribed { subscription });
                },
                SyncAction::Unsubscribe { subscription } => {
                    self.subscriptions.remove(&subscription);
                },
                SyncAction::LoadConversation { conversation_id, generation } => {
                    let event = match self.conversations.get(&conversation_id) {
                        Some((room, history)) => SyncEvent::ConversationLoaded {
                            conversation_id,
                            generation,
                            room: room.clone(),
                            messages: history.clone(),
                        },
                        None => SyncEvent::ConversationLoadFailed {
                            conversation_id,
                            generation,
                            reason: "not found".into(),
                        },
                    };
                    if self.defer_loads {
                        self.pending_loads.push_back(event);
                    } else {
                        pending.push_back(event);
                    }
                },
                SyncAction::Notify(notification) => self.notifications.push(notification),
            }
        }
    }

    /// Persist a published message the way the server would and queue its
    /// echo.
    fn persist(&mut self, frame: &OutboundFrame) {
        let Ok(Inbound::Message(mut message)) = Inbound::decode(InboundKind::Message, &frame.payload)
        else {
            tracing::warn!(destination = %frame.destination, "simulated server could not decode message");
            return;
        };

        self.next_server_id += 1;
        message.server_id = Some(ServerId::new(self.next_server_id.to_string()));
        message.status = Some(DeliveryStatus::Sent);

        let mut stored = message.clone();
        stored.correlation_token = None;
        if let Some((_, history)) = self.conversations.get_mut(&message.conversation_id) {
            history.push(stored);
        }

        match self.echo {
            EchoMode::WithToken => self.echoes.push_back(message),
            EchoMode::WithoutToken => {
                message.correlation_token = None;
                self.echoes.push_back(message);
            },
            EchoMode::Silent => {},
        }
    }
}
