//! Subscription lifecycle for the active conversation.
//!
//! At most one conversation is bound at a time. A binding owns the
//! conversation's ledger, its metadata, and the three subscriptions that feed
//! it: the personal message queue, the personal status queue, and the
//! conversation's typing topic.
//!
//! # State machine
//!
//! ```text
//! Unbound ──bind──► Binding ──(loaded + every subscription acked)──► Bound
//!    ▲                 ▲                                               │
//!    │                 └──────────── disconnect / reconnect ───────────┘
//!    └──────── unbind (any state) ─────────────────────────────────────┘
//! ```
//!
//! Every bind and every reload gets a fresh [`BindingGeneration`]. Load
//! results carry the generation they were requested for, so a result that
//! arrives after the user moved on is recognised and discarded.

use std::fmt;

use parley_proto::{ChatRoom, Inbound, InboundKind, Topics};

use crate::{Ledger, SyncAction};

/// Frames buffered per binding while its ledger loads.
const MAX_BUFFERED_FRAMES: usize = 1024;

/// Engine-assigned handle for one topic subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Create a subscription handle from its raw value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Counter distinguishing successive bindings and reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingGeneration(u64);

impl BindingGeneration {
    /// Create a generation from its raw value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw generation value.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Binding state of the active conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingState {
    /// No conversation selected.
    Unbound,
    /// Conversation selected; history or subscriptions still pending.
    Binding,
    /// History loaded and every subscription acknowledged.
    Bound,
}

#[derive(Debug, Clone)]
struct Subscription {
    id: SubscriptionId,
    kind: InboundKind,
    topic: String,
    acked: bool,
}

#[derive(Debug, Clone)]
struct Binding {
    generation: BindingGeneration,
    subscriptions: Vec<Subscription>,
    room: Option<ChatRoom>,
    ledger: Ledger,
    /// Ledger-bound frames that arrived before the pending load completed.
    buffered: Vec<Inbound>,
    loaded: bool,
}

/// Owns the binding of the active conversation and its subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionLifecycle {
    topics: Topics,
    next_subscription: u64,
    next_generation: u64,
    binding: Option<Binding>,
}

impl SubscriptionLifecycle {
    /// Create an unbound lifecycle using `topics`.
    pub fn new(topics: Topics) -> Self {
        Self { topics, next_subscription: 0, next_generation: 0, binding: None }
    }

    /// Bind `conversation_id`, releasing any previous binding first.
    ///
    /// Returns the unsubscribe actions for the old binding, the subscribe
    /// actions for the new one (only if `connected`), and the history load.
    pub fn bind(&mut self, conversation_id: &str, connected: bool) -> Vec<SyncAction> {
        let mut actions = self.unbind();

        let generation = self.next_generation();
        let mut binding = Binding {
            generation,
            subscriptions: Vec::new(),
            room: None,
            ledger: Ledger::new(conversation_id),
            buffered: Vec::new(),
            loaded: false,
        };

        if connected {
            actions.extend(self.subscribe_missing(&mut binding));
        }
        actions.push(SyncAction::LoadConversation {
            conversation_id: conversation_id.to_owned(),
            generation,
        });

        tracing::debug!(conversation = %conversation_id, generation = generation.0, "binding conversation");
        self.binding = Some(binding);
        actions
    }

    /// Release the current binding.
    ///
    /// Every subscription, acknowledged or still pending, is released exactly
    /// once. Unbinding while unbound does nothing.
    pub fn unbind(&mut self) -> Vec<SyncAction> {
        let Some(binding) = self.binding.take() else {
            return Vec::new();
        };

        tracing::debug!(conversation = %binding.ledger.conversation_id(), "unbinding conversation");
        binding
            .subscriptions
            .into_iter()
            .map(|subscription| SyncAction::Unsubscribe { subscription: subscription.id })
            .collect()
    }

    /// Re-establish the binding after the transport (re)connected.
    ///
    /// Subscribes every missing topic. If history had already loaded, it is
    /// reloaded under a new generation to pick up messages missed while
    /// offline; the current ledger stays visible meanwhile.
    pub fn on_connect(&mut self) -> Vec<SyncAction> {
        let Some(mut binding) = self.binding.take() else {
            return Vec::new();
        };

        let mut actions = self.subscribe_missing(&mut binding);
        if binding.loaded {
            binding.generation = self.next_generation();
            binding.loaded = false;
            actions.push(SyncAction::LoadConversation {
                conversation_id: binding.ledger.conversation_id().to_owned(),
                generation: binding.generation,
            });
        }

        self.binding = Some(binding);
        actions
    }

    /// Forget all subscriptions; the transport dropped them.
    pub fn on_disconnect(&mut self) {
        if let Some(binding) = &mut self.binding {
            binding.subscriptions.clear();
        }
    }

    /// Mark `subscription` acknowledged.
    ///
    /// Returns false if it does not belong to the current binding.
    pub fn acknowledge(&mut self, subscription: SubscriptionId) -> bool {
        match self.subscription_mut(subscription) {
            Some(entry) => {
                entry.acked = true;
                true
            },
            None => false,
        }
    }

    /// Drop a subscription the broker refused and return its topic.
    ///
    /// It is requested again on the next connect.
    pub fn subscribe_failed(&mut self, subscription: SubscriptionId) -> Option<String> {
        let binding = self.binding.as_mut()?;
        let position = binding.subscriptions.iter().position(|entry| entry.id == subscription)?;
        Some(binding.subscriptions.remove(position).topic)
    }

    /// Topic family of `subscription`, if it belongs to the current binding.
    pub fn kind_of(&self, subscription: SubscriptionId) -> Option<InboundKind> {
        self.binding
            .as_ref()?
            .subscriptions
            .iter()
            .find(|entry| entry.id == subscription)
            .map(|entry| entry.kind)
    }

    /// Returns true if a load result for `conversation_id` at `generation`
    /// is the one the current binding is waiting for.
    pub fn expects_load(&self, conversation_id: &str, generation: BindingGeneration) -> bool {
        self.binding.as_ref().is_some_and(|binding| {
            !binding.loaded
                && binding.generation == generation
                && binding.ledger.conversation_id() == conversation_id
        })
    }

    /// Install loaded metadata, mark history loaded, and return the frames
    /// buffered meanwhile for replay.
    ///
    /// The caller has already replaced the ledger contents. Does nothing
    /// unless [`SubscriptionLifecycle::expects_load`] holds.
    pub fn complete_load(
        &mut self,
        conversation_id: &str,
        generation: BindingGeneration,
        room: ChatRoom,
    ) -> Vec<Inbound> {
        if !self.expects_load(conversation_id, generation) {
            return Vec::new();
        }
        let Some(binding) = self.binding.as_mut() else {
            return Vec::new();
        };

        binding.room = Some(room);
        binding.loaded = true;
        std::mem::take(&mut binding.buffered)
    }

    /// Hold a ledger-bound frame until the pending load completes.
    ///
    /// Hands the frame back if the binding is already loaded (the caller
    /// should apply it directly) or nothing is bound.
    pub fn buffer(&mut self, frame: Inbound) -> Option<Inbound> {
        let Some(binding) = self.binding.as_mut().filter(|binding| !binding.loaded) else {
            return Some(frame);
        };

        if binding.buffered.len() >= MAX_BUFFERED_FRAMES {
            tracing::warn!(
                conversation = %binding.ledger.conversation_id(),
                "load buffer full, dropping oldest frame"
            );
            binding.buffered.remove(0);
        }
        binding.buffered.push(frame);
        None
    }

    /// Current binding state.
    pub fn state(&self) -> BindingState {
        match &self.binding {
            None => BindingState::Unbound,
            Some(binding)
                if binding.loaded
                    && binding.subscriptions.len() == SUBSCRIBED_KINDS.len()
                    && binding.subscriptions.iter().all(|entry| entry.acked) =>
            {
                BindingState::Bound
            },
            Some(_) => BindingState::Binding,
        }
    }

    /// Active conversation, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|binding| binding.ledger.conversation_id())
    }

    /// Generation of the current binding.
    pub fn generation(&self) -> Option<BindingGeneration> {
        self.binding.as_ref().map(|binding| binding.generation)
    }

    /// Returns true once history for the current binding has loaded.
    pub fn is_loaded(&self) -> bool {
        self.binding.as_ref().is_some_and(|binding| binding.loaded)
    }

    /// Metadata of the active conversation, once loaded.
    pub fn room(&self) -> Option<&ChatRoom> {
        self.binding.as_ref()?.room.as_ref()
    }

    /// Ledger of the active conversation.
    pub fn ledger(&self) -> Option<&Ledger> {
        self.binding.as_ref().map(|binding| &binding.ledger)
    }

    /// Mutable ledger and metadata of the active conversation.
    pub fn ledger_mut(&mut self) -> Option<(&mut Ledger, Option<&ChatRoom>)> {
        self.binding.as_mut().map(|binding| (&mut binding.ledger, binding.room.as_ref()))
    }

    /// Live subscription ids with their topics.
    pub fn subscriptions(&self) -> impl Iterator<Item = (SubscriptionId, &str)> {
        self.binding
            .iter()
            .flat_map(|binding| binding.subscriptions.iter())
            .map(|entry| (entry.id, entry.topic.as_str()))
    }

    fn subscribe_missing(&mut self, binding: &mut Binding) -> Vec<SyncAction> {
        let conversation_id = binding.ledger.conversation_id().to_owned();
        let mut actions = Vec::new();

        for kind in SUBSCRIBED_KINDS {
            if binding.subscriptions.iter().any(|entry| entry.kind == kind) {
                continue;
            }

            let topic = match kind {
                InboundKind::Message => self.topics.messages.clone(),
                InboundKind::MessageStatus => self.topics.message_status.clone(),
                InboundKind::Typing => self.topics.typing_for(&conversation_id),
            };
            self.next_subscription += 1;
            let id = SubscriptionId(self.next_subscription);

            binding.subscriptions.push(Subscription { id, kind, topic: topic.clone(), acked: false });
            actions.push(SyncAction::Subscribe { subscription: id, topic });
        }

        actions
    }

    fn subscription_mut(&mut self, subscription: SubscriptionId) -> Option<&mut Subscription> {
        self.binding.as_mut()?.subscriptions.iter_mut().find(|entry| entry.id == subscription)
    }

    fn next_generation(&mut self) -> BindingGeneration {
        self.next_generation += 1;
        BindingGeneration(self.next_generation)
    }
}

const SUBSCRIBED_KINDS: [InboundKind; 3] =
    [InboundKind::Message, InboundKind::MessageStatus, InboundKind::Typing];
