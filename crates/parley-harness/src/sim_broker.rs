//! In-memory broker implementing [`Transport`] and [`ConversationSource`].
//!
//! `SimBroker` plays both the message broker and the history endpoint so the
//! same [`parley_app::Runtime`] that runs in production can be driven in
//! tests. Clones share state: tests keep one handle to inject frames and
//! inspect what was published while the runtime owns another.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use parley_app::{ConversationSource, LoadedConversation, Transport, TransportEvent};
use parley_core::SubscriptionId;
use parley_proto::{ChatRoom, MessagePayload};
use tokio::sync::Notify;

/// Error type for the simulated broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimBrokerError(pub String);

impl std::fmt::Display for SimBrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimBrokerError: {}", self.0)
    }
}

impl std::error::Error for SimBrokerError {}

/// A frame the client published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Destination it was published to.
    pub destination: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct BrokerState {
    inbox: VecDeque<TransportEvent>,
    published: Vec<Published>,
    subscriptions: BTreeMap<SubscriptionId, String>,
    unsubscribed: Vec<SubscriptionId>,
    conversations: HashMap<String, LoadedConversation>,
    refuse_topics: BTreeSet<String>,
    publish_offline: bool,
    closed: bool,
}

/// In-memory broker and conversation source.
#[derive(Clone, Default)]
pub struct SimBroker {
    state: Arc<Mutex<BrokerState>>,
    wake: Arc<Notify>,
}

impl SimBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a conversation for later loads.
    pub fn add_conversation(&self, room: ChatRoom, messages: Vec<MessagePayload>) {
        self.lock().conversations.insert(room.id.clone(), LoadedConversation { room, messages });
    }

    /// Queue a connect notification for the client.
    pub fn connect(&self) {
        self.push(TransportEvent::Connected);
    }

    /// Drop the connection: forget subscriptions and notify the client.
    pub fn disconnect(&self) {
        self.lock().subscriptions.clear();
        self.push(TransportEvent::Disconnected);
    }

    /// Deliver `payload` to every live subscription on `topic`.
    ///
    /// Returns the number of subscriptions it was delivered to.
    pub fn deliver(&self, topic: &str, payload: Vec<u8>) -> usize {
        let targets: Vec<SubscriptionId> = self
            .lock()
            .subscriptions
            .iter()
            .filter(|(_, subscribed)| subscribed.as_str() == topic)
            .map(|(id, _)| *id)
            .collect();

        for subscription in &targets {
            self.push(TransportEvent::Frame { subscription: *subscription, payload: payload.clone() });
        }
        targets.len()
    }

    /// Refuse future subscriptions to `topic`.
    pub fn refuse_topic(&self, topic: impl Into<String>) {
        self.lock().refuse_topics.insert(topic.into());
    }

    /// Make every publish fail until called again with `false`.
    pub fn fail_publishes(&self, fail: bool) {
        self.lock().publish_offline = fail;
    }

    /// Shut the transport down; `next_event` returns `None` once drained.
    pub fn close(&self) {
        self.lock().closed = true;
        self.wake.notify_one();
    }

    /// Take every frame published so far.
    pub fn take_published(&self) -> Vec<Published> {
        std::mem::take(&mut self.lock().published)
    }

    /// Topics with a live subscription.
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.lock().subscriptions.values().cloned().collect()
    }

    /// Subscription handles released so far.
    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.lock().unsubscribed.clone()
    }

    /// Returns true if inbound events are waiting.
    pub fn has_pending(&self) -> bool {
        !self.lock().inbox.is_empty()
    }

    /// Pop the next queued inbound event without waiting.
    pub fn pop_event(&self) -> Option<TransportEvent> {
        self.lock().inbox.pop_front()
    }

    fn push(&self, event: TransportEvent) {
        self.lock().inbox.push_back(event);
        self.wake.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for SimBroker {
    type Error = SimBrokerError;

    async fn publish(&mut self, destination: &str, payload: Vec<u8>) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.publish_offline {
            return Err(SimBrokerError(format!("publish to {destination} refused")));
        }
        state.published.push(Published { destination: destination.to_owned(), payload });
        Ok(())
    }

    async fn subscribe(&mut self, subscription: SubscriptionId, topic: &str) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.refuse_topics.contains(topic) {
            return Err(SimBrokerError(format!("subscription to {topic} refused")));
        }
        state.subscriptions.insert(subscription, topic.to_owned());
        Ok(())
    }

    async fn unsubscribe(&mut self, subscription: SubscriptionId) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.subscriptions.remove(&subscription);
        state.unsubscribed.push(subscription);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            {
                let mut state = self.lock();
                if let Some(event) = state.inbox.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            self.wake.notified().await;
        }
    }
}

impl ConversationSource for SimBroker {
    type Error = SimBrokerError;

    async fn load(&mut self, conversation_id: &str) -> Result<LoadedConversation, Self::Error> {
        self.lock()
            .conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| SimBrokerError(format!("conversation {conversation_id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_reaches_only_matching_subscriptions() {
        let broker = SimBroker::new();
        {
            let mut state = broker.lock();
            state.subscriptions.insert(SubscriptionId::new(1), "/user/queue/messages".into());
            state.subscriptions.insert(SubscriptionId::new(2), "/topic/chat.c1.typing".into());
        }

        assert_eq!(broker.deliver("/user/queue/messages", b"{}".to_vec()), 1);
        assert_eq!(
            broker.pop_event(),
            Some(TransportEvent::Frame { subscription: SubscriptionId::new(1), payload: b"{}".to_vec() })
        );
        assert!(!broker.has_pending());
    }

    #[tokio::test]
    async fn refused_topic_fails_subscribe() {
        let mut broker = SimBroker::new();
        broker.refuse_topic("/user/queue/message-status");

        let result = broker.subscribe(SubscriptionId::new(1), "/user/queue/message-status").await;
        assert!(result.is_err());
        assert!(broker.subscribed_topics().is_empty());
    }

    #[tokio::test]
    async fn closed_broker_drains_then_ends() {
        let mut broker = SimBroker::new();
        broker.connect();
        broker.close();

        assert_eq!(broker.next_event().await, Some(TransportEvent::Connected));
        assert_eq!(broker.next_event().await, None);
    }
}
