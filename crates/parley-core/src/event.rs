//! Engine events and actions.

use parley_proto::{ChatRoom, ConversationId, CorrelationToken, MessagePayload, ServerId, Username};

use crate::{BindingGeneration, BindingState, SubscriptionId, SyncError};

/// Events the caller feeds into the engine.
///
/// The caller is responsible for:
/// - Forwarding broker frames and transport lifecycle changes
/// - Executing [`SyncAction`]s and reporting their outcome back
/// - Forwarding user intents (select conversation, compose, send)
/// - Driving time forward via ticks
///
/// Generic over `I` (Instant type) so simulations can drive a virtual clock.
#[derive(Debug, Clone)]
pub enum SyncEvent<I = std::time::Instant> {
    /// An authenticated profile is available.
    ProfileLoaded {
        /// Local user's stable identifier.
        username: Username,
    },

    /// The user logged out.
    ProfileCleared,

    /// Broker connection established (or re-established).
    Connected,

    /// Broker connection lost. Every subscription is gone.
    Disconnected,

    /// User selected a conversation.
    SelectConversation {
        /// Conversation to bind to.
        conversation_id: ConversationId,
    },

    /// User left the conversation view.
    CloseConversation,

    /// Session is shutting down.
    Teardown,

    /// Answer to [`SyncAction::LoadConversation`].
    ConversationLoaded {
        /// Conversation that was loaded.
        conversation_id: ConversationId,
        /// Generation the load was requested for.
        generation: BindingGeneration,
        /// Conversation metadata.
        room: ChatRoom,
        /// Message history, oldest first.
        messages: Vec<MessagePayload>,
    },

    /// A [`SyncAction::LoadConversation`] failed.
    ConversationLoadFailed {
        /// Conversation that failed to load.
        conversation_id: ConversationId,
        /// Generation the load was requested for.
        generation: BindingGeneration,
        /// Diagnostic.
        reason: String,
    },

    /// Broker acknowledged a [`SyncAction::Subscribe`].
    Subscribed {
        /// Subscription that is now live.
        subscription: SubscriptionId,
    },

    /// A [`SyncAction::Subscribe`] failed.
    SubscribeFailed {
        /// Subscription that failed.
        subscription: SubscriptionId,
        /// Diagnostic.
        reason: String,
    },

    /// A [`SyncAction::Unsubscribe`] failed. Logged only.
    UnsubscribeFailed {
        /// Subscription that could not be released.
        subscription: SubscriptionId,
        /// Diagnostic.
        reason: String,
    },

    /// Frame delivered on a subscription.
    FrameReceived {
        /// Subscription the frame arrived on.
        subscription: SubscriptionId,
        /// Raw payload bytes.
        payload: Vec<u8>,
    },

    /// A [`SyncAction::Publish`] failed.
    PublishFailed {
        /// What the failed frame carried.
        purpose: PublishPurpose,
        /// Diagnostic.
        reason: String,
    },

    /// User submitted a message.
    SendMessage {
        /// Message text.
        text: String,
    },

    /// User asked to resend a failed message.
    RetrySend {
        /// Token of the failed message.
        token: CorrelationToken,
    },

    /// Compose input changed.
    ComposeChanged {
        /// Full current input text.
        text: String,
    },

    /// Time tick for debounce and liveness processing.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// What an outbound frame carries, so publish failures can be attributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishPurpose {
    /// A chat message.
    Message {
        /// Correlation token of the message.
        token: CorrelationToken,
    },
    /// A typing transition.
    Typing {
        /// Announced state.
        is_typing: bool,
    },
    /// A read receipt.
    ReadReceipt {
        /// Message being acknowledged.
        server_id: ServerId,
    },
}

/// Encoded frame to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Logical destination.
    pub destination: String,
    /// JSON payload.
    pub payload: Vec<u8>,
    /// What the payload carries.
    pub purpose: PublishPurpose,
}

/// Observable changes for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Ledger contents changed. Re-read [`crate::SyncEngine::ledger`].
    LedgerChanged {
        /// Conversation whose ledger changed.
        conversation_id: ConversationId,
    },

    /// A remote user started or stopped typing.
    TypingChanged {
        /// User whose state changed.
        username: Username,
        /// New state.
        is_typing: bool,
    },

    /// A message could not be sent and awaits retry.
    SendFailed {
        /// Token of the failed message.
        token: CorrelationToken,
        /// Diagnostic.
        reason: String,
    },

    /// A message arrived for a conversation other than the active one.
    ConversationActivity {
        /// Conversation that received the message.
        conversation_id: ConversationId,
    },

    /// Binding state of the active conversation changed.
    BindingChanged {
        /// Conversation the binding belongs to, if any.
        conversation_id: Option<ConversationId>,
        /// New state.
        state: BindingState,
    },

    /// Non-fatal error the user may want to see.
    Error(SyncError),
}

/// Actions the engine produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Publish a frame to the broker.
    Publish(OutboundFrame),

    /// Subscribe to a topic.
    ///
    /// The caller reports the outcome with [`SyncEvent::Subscribed`] or
    /// [`SyncEvent::SubscribeFailed`] and tags every frame from this topic
    /// with `subscription`.
    Subscribe {
        /// Engine-assigned subscription handle.
        subscription: SubscriptionId,
        /// Topic to subscribe to.
        topic: String,
    },

    /// Release a subscription.
    Unsubscribe {
        /// Subscription to release.
        subscription: SubscriptionId,
    },

    /// Fetch conversation metadata and history.
    ///
    /// The caller answers with [`SyncEvent::ConversationLoaded`] or
    /// [`SyncEvent::ConversationLoadFailed`], echoing `generation`.
    LoadConversation {
        /// Conversation to load.
        conversation_id: ConversationId,
        /// Binding generation the result belongs to.
        generation: BindingGeneration,
    },

    /// Inform the presentation layer.
    Notify(Notification),
}
