//! Chat synchronization core
//!
//! Keeps one user's view of a single conversation consistent with a remote
//! broker while tolerating reconnects, duplicate deliveries, and out-of-order
//! arrival.
//!
//! # Architecture
//!
//! Sans-IO and action based. [`SyncEngine`] consumes [`SyncEvent`]s (user
//! intents, inbound frames, transport lifecycle, time ticks) and returns
//! [`SyncAction`]s (publish, subscribe, load) for the caller to execute. It
//! never touches the network or the clock directly; time and randomness come
//! from an injected [`Environment`].
//!
//! # Components
//!
//! - [`identity`]: identity keys and the merge rule
//! - [`Ledger`]: ordered, deduplicated messages of the active conversation
//! - [`SendPipeline`]: optimistic outbound messages
//! - [`TypingTracker`]: debounced outgoing typing state, leased incoming state
//! - [`ReadReceiptDispatcher`]: receipts for unread inbound messages
//! - [`SubscriptionLifecycle`]: topic bindings for the active conversation
//! - [`Timers`]: deadline queue backing debounce and liveness timers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod engine;
pub mod env;
mod error;
mod event;
pub mod identity;
mod ledger;
mod lifecycle;
mod message;
mod receipts;
mod send;
#[cfg(test)]
mod test_env;
mod timer;
mod typing;

pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use env::Environment;
pub use error::{LedgerError, SyncError};
pub use event::{Notification, OutboundFrame, PublishPurpose, SyncAction, SyncEvent};
pub use identity::IdentityKey;
pub use ledger::{Ledger, Upsert};
pub use lifecycle::{BindingGeneration, BindingState, SubscriptionId, SubscriptionLifecycle};
pub use message::Message;
pub use parley_proto::{
    ChatRoom, ChatRoomType, ConversationId, CorrelationToken, DeliveryStatus, ServerId, Username,
};
pub use receipts::ReadReceiptDispatcher;
pub use send::SendPipeline;
pub use timer::{TimerId, Timers};
pub use typing::{TypingChange, TypingTracker};
