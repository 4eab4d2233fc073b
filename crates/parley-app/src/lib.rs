//! Runtime for the parley sync engine
//!
//! Executes the actions of a [`parley_core::SyncEngine`] against real I/O and
//! feeds the outcomes back as events, so the same engine runs in production
//! and in simulation.
//!
//! # Components
//!
//! - [`Transport`]: broker connection (publish, subscribe, inbound frames)
//! - [`ConversationSource`]: conversation metadata and history lookup
//! - [`Runtime`]: event loop tying engine, transport, source and ticks together
//! - [`SystemEnv`]: production [`parley_core::Environment`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod error;
mod runtime;
mod source;
mod system_env;
mod transport;

pub use config::{DEFAULT_TICK_INTERVAL, RuntimeConfig};
pub use error::RuntimeError;
pub use runtime::Runtime;
pub use source::{ConversationSource, LoadedConversation};
pub use system_env::SystemEnv;
pub use transport::{Transport, TransportEvent};
