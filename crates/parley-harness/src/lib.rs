//! Deterministic simulation harness for the parley sync engine.
//!
//! Virtual-time implementations of the `Environment`, `Transport`, and
//! `ConversationSource` traits for reproducible testing of reconnects,
//! duplicate deliveries, and timer expiry.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks WHAT must hold after every step, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the ledger
//! and typing invariants, and drive the engine through [`SimSession`] to have
//! them checked after every event.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod invariants;
pub mod sim_broker;
pub mod sim_env;
pub mod sim_session;

pub use invariants::{
    EngineSnapshot, EntrySnapshot, IdentityUniqueness, Invariant, InvariantRegistry,
    InvariantResult, PositionStability, StatusMonotonicity, SystemSnapshot,
    TypingScopedToConversation, Violation,
};
pub use sim_broker::{Published, SimBroker, SimBrokerError};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_session::{EchoMode, SimSession};
