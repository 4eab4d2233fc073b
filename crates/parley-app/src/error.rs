//! Runtime errors.

use parley_core::SyncError;
use thiserror::Error;

/// Errors raised while building or running a [`crate::Runtime`].
///
/// Transport and source failures are not listed here: they are reported to
/// the engine as events and surface as notifications.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Runtime configuration is unusable.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),

    /// The engine rejected its configuration.
    #[error(transparent)]
    Sync(#[from] SyncError),
}
