//! Runtime configuration.

use std::time::Duration;

use crate::RuntimeError;

/// Default interval between engine ticks (100ms).
///
/// Bounds how late a debounce or liveness timer can fire.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Interval between [`parley_core::SyncEvent::Tick`]s.
    pub tick_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { tick_interval: DEFAULT_TICK_INTERVAL }
    }
}

impl RuntimeConfig {
    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::InvalidConfig` if `tick_interval` is zero
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.tick_interval.is_zero() {
            return Err(RuntimeError::InvalidConfig("tick_interval must be non-zero".into()));
        }
        Ok(())
    }
}
