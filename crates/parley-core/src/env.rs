//! Injected time and randomness.
//!
//! The engine never reads a clock or an entropy source on its own. Everything
//! time-dependent (debounce windows, typing leases, `sentAt` stamps) and every
//! correlation token flows through an [`Environment`], so a simulation can
//! replay a session exactly.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Clock, sleeper and entropy source for one session.
///
/// Implementations must keep `now()` monotonic. `random_bytes()` must be
/// unpredictable outside of simulations: two clients minting colliding
/// correlation tokens would merge each other's optimistic messages.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant. `std::time::Instant` in production, a virtual
    /// instant in simulations.
    type Instant: Copy + Ord + Send + Sync + std::fmt::Debug + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time, used only to stamp optimistic messages.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Resolve after `duration`. Only runtimes call this; the engine is
    /// driven by `Tick` events instead.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes. Deterministic for a given seed in
    /// simulations.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// 128 random bits, the raw material of a correlation token.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}
