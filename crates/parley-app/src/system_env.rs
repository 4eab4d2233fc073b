//! Real clock and OS entropy.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parley_core::Environment;

/// [`Environment`] backed by the system.
///
/// Monotonic time from [`Instant`], wall-clock time from `chrono`, sleeps on
/// the tokio timer, and correlation-token entropy from `getrandom`.
///
/// # Panics
///
/// `random_bytes` panics if the OS entropy source fails. Without it tokens
/// could collide across clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// The system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[allow(clippy::disallowed_methods)]
    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS entropy source available");
    }
}
