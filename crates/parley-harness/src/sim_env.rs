//! Virtual-time environment.
//!
//! `SimEnv` implements [`Environment`] with a manually advanced clock and a
//! seeded ChaCha RNG. Two runs with the same seed and the same event sequence
//! produce identical correlation tokens and identical timer behavior.

use std::{
    ops::Sub,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use parley_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall-clock origin of the virtual clock (2024-01-01T00:00:00Z).
const EPOCH_MILLIS: i64 = 1_704_067_200_000;

/// Instant on the virtual clock, measured from simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Instant `millis` milliseconds after simulation start.
    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Time since simulation start.
    pub fn elapsed_since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Deterministic environment with virtual time and a seeded RNG.
///
/// Clones share the clock and the RNG stream.
#[derive(Clone)]
pub struct SimEnv {
    clock: Arc<AtomicU64>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl SimEnv {
    /// Create an environment at time zero whose RNG is seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(AtomicU64::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        self.clock.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Milliseconds since simulation start.
    pub fn elapsed_millis(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant::from_millis(self.elapsed_millis())
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let millis = EPOCH_MILLIS + self.elapsed_millis() as i64;
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }

    /// Yields once, then advances the virtual clock by `duration`.
    ///
    /// A sleep that loses a `select!` race before its first resumption leaves
    /// the clock untouched.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let env = self.clone();
        async move {
            tokio::task::yield_now().await;
            env.advance(duration);
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
