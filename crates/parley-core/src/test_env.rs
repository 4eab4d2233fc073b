//! Deterministic environment for unit tests.

use std::{
    ops::Sub,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};

use crate::Environment;

/// Wall-clock origin of the virtual clock (2024-01-01T00:00:00Z).
const EPOCH_MILLIS: i64 = 1_704_067_200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TestInstant(Duration);

impl TestInstant {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

impl Sub for TestInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Manual clock plus counter-based randomness.
#[derive(Clone, Default)]
pub struct TestEnv {
    millis: Arc<AtomicU64>,
    counter: Arc<AtomicU64>,
}

impl TestEnv {
    pub fn advance(&self, duration: Duration) {
        self.millis.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Environment for TestEnv {
    type Instant = TestInstant;

    fn now(&self) -> TestInstant {
        TestInstant::from_millis(self.millis.load(Ordering::SeqCst))
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let offset = self.millis.load(Ordering::SeqCst) as i64;
        DateTime::from_timestamp_millis(EPOCH_MILLIS + offset).unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let value = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let bytes = value.to_be_bytes();
        let padding = buffer.len().saturating_sub(8);
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = if i < padding { 0 } else { bytes[i % 8] };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_bytes_fill_wide_buffers_and_never_repeat() {
        let env = TestEnv::default();
        let mut first = [0xffu8; 16];
        let mut second = [0xffu8; 16];
        env.random_bytes(&mut first);
        env.random_bytes(&mut second);

        assert_eq!(first[..8], [0u8; 8]);
        assert_ne!(first, second);
        assert_ne!(env.random_u128(), env.random_u128());
    }
}
