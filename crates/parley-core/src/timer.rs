//! Deadline queue for component-owned timers.
//!
//! Components arm timers with [`Timers::schedule`] and get back a
//! [`TimerId`] they can cancel. The engine feeds time in through
//! [`Timers::expire`]; nothing fires on its own. Dropping or clearing the
//! queue cancels everything it holds, so a component that resets its queue
//! can never be hit by a stale timer.

use std::{collections::BTreeMap, ops::Sub, time::Duration};

/// Handle to an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Armed<I, K> {
    armed_at: I,
    delay: Duration,
    kind: K,
}

/// Cancelable timers keyed by [`TimerId`].
///
/// Generic over the instant type so simulations can drive it with virtual
/// time, and over the payload `K` each timer carries back when it fires.
#[derive(Debug, Clone)]
pub struct Timers<I, K> {
    next_id: u64,
    armed: BTreeMap<TimerId, Armed<I, K>>,
}

impl<I, K> Default for Timers<I, K> {
    fn default() -> Self {
        Self { next_id: 0, armed: BTreeMap::new() }
    }
}

impl<I, K> Timers<I, K>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer that fires once `delay` has elapsed after `now`.
    pub fn schedule(&mut self, now: I, delay: Duration, kind: K) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.armed.insert(id, Armed { armed_at: now, delay, kind });
        id
    }

    /// Disarm a timer. Returns false if it already fired or was canceled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.armed.remove(&id).is_some()
    }

    /// Returns true if the timer is still armed.
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.armed.contains_key(&id)
    }

    /// Remove and return every timer whose delay has fully elapsed at `now`.
    ///
    /// A timer armed at `t` with delay `d` fires at the first `now` with
    /// `now - t >= d`. Fired timers are returned most overdue first, ties in
    /// arming order.
    pub fn expire(&mut self, now: I) -> Vec<(TimerId, K)> {
        let mut due: Vec<(Duration, TimerId)> = self
            .armed
            .iter()
            .filter_map(|(&id, armed)| {
                let elapsed = elapsed(now, armed.armed_at);
                (elapsed >= armed.delay).then(|| (elapsed - armed.delay, id))
            })
            .collect();

        due.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        due.into_iter()
            .filter_map(|(_, id)| self.armed.remove(&id).map(|armed| (id, armed.kind)))
            .collect()
    }

    /// Cancel every timer.
    pub fn clear(&mut self) {
        self.armed.clear();
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    /// Returns true if no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

/// Time between `earlier` and `now`, zero if `now` is not after `earlier`.
fn elapsed<I: Copy + Ord + Sub<Output = Duration>>(now: I, earlier: I) -> Duration {
    if now > earlier { now - earlier } else { Duration::ZERO }
}
