//! Typing presence.
//!
//! Two independent halves share one timer queue:
//!
//! - Outbound: compose edits are debounced; once the input has been quiet for
//!   the debounce window the tracker decides whether the user is typing
//!   (non-blank text) and announces only transitions. Broadcast volume is
//!   bounded by the number of transitions, not keystrokes.
//! - Inbound: a remote `typing: true` signal is a lease. It stays set while
//!   refreshed and clears itself once the liveness window passes without a
//!   refresh, which covers lost or never-sent stop signals.
//!
//! All state is scoped to one conversation. [`TypingTracker::bind`] and
//! [`TypingTracker::reset`] clear the queue, so no timer armed for a previous
//! conversation can fire after a switch.

use std::{collections::BTreeMap, ops::Sub, time::Duration};

use parley_proto::{ConversationId, TypingPayload, Username};

use crate::{TimerId, Timers};

#[derive(Debug, Clone, PartialEq, Eq)]
enum TypingTimer {
    Debounce,
    Lease(Username),
}

/// Typing state change for the engine to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingChange {
    /// The local user's typing state flipped and must be published.
    Announce {
        /// New local typing state.
        is_typing: bool,
    },
    /// A remote user started typing.
    RemoteStarted {
        /// User now typing.
        username: Username,
    },
    /// A remote user stopped typing, explicitly or by lease expiry.
    RemoteStopped {
        /// User no longer typing.
        username: Username,
    },
}

/// Debounced local typing state and leased remote typing state.
#[derive(Debug, Clone)]
pub struct TypingTracker<I> {
    debounce: Duration,
    liveness: Duration,
    conversation_id: Option<ConversationId>,
    timers: Timers<I, TypingTimer>,
    /// Latest compose text awaiting its debounce timer.
    draft: Option<(TimerId, String)>,
    /// Last typing state announced for this conversation.
    announced: bool,
    remote: BTreeMap<Username, TimerId>,
}

impl<I> TypingTracker<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create an unbound tracker.
    pub fn new(debounce: Duration, liveness: Duration) -> Self {
        Self {
            debounce,
            liveness,
            conversation_id: None,
            timers: Timers::new(),
            draft: None,
            announced: false,
            remote: BTreeMap::new(),
        }
    }

    /// Scope the tracker to `conversation_id`, discarding all prior state.
    ///
    /// The first non-blank input afterwards always announces `typing: true`.
    pub fn bind(&mut self, conversation_id: impl Into<ConversationId>) {
        self.reset();
        self.conversation_id = Some(conversation_id.into());
    }

    /// Unbind and cancel every pending timer.
    pub fn reset(&mut self) {
        self.timers.clear();
        self.draft = None;
        self.announced = false;
        self.remote.clear();
        self.conversation_id = None;
    }

    /// Conversation the tracker is scoped to.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Record a compose edit and restart the debounce window.
    ///
    /// Returns false (and ignores the edit) if the tracker is unbound.
    pub fn compose_changed(&mut self, now: I, text: &str) -> bool {
        if self.conversation_id.is_none() {
            return false;
        }

        if let Some((timer, _)) = self.draft.take() {
            self.timers.cancel(timer);
        }

        let timer = self.timers.schedule(now, self.debounce, TypingTimer::Debounce);
        self.draft = Some((timer, text.to_owned()));
        true
    }

    /// Apply a typing signal received from the conversation topic.
    ///
    /// Signals for another conversation or from `local_user` are ignored.
    pub fn remote_signal(
        &mut self,
        now: I,
        signal: &TypingPayload,
        local_user: Option<&str>,
    ) -> Option<TypingChange> {
        if self.conversation_id.as_deref() != Some(signal.conversation_id.as_str()) {
            tracing::debug!(
                conversation = %signal.conversation_id,
                "ignoring typing signal for inactive conversation"
            );
            return None;
        }

        if local_user == Some(signal.username.as_str()) {
            return None;
        }

        let previous = self.remote.remove(&signal.username);
        if let Some(timer) = previous {
            self.timers.cancel(timer);
        }

        if signal.is_typing {
            let lease = self.timers.schedule(
                now,
                self.liveness,
                TypingTimer::Lease(signal.username.clone()),
            );
            self.remote.insert(signal.username.clone(), lease);

            previous
                .is_none()
                .then(|| TypingChange::RemoteStarted { username: signal.username.clone() })
        } else {
            previous.map(|_| TypingChange::RemoteStopped { username: signal.username.clone() })
        }
    }

    /// Fire due timers and return the resulting changes.
    pub fn expire(&mut self, now: I) -> Vec<TypingChange> {
        let mut changes = Vec::new();

        for (timer, kind) in self.timers.expire(now) {
            match kind {
                TypingTimer::Debounce => {
                    let Some((pending, text)) = self.draft.take() else { continue };
                    if pending != timer {
                        self.draft = Some((pending, text));
                        continue;
                    }

                    let is_typing = !text.trim().is_empty();
                    if is_typing != self.announced {
                        self.announced = is_typing;
                        changes.push(TypingChange::Announce { is_typing });
                    }
                },
                TypingTimer::Lease(username) => {
                    if self.remote.get(&username) == Some(&timer) {
                        self.remote.remove(&username);
                        changes.push(TypingChange::RemoteStopped { username });
                    }
                },
            }
        }

        changes
    }

    /// Forget the last announced state, so the next settled edit announces
    /// whatever it finds.
    ///
    /// Used when peers may not have received the last announcement: after a
    /// reconnect, or when publishing it failed.
    pub fn forget_announced(&mut self) {
        self.announced = false;
    }

    /// Last typing state announced for the bound conversation.
    pub fn is_announcing(&self) -> bool {
        self.announced
    }

    /// Remote users currently typing, in name order.
    pub fn typing_users(&self) -> impl Iterator<Item = &str> {
        self.remote.keys().map(String::as_str)
    }

    /// Returns true if `username` currently holds a typing lease.
    pub fn is_typing(&self, username: &str) -> bool {
        self.remote.contains_key(username)
    }

    /// Number of armed debounce and lease timers.
    pub fn armed_timers(&self) -> usize {
        self.timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env::TestInstant;

    const DEBOUNCE: Duration = Duration::from_millis(200);
    const LIVENESS: Duration = Duration::from_millis(2500);

    fn at(ms: u64) -> TestInstant {
        TestInstant::from_millis(ms)
    }

    fn tracker() -> TypingTracker<TestInstant> {
        let mut tracker = TypingTracker::new(DEBOUNCE, LIVENESS);
        tracker.bind("c1");
        tracker
    }

    fn signal(username: &str, is_typing: bool) -> TypingPayload {
        TypingPayload { conversation_id: "c1".into(), username: username.into(), is_typing }
    }

    #[test]
    fn burst_of_edits_announces_once() {
        let mut tracker = tracker();
        for (i, text) in ["o", "oi", "oi ", "oi t"].iter().enumerate() {
            tracker.compose_changed(at(i as u64 * 50), text);
        }

        assert!(tracker.expire(at(349)).is_empty());
        assert_eq!(tracker.expire(at(350)), vec![TypingChange::Announce { is_typing: true }]);
    }

    #[test]
    fn no_announcement_without_transition() {
        let mut tracker = tracker();
        tracker.compose_changed(at(0), "a");
        assert_eq!(tracker.expire(at(200)).len(), 1);

        tracker.compose_changed(at(1_000), "ab");
        assert!(tracker.expire(at(1_200)).is_empty());

        tracker.compose_changed(at(2_000), "   ");
        assert_eq!(tracker.expire(at(2_200)), vec![TypingChange::Announce { is_typing: false }]);
    }

    #[test]
    fn blank_input_from_idle_announces_nothing() {
        let mut tracker = tracker();
        tracker.compose_changed(at(0), "  ");
        assert!(tracker.expire(at(500)).is_empty());
        assert!(!tracker.is_announcing());
    }

    #[test]
    fn rebinding_resets_transition_memory() {
        let mut tracker = tracker();
        tracker.compose_changed(at(0), "a");
        tracker.expire(at(200));
        assert!(tracker.is_announcing());

        tracker.bind("c2");
        tracker.compose_changed(at(300), "a");
        assert_eq!(tracker.expire(at(500)), vec![TypingChange::Announce { is_typing: true }]);
    }

    #[test]
    fn unbound_tracker_ignores_input() {
        let mut tracker: TypingTracker<TestInstant> = TypingTracker::new(DEBOUNCE, LIVENESS);
        assert!(!tracker.compose_changed(at(0), "a"));
        assert_eq!(tracker.armed_timers(), 0);
    }

    #[test]
    fn remote_lease_expires_exactly_after_liveness() {
        let mut tracker = tracker();
        let change = tracker.remote_signal(at(0), &signal("bia", true), Some("ana"));
        assert_eq!(change, Some(TypingChange::RemoteStarted { username: "bia".into() }));

        assert!(tracker.expire(at(2_499)).is_empty());
        assert!(tracker.is_typing("bia"));
        assert_eq!(
            tracker.expire(at(2_500)),
            vec![TypingChange::RemoteStopped { username: "bia".into() }]
        );
        assert!(!tracker.is_typing("bia"));
    }

    #[test]
    fn refresh_extends_lease() {
        let mut tracker = tracker();
        tracker.remote_signal(at(0), &signal("bia", true), None);
        assert_eq!(tracker.remote_signal(at(2_000), &signal("bia", true), None), None);

        assert!(tracker.expire(at(2_500)).is_empty());
        assert_eq!(tracker.expire(at(4_500)).len(), 1);
    }

    #[test]
    fn explicit_stop_clears_and_cancels() {
        let mut tracker = tracker();
        tracker.remote_signal(at(0), &signal("bia", true), None);

        let change = tracker.remote_signal(at(100), &signal("bia", false), None);
        assert_eq!(change, Some(TypingChange::RemoteStopped { username: "bia".into() }));
        assert_eq!(tracker.armed_timers(), 0);
        assert!(tracker.expire(at(10_000)).is_empty());
    }

    #[test]
    fn stop_for_idle_user_is_silent() {
        let mut tracker = tracker();
        assert_eq!(tracker.remote_signal(at(0), &signal("bia", false), None), None);
    }

    #[test]
    fn own_and_foreign_signals_ignored() {
        let mut tracker = tracker();
        assert_eq!(tracker.remote_signal(at(0), &signal("ana", true), Some("ana")), None);

        let foreign =
            TypingPayload { conversation_id: "c9".into(), username: "bia".into(), is_typing: true };
        assert_eq!(tracker.remote_signal(at(0), &foreign, Some("ana")), None);
        assert_eq!(tracker.typing_users().count(), 0);
    }

    #[test]
    fn reset_cancels_pending_leases() {
        let mut tracker = tracker();
        tracker.remote_signal(at(0), &signal("bia", true), None);
        tracker.compose_changed(at(0), "a");

        tracker.reset();
        assert_eq!(tracker.armed_timers(), 0);
        assert!(tracker.expire(at(10_000)).is_empty());
    }

    #[test]
    fn forgotten_announcement_is_repeated() {
        let mut tracker = tracker();
        tracker.compose_changed(at(0), "oi");
        assert_eq!(tracker.expire(at(200)).len(), 1);

        tracker.forget_announced();
        tracker.compose_changed(at(1_000), "oi b");
        assert_eq!(tracker.expire(at(1_200)), vec![TypingChange::Announce { is_typing: true }]);
    }
}
