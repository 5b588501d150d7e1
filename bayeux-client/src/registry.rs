//! Subscription registry with single-entry-per-channel protection
//!
//! This module tracks every subscription through its lifecycle stages
//! (queued, pending, open). All three collections live behind one lock, and
//! every insertion first removes the channel from all stages, so a channel
//! can never be tracked in two stages at once.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::error::{ClientError, Result};
use crate::subscription::{ChannelCallback, Stage, Subscription, SubscriptionState};

/// Result of applying a successful subscribe acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgment {
    /// Moved from pending to open
    Opened,
    /// Already open, e.g. a second ack for a retried request
    AlreadyOpen,
    /// Not tracked any more; the application unsubscribed in the meantime
    Untracked,
}

#[derive(Default)]
struct RegistryState {
    queued: Vec<Subscription>,
    pending: Vec<Subscription>,
    open: Vec<Subscription>,
    callbacks: HashMap<String, ChannelCallback>,
}

impl RegistryState {
    fn stage_list(&mut self, stage: Stage) -> &mut Vec<Subscription> {
        match stage {
            Stage::Queued => &mut self.queued,
            Stage::Pending => &mut self.pending,
            Stage::Open => &mut self.open,
        }
    }

    fn stage_of(&self, channel: &str) -> Option<Stage> {
        let holds = |list: &[Subscription]| list.iter().any(|s| s.channel() == channel);
        if holds(&self.open) {
            Some(Stage::Open)
        } else if holds(&self.pending) {
            Some(Stage::Pending)
        } else if holds(&self.queued) {
            Some(Stage::Queued)
        } else {
            None
        }
    }

    /// Remove `channel` from whichever stage holds it.
    fn take(&mut self, channel: &str) -> Option<(Stage, Subscription)> {
        for stage in [Stage::Queued, Stage::Pending, Stage::Open] {
            let list = self.stage_list(stage);
            if let Some(index) = list.iter().position(|s| s.channel() == channel) {
                return Some((stage, list.remove(index)));
            }
        }
        None
    }

    /// Move `subscription` to the back of `stage`, out of any other stage.
    fn place(&mut self, subscription: Subscription, stage: Stage) {
        self.take(subscription.channel());
        self.stage_list(stage).push(subscription);
    }
}

/// Thread-safe registry of subscriptions keyed by channel name.
///
/// Stage transitions are atomic: each public method takes the lock once and
/// performs its whole check-and-move under it. The lock never covers I/O;
/// callers send envelopes after the method returns.
#[derive(Default)]
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state.lock().map_err(|_| ClientError::LockPoisoned)
    }

    /// Decide what a subscribe intent does, and record it.
    ///
    /// Already open or pending channels are left alone. Otherwise the
    /// callback (if any) replaces any earlier one for the channel, and the
    /// subscription is queued when there is no `client_id`, or moved to
    /// pending under `client_id` when there is. For
    /// [`SubscriptionState::Subscribing`] the caller must send the request.
    pub fn admit(
        &self,
        mut subscription: Subscription,
        callback: Option<ChannelCallback>,
        client_id: Option<&str>,
    ) -> Result<SubscriptionState> {
        let mut state = self.lock()?;

        match state.stage_of(subscription.channel()) {
            Some(Stage::Open) => return Ok(SubscriptionState::Subscribed),
            Some(Stage::Pending) => return Ok(SubscriptionState::Pending),
            _ => {}
        }

        if let Some(callback) = callback {
            state
                .callbacks
                .insert(subscription.channel().to_string(), callback);
        }

        match client_id {
            Some(client_id) => {
                subscription.set_client_id(client_id);
                state.place(subscription, Stage::Pending);
                Ok(SubscriptionState::Subscribing)
            }
            None => {
                state.place(subscription, Stage::Queued);
                Ok(SubscriptionState::Queued)
            }
        }
    }

    /// Move a subscription into pending under `client_id`.
    pub fn mark_pending(&self, mut subscription: Subscription, client_id: &str) -> Result<()> {
        subscription.set_client_id(client_id);
        self.lock()?.place(subscription, Stage::Pending);
        Ok(())
    }

    /// Apply a successful subscribe acknowledgment for `channel`.
    pub fn acknowledge(&self, channel: &str) -> Result<Acknowledgment> {
        let mut state = self.lock()?;
        match state.stage_of(channel) {
            Some(Stage::Open) => Ok(Acknowledgment::AlreadyOpen),
            Some(Stage::Pending) => {
                if let Some((_, subscription)) = state.take(channel) {
                    state.place(subscription, Stage::Open);
                }
                Ok(Acknowledgment::Opened)
            }
            Some(Stage::Queued) | None => Ok(Acknowledgment::Untracked),
        }
    }

    /// Drop a refused subscription. Returns whether it was pending.
    pub fn reject(&self, channel: &str) -> Result<bool> {
        let mut state = self.lock()?;
        if state.stage_of(channel) != Some(Stage::Pending) {
            return Ok(false);
        }
        state.take(channel);
        state.callbacks.remove(channel);
        Ok(true)
    }

    /// Remove `channel` from the open stage only. Returns whether it was open.
    pub fn close(&self, channel: &str) -> Result<bool> {
        let mut state = self.lock()?;
        if state.stage_of(channel) != Some(Stage::Open) {
            return Ok(false);
        }
        state.take(channel);
        Ok(true)
    }

    /// Forget `channel` entirely, including its callback.
    ///
    /// Returns the stage it was in, or `None` if it was not tracked.
    pub fn remove(&self, channel: &str) -> Result<Option<Stage>> {
        let mut state = self.lock()?;
        state.callbacks.remove(channel);
        Ok(state.take(channel).map(|(stage, _)| stage))
    }

    /// Take every queued subscription, in the order it was queued.
    pub fn drain_queued(&self) -> Result<Vec<Subscription>> {
        Ok(std::mem::take(&mut self.lock()?.queued))
    }

    /// Copy of the pending subscriptions, oldest first.
    pub fn pending(&self) -> Result<Vec<Subscription>> {
        Ok(self.lock()?.pending.clone())
    }

    /// Take every tracked subscription (queued, then open, then pending) and
    /// forget all callbacks.
    pub fn drain_all(&self) -> Result<Vec<Subscription>> {
        let mut state = self.lock()?;
        let RegistryState {
            queued,
            pending,
            open,
            callbacks,
        } = std::mem::take(&mut *state);
        drop(callbacks);

        Ok(queued.into_iter().chain(open).chain(pending).collect())
    }

    /// The stage `channel` is in, if tracked.
    pub fn stage_of(&self, channel: &str) -> Result<Option<Stage>> {
        Ok(self.lock()?.stage_of(channel))
    }

    /// Whether the server has confirmed `channel`.
    pub fn is_open(&self, channel: &str) -> bool {
        self.lock()
            .map(|state| state.stage_of(channel) == Some(Stage::Open))
            .unwrap_or(false)
    }

    /// The callback registered for `channel`.
    pub fn callback(&self, channel: &str) -> Option<ChannelCallback> {
        self.lock().ok()?.callbacks.get(channel).cloned()
    }

    /// Number of tracked subscriptions across all stages.
    pub fn len(&self) -> usize {
        self.lock()
            .map(|state| state.queued.len() + state.pending.len() + state.open.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Channel names per stage, for inspection.
    pub fn snapshot(&self) -> Result<RegistrySnapshot> {
        let state = self.lock()?;
        let names = |list: &[Subscription]| list.iter().map(|s| s.channel().to_string()).collect();
        Ok(RegistrySnapshot {
            queued: names(&state.queued),
            pending: names(&state.pending),
            open: names(&state.open),
        })
    }
}

/// Point-in-time view of the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub queued: Vec<String>,
    pub pending: Vec<String>,
    pub open: Vec<String>,
}

impl RegistrySnapshot {
    /// Total tracked subscriptions
    pub fn total(&self) -> usize {
        self.queued.len() + self.pending.len() + self.open.len()
    }

    /// How many stages list `channel` (0 or 1 while the registry is consistent)
    pub fn occurrences(&self, channel: &str) -> usize {
        [&self.queued, &self.pending, &self.open]
            .iter()
            .flat_map(|list| list.iter())
            .filter(|c| c.as_str() == channel)
            .count()
    }
}

impl fmt::Display for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Subscriptions: {}", self.total())?;
        writeln!(f, "  queued:  {:?}", self.queued)?;
        writeln!(f, "  pending: {:?}", self.pending)?;
        write!(f, "  open:    {:?}", self.open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn noop_callback() -> ChannelCallback {
        Arc::new(|_| {})
    }

    #[test]
    fn test_admit_without_session_queues() {
        let registry = SubscriptionRegistry::new();

        let state = registry.admit("/foo/bar".into(), None, None).unwrap();

        assert_eq!(state, SubscriptionState::Queued);
        assert_eq!(registry.stage_of("/foo/bar").unwrap(), Some(Stage::Queued));
        assert!(!registry.is_open("/foo/bar"));
    }

    #[test]
    fn test_admit_with_session_goes_pending() {
        let registry = SubscriptionRegistry::new();

        let state = registry.admit("/foo/bar".into(), None, Some("abc")).unwrap();

        assert_eq!(state, SubscriptionState::Subscribing);
        let pending = registry.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].client_id(), Some("abc"));
    }

    #[test]
    fn test_admit_is_noop_for_pending_and_open() {
        let registry = SubscriptionRegistry::new();
        registry.admit("/foo/bar".into(), None, Some("abc")).unwrap();

        assert_eq!(
            registry.admit("/foo/bar".into(), None, Some("abc")).unwrap(),
            SubscriptionState::Pending
        );

        registry.acknowledge("/foo/bar").unwrap();
        assert_eq!(
            registry.admit("/foo/bar".into(), None, Some("abc")).unwrap(),
            SubscriptionState::Subscribed
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_queued_twice_is_tracked_once() {
        let registry = SubscriptionRegistry::new();
        registry.admit("/foo/bar".into(), None, None).unwrap();
        registry.admit("/foo/bar".into(), None, None).unwrap();

        assert_eq!(registry.snapshot().unwrap().queued, vec!["/foo/bar"]);
    }

    #[test]
    fn test_callback_last_write_wins() {
        let registry = SubscriptionRegistry::new();
        let first = noop_callback();
        let second = noop_callback();

        registry.admit("/foo/bar".into(), Some(first), None).unwrap();
        registry.admit("/foo/bar".into(), Some(second.clone()), None).unwrap();

        let stored = registry.callback("/foo/bar").unwrap();
        assert!(Arc::ptr_eq(&stored, &second));
    }

    #[test]
    fn test_acknowledge_moves_pending_to_open() {
        let registry = SubscriptionRegistry::new();
        registry.admit("/foo/bar".into(), None, Some("abc")).unwrap();

        assert_eq!(registry.acknowledge("/foo/bar").unwrap(), Acknowledgment::Opened);
        assert!(registry.is_open("/foo/bar"));
        assert!(registry.pending().unwrap().is_empty());

        assert_eq!(
            registry.acknowledge("/foo/bar").unwrap(),
            Acknowledgment::AlreadyOpen
        );
        assert_eq!(
            registry.acknowledge("/not/tracked").unwrap(),
            Acknowledgment::Untracked
        );
        assert!(!registry.is_open("/not/tracked"));
    }

    #[test]
    fn test_reject_drops_pending_and_callback() {
        let registry = SubscriptionRegistry::new();
        registry
            .admit("/foo/bar".into(), Some(noop_callback()), Some("abc"))
            .unwrap();

        assert!(registry.reject("/foo/bar").unwrap());
        assert!(registry.is_empty());
        assert!(registry.callback("/foo/bar").is_none());
        assert!(!registry.reject("/foo/bar").unwrap());
    }

    #[test]
    fn test_close_only_touches_open() {
        let registry = SubscriptionRegistry::new();
        registry.admit("/foo/bar".into(), None, Some("abc")).unwrap();

        assert!(!registry.close("/foo/bar").unwrap());
        assert_eq!(registry.stage_of("/foo/bar").unwrap(), Some(Stage::Pending));

        registry.acknowledge("/foo/bar").unwrap();
        assert!(registry.close("/foo/bar").unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_from_any_stage() {
        let registry = SubscriptionRegistry::new();
        registry.admit("/a".into(), Some(noop_callback()), None).unwrap();
        registry.admit("/b".into(), None, Some("abc")).unwrap();
        registry.admit("/c".into(), None, Some("abc")).unwrap();
        registry.acknowledge("/c").unwrap();

        assert_eq!(registry.remove("/a").unwrap(), Some(Stage::Queued));
        assert_eq!(registry.remove("/b").unwrap(), Some(Stage::Pending));
        assert_eq!(registry.remove("/c").unwrap(), Some(Stage::Open));
        assert_eq!(registry.remove("/c").unwrap(), None);
        assert!(registry.callback("/a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drain_queued_preserves_order() {
        let registry = SubscriptionRegistry::new();
        for channel in ["/one", "/two", "/three"] {
            registry.admit(channel.into(), None, None).unwrap();
        }

        let drained: Vec<_> = registry
            .drain_queued()
            .unwrap()
            .iter()
            .map(|s| s.channel().to_string())
            .collect();

        assert_eq!(drained, vec!["/one", "/two", "/three"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mark_pending_requeues_at_back() {
        let registry = SubscriptionRegistry::new();
        registry.admit("/one".into(), None, Some("abc")).unwrap();
        registry.admit("/two".into(), None, Some("abc")).unwrap();

        registry.mark_pending("/one".into(), "def").unwrap();

        let pending = registry.pending().unwrap();
        assert_eq!(pending[0].channel(), "/two");
        assert_eq!(pending[1].channel(), "/one");
        assert_eq!(pending[1].client_id(), Some("def"));
    }

    #[test]
    fn test_drain_all_clears_everything() {
        let registry = SubscriptionRegistry::new();
        registry.admit("/queued".into(), Some(noop_callback()), None).unwrap();
        registry.admit("/pending".into(), None, Some("abc")).unwrap();
        registry.admit("/open".into(), None, Some("abc")).unwrap();
        registry.acknowledge("/open").unwrap();

        let drained: Vec<_> = registry
            .drain_all()
            .unwrap()
            .iter()
            .map(|s| s.channel().to_string())
            .collect();

        assert_eq!(drained, vec!["/queued", "/open", "/pending"]);
        assert!(registry.is_empty());
        assert!(registry.callback("/queued").is_none());
    }

    #[test]
    fn test_snapshot_display() {
        let registry = SubscriptionRegistry::new();
        registry.admit("/foo/bar".into(), None, None).unwrap();

        let snapshot = registry.snapshot().unwrap();
        assert_eq!(snapshot.total(), 1);
        assert_eq!(snapshot.occurrences("/foo/bar"), 1);
        assert!(snapshot.to_string().contains("/foo/bar"));
    }

    #[test]
    fn test_concurrent_admit_tracks_once() {
        let registry = Arc::new(SubscriptionRegistry::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.admit("/foo/bar".into(), None, Some("abc")))
            })
            .collect();

        let states: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        assert_eq!(
            states
                .iter()
                .filter(|s| **s == SubscriptionState::Subscribing)
                .count(),
            1
        );
        assert_eq!(registry.len(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Admit(usize, bool),
        Acknowledge(usize),
        Reject(usize),
        Close(usize),
        Remove(usize),
        DrainQueued,
        Requeue(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize, any::<bool>()).prop_map(|(c, s)| Op::Admit(c, s)),
            (0..4usize).prop_map(Op::Acknowledge),
            (0..4usize).prop_map(Op::Reject),
            (0..4usize).prop_map(Op::Close),
            (0..4usize).prop_map(Op::Remove),
            Just(Op::DrainQueued),
            (0..4usize).prop_map(Op::Requeue),
        ]
    }

    proptest! {
        #[test]
        fn prop_channel_tracked_at_most_once(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let channels = ["/a", "/b", "/c", "/d"];
            let registry = SubscriptionRegistry::new();

            for op in ops {
                match op {
                    Op::Admit(c, session) => {
                        let client_id = if session { Some("abc") } else { None };
                        registry.admit(channels[c].into(), None, client_id).unwrap();
                    }
                    Op::Acknowledge(c) => { registry.acknowledge(channels[c]).unwrap(); }
                    Op::Reject(c) => { registry.reject(channels[c]).unwrap(); }
                    Op::Close(c) => { registry.close(channels[c]).unwrap(); }
                    Op::Remove(c) => { registry.remove(channels[c]).unwrap(); }
                    Op::DrainQueued => {
                        for sub in registry.drain_queued().unwrap() {
                            registry.mark_pending(sub, "abc").unwrap();
                        }
                    }
                    Op::Requeue(c) => { registry.mark_pending(channels[c].into(), "abc").unwrap(); }
                }

                let snapshot = registry.snapshot().unwrap();
                for channel in channels {
                    prop_assert!(snapshot.occurrences(channel) <= 1);
                }
            }
        }
    }
}
