//! Memoized display session for one on-screen report.
//!
//! Decisions are made only on explicit events: a key change, an explicit
//! refresh, or a due re-check. Rendering returns the memoized decision and
//! never touches the store; the render counter is kept apart from every
//! decision input.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use screencache_core::{CacheKey, Clock};
use screencache_storage::{SharedStore, StalenessAwareSharedCache};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::policy::{decide, DisplayDecision, DisplayPolicy};
use crate::recheck::{RecheckFired, RecheckTimer};

pub struct DisplaySession<S, C> {
    cache: Arc<StalenessAwareSharedCache<S, C>>,
    policy: DisplayPolicy,
    events: UnboundedSender<RecheckFired>,
    key: Option<CacheKey>,
    decision: Option<DisplayDecision>,
    generation: u64,
    pending: Option<RecheckTimer>,
    decisions: u64,
    renders: AtomicU64,
}

impl<S, C> DisplaySession<S, C>
where
    S: SharedStore,
    C: Clock,
{
    /// Create a session. Due re-checks are delivered on `events`; feed them
    /// back through [`on_recheck`](Self::on_recheck).
    pub fn new(
        cache: Arc<StalenessAwareSharedCache<S, C>>,
        policy: DisplayPolicy,
        events: UnboundedSender<RecheckFired>,
    ) -> Self {
        Self {
            cache,
            policy,
            events,
            key: None,
            decision: None,
            generation: 0,
            pending: None,
            decisions: 0,
            renders: AtomicU64::new(0),
        }
    }

    /// Point the session at `key`. Re-decides only when the key changed.
    pub fn set_key(&mut self, key: CacheKey) -> &DisplayDecision {
        if self.key.as_ref() != Some(&key) || self.decision.is_none() {
            self.key = Some(key.clone());
            return self.run(key, true);
        }
        self.decision.get_or_insert(DisplayDecision::Empty)
    }

    /// Explicit refresh tick. Starts a new read transaction for the current key.
    pub fn refresh(&mut self) -> Option<&DisplayDecision> {
        let key = self.key.clone()?;
        Some(self.run(key, true))
    }

    /// Handle a due re-check. Events from an earlier transaction or another
    /// key are ignored and return `None`.
    pub fn on_recheck(&mut self, fired: &RecheckFired) -> Option<&DisplayDecision> {
        if fired.generation != self.generation || self.key.as_ref() != Some(&fired.key) {
            debug!(
                key = %fired.key,
                generation = fired.generation,
                current = self.generation,
                "ignoring outdated re-check"
            );
            return None;
        }
        self.pending = None;
        Some(self.run(fired.key.clone(), false))
    }

    /// Memoized decision, if one has been made.
    pub fn current(&self) -> Option<&DisplayDecision> {
        self.decision.as_ref()
    }

    /// What a render pass should draw. Performs no IO.
    pub fn render(&self) -> Option<&DisplayDecision> {
        self.renders.fetch_add(1, Ordering::Relaxed);
        self.decision.as_ref()
    }

    pub fn key(&self) -> Option<&CacheKey> {
        self.key.as_ref()
    }

    pub fn has_pending_recheck(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of decisions made so far.
    pub fn decision_count(&self) -> u64 {
        self.decisions
    }

    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    fn run(&mut self, key: CacheKey, allow_recheck: bool) -> &DisplayDecision {
        // Replacing the timer cancels whatever the previous transaction scheduled.
        self.pending = None;
        self.generation += 1;
        self.decisions += 1;

        let mut decision = decide(&*self.cache, &key, self.cache.now(), &self.policy);

        match decision.recheck_after() {
            Some(delay) if allow_recheck => {
                let fired = RecheckFired {
                    key: key.clone(),
                    generation: self.generation,
                };
                self.pending = RecheckTimer::schedule(delay, fired, self.events.clone());
                if self.pending.is_none() {
                    decision = decision.without_recheck();
                }
            }
            Some(_) => decision = decision.without_recheck(),
            None => {}
        }

        debug!(
            key = %key,
            decision = decision.kind(),
            generation = self.generation,
            recheck_pending = self.pending.is_some(),
            "display decision"
        );

        self.decision.insert(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::policy::Treatment;
    use screencache_core::{StoreError, UsageRecord};
    use screencache_storage::MemorySharedStore;
    use screencache_test_utils::{app_list_payload, instagram_payload, key, t0, ManualClock};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    /// Memory store that counts reads.
    #[derive(Clone, Default)]
    struct CountingStore {
        inner: MemorySharedStore,
        reads: Arc<AtomicUsize>,
    }

    impl SharedStore for CountingStore {
        fn backend(&self) -> &'static str {
            "counting"
        }

        fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(slot)
        }

        fn put_all(&self, writes: &[(&str, &[u8])]) -> Result<(), StoreError> {
            self.inner.put_all(writes)
        }

        fn remove_all(&self, slots: &[&str]) -> Result<u64, StoreError> {
            self.inner.remove_all(slots)
        }

        fn remove_all_where(
            &self,
            slots: &[&str],
            guarded: &str,
            predicate: &dyn Fn(&[u8]) -> bool,
        ) -> Result<u64, StoreError> {
            self.inner.remove_all_where(slots, guarded, predicate)
        }
    }

    type Cache = StalenessAwareSharedCache<CountingStore, ManualClock>;

    struct Harness {
        cache: Arc<Cache>,
        clock: ManualClock,
        session: DisplaySession<CountingStore, ManualClock>,
        rx: UnboundedReceiver<RecheckFired>,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(t0());
        let cache = Arc::new(StalenessAwareSharedCache::with_clock(
            CountingStore::default(),
            clock.clone(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let session = DisplaySession::new(Arc::clone(&cache), DisplayPolicy::default(), tx);
        Harness {
            cache,
            clock,
            session,
            rx,
        }
    }

    fn reads(h: &Harness) -> usize {
        h.cache.store().reads.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_decision_schedules_nothing() {
        let mut h = harness();
        let k = key("sel-A", "daily");
        h.cache.write(&k, instagram_payload());

        let decision = h.session.set_key(k);
        assert_eq!(decision.treatment(), Treatment::Normal);
        assert!(!h.session.has_pending_recheck());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_and_renders_do_not_re_decide() {
        let mut h = harness();
        let k = key("sel-A", "daily");
        h.cache.write(&k, instagram_payload());

        h.session.set_key(k.clone());
        let after_first = reads(&h);
        h.session.set_key(k);
        for _ in 0..50 {
            assert!(h.session.render().is_some());
        }

        assert_eq!(h.session.decision_count(), 1);
        assert_eq!(h.session.render_count(), 50);
        assert_eq!(reads(&h), after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_rechecks_once_and_picks_up_new_write() {
        let mut h = harness();
        let k = key("sel-A", "daily");
        h.cache.write(&k, instagram_payload());
        h.clock.advance_secs(31);

        let decision = h.session.set_key(k.clone());
        assert_eq!(decision.treatment(), Treatment::Refreshing);
        assert!(h.session.has_pending_recheck());

        h.cache.write(&k, vec![UsageRecord::new("Instagram", 3700.0)]);
        let fired = h.rx.recv().await.expect("re-check should fire");
        assert_eq!(fired.key, k);

        let decision = h.session.on_recheck(&fired).expect("current re-check");
        assert_eq!(decision.treatment(), Treatment::Normal);
        assert_eq!(decision.entry().unwrap().payload()[0].measure, 3700.0);
        assert_eq!(h.session.decision_count(), 2);
        assert!(!h.session.has_pending_recheck());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recheck_that_is_still_stale_does_not_reschedule() {
        let mut h = harness();
        let k = key("sel-A", "daily");
        h.cache.write(&k, instagram_payload());
        h.clock.advance_secs(31);

        h.session.set_key(k);
        let fired = h.rx.recv().await.expect("re-check should fire");
        let decision = h.session.on_recheck(&fired).expect("current re-check");
        assert_eq!(decision.treatment(), Treatment::Outdated);
        assert_eq!(decision.recheck_after(), None);
        assert!(!h.session.has_pending_recheck());

        let next = tokio::time::timeout(Duration::from_secs(60), h.rx.recv()).await;
        assert!(next.is_err(), "no second re-check may be scheduled");
    }

    #[tokio::test(start_paused = true)]
    async fn test_outdated_generation_is_ignored() {
        let mut h = harness();
        let k = key("sel-A", "daily");
        h.cache.write(&k, instagram_payload());
        h.session.set_key(k.clone());

        let outdated = RecheckFired { key: k, generation: 0 };
        assert!(h.session.on_recheck(&outdated).is_none());

        let other_key = RecheckFired {
            key: key("sel-B", "daily"),
            generation: 1,
        };
        assert!(h.session.on_recheck(&other_key).is_none());
        assert_eq!(h.session.decision_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_change_cancels_pending_recheck() {
        let mut h = harness();
        let stale = key("sel-A", "daily");
        h.cache.write(&stale, instagram_payload());
        h.clock.advance_secs(31);
        h.session.set_key(stale);
        assert!(h.session.has_pending_recheck());

        let decision = h.session.set_key(key("sel-B", "daily"));
        assert_eq!(decision.treatment(), Treatment::Placeholder);
        assert!(!h.session.has_pending_recheck());

        let next = tokio::time::timeout(Duration::from_secs(60), h.rx.recv()).await;
        assert!(next.is_err(), "cancelled re-check must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_timer() {
        let mut h = harness();
        let k = key("sel-A", "daily");
        h.cache.write(&k, instagram_payload());
        h.clock.advance_secs(31);
        h.session.set_key(k);

        let Harness { session, mut rx, .. } = h;
        drop(session);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_then_refresh_sees_producer_write() {
        let mut h = harness();
        let k = key("sel-A", "daily");
        assert_eq!(h.session.set_key(k.clone()), &DisplayDecision::Empty);

        h.cache.write(&key("other", "daily"), app_list_payload());
        let decision = h.session.refresh().expect("key is set");
        assert_eq!(decision.treatment(), Treatment::Placeholder);

        h.cache.write(&k, app_list_payload());
        let decision = h.session.refresh().expect("key is set");
        assert_eq!(decision.treatment(), Treatment::Normal);
        assert_eq!(h.session.decision_count(), 3);
    }

    #[test]
    fn test_refresh_without_key_is_none() {
        let clock = ManualClock::new(t0());
        let cache = Arc::new(StalenessAwareSharedCache::with_clock(
            MemorySharedStore::new(),
            clock,
        ));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = DisplaySession::new(cache, DisplayPolicy::default(), tx);
        assert!(session.refresh().is_none());
        assert!(session.current().is_none());
    }

    #[test]
    fn test_stale_without_runtime_reports_no_recheck() {
        let clock = ManualClock::new(t0());
        let cache = Arc::new(StalenessAwareSharedCache::with_clock(
            MemorySharedStore::new(),
            clock.clone(),
        ));
        let k = key("sel-A", "daily");
        cache.write(&k, instagram_payload());
        clock.advance_secs(31);

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = DisplaySession::new(cache, DisplayPolicy::default(), tx);
        assert_eq!(session.set_key(k).treatment(), Treatment::Outdated);
        assert!(!session.has_pending_recheck());
    }
}
