//! Display decision policy.
//!
//! Given a key and a time snapshot, decide what the consumer shows:
//!
//! 1. fresh entry for the key: show it
//! 2. stale entry for the key: show it, flag it refreshing, re-check once
//! 3. no entry for the key: show the latest pointer as a placeholder
//! 4. nothing at all: show an explicit "no data yet" state

use std::time::Duration;

use chrono::{DateTime, Utc};
use screencache_core::{config, entry_age, CacheConfig, CacheEntry, CacheKey, Clock, Freshness};
use screencache_storage::{SharedStore, StalenessAwareSharedCache};

/// Windows and delays the decision is made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPolicy {
    /// Per-key freshness window.
    pub freshness_window: Duration,
    /// Window used to label a latest-pointer placeholder.
    pub latest_freshness_window: Duration,
    /// Delay before the single re-check after a stale display.
    pub recheck_delay: Duration,
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_millis(config::DEFAULT_FRESHNESS_WINDOW_MS),
            latest_freshness_window: Duration::from_millis(
                config::DEFAULT_LATEST_FRESHNESS_WINDOW_MS,
            ),
            recheck_delay: Duration::from_millis(config::DEFAULT_RECHECK_DELAY_MS),
        }
    }
}

impl From<&CacheConfig> for DisplayPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            freshness_window: config.freshness_window(),
            latest_freshness_window: config.latest_freshness_window(),
            recheck_delay: config.recheck_delay(),
        }
    }
}

/// Outcome of one display decision.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayDecision {
    /// Key-specific entry inside the freshness window.
    Fresh { entry: CacheEntry },
    /// Key-specific entry past the freshness window. `recheck_after` is set
    /// when a follow-up read has been scheduled.
    Stale {
        entry: CacheEntry,
        age: Duration,
        recheck_after: Option<Duration>,
    },
    /// No entry for the key; the latest pointer, which may belong to a
    /// different selection or range.
    Fallback {
        entry: CacheEntry,
        freshness: Freshness,
    },
    /// Nothing cached yet.
    Empty,
}

/// Visual treatment the UI should apply to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Treatment {
    Normal,
    Refreshing,
    Outdated,
    Placeholder,
    NoDataYet,
}

impl Treatment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Refreshing => "refreshing",
            Self::Outdated => "outdated",
            Self::Placeholder => "placeholder",
            Self::NoDataYet => "no_data_yet",
        }
    }
}

impl DisplayDecision {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            Self::Fresh { entry } | Self::Stale { entry, .. } | Self::Fallback { entry, .. } => {
                Some(entry)
            }
            Self::Empty => None,
        }
    }

    pub fn treatment(&self) -> Treatment {
        match self {
            Self::Fresh { .. } => Treatment::Normal,
            Self::Stale {
                recheck_after: Some(_),
                ..
            } => Treatment::Refreshing,
            Self::Stale {
                recheck_after: None,
                ..
            } => Treatment::Outdated,
            Self::Fallback { .. } => Treatment::Placeholder,
            Self::Empty => Treatment::NoDataYet,
        }
    }

    pub fn recheck_after(&self) -> Option<Duration> {
        match self {
            Self::Stale { recheck_after, .. } => *recheck_after,
            _ => None,
        }
    }

    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fresh { .. } => "fresh",
            Self::Stale { .. } => "stale",
            Self::Fallback { .. } => "fallback",
            Self::Empty => "empty",
        }
    }

    /// Same decision with no re-check pending.
    pub(crate) fn without_recheck(self) -> Self {
        match self {
            Self::Stale { entry, age, .. } => Self::Stale {
                entry,
                age,
                recheck_after: None,
            },
            other => other,
        }
    }
}

/// Decide what to display for `key` at `now`.
///
/// Reads at most two slots and never writes.
pub fn decide<S, C>(
    cache: &StalenessAwareSharedCache<S, C>,
    key: &CacheKey,
    now: DateTime<Utc>,
    policy: &DisplayPolicy,
) -> DisplayDecision
where
    S: SharedStore,
    C: Clock,
{
    if let Some(entry) = cache.read(key) {
        return match cache.classify(&entry, now, policy.freshness_window) {
            Freshness::Fresh => DisplayDecision::Fresh { entry },
            Freshness::Stale => DisplayDecision::Stale {
                age: entry_age(&entry, now),
                entry,
                recheck_after: Some(policy.recheck_delay),
            },
        };
    }

    match cache.read_latest() {
        Some(entry) => DisplayDecision::Fallback {
            freshness: cache.classify(&entry, now, policy.latest_freshness_window),
            entry,
        },
        None => DisplayDecision::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screencache_storage::MemorySharedStore;
    use screencache_test_utils::{app_list_payload, instagram_payload, key, t0, ManualClock};

    fn cache() -> (StalenessAwareSharedCache<MemorySharedStore, ManualClock>, ManualClock) {
        let clock = ManualClock::new(t0());
        (
            StalenessAwareSharedCache::with_clock(MemorySharedStore::new(), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_default_policy_matches_default_config() {
        let policy = DisplayPolicy::default();
        assert_eq!(policy, DisplayPolicy::from(&CacheConfig::new("/tmp/screencache")));
        assert_eq!(policy.freshness_window, screencache_core::freshness::DEFAULT_FRESHNESS_WINDOW);
    }

    #[test]
    fn test_fresh_entry_displays_normally() {
        let (cache, clock) = cache();
        let k = key("sel-A", "daily");
        cache.write(&k, instagram_payload());
        clock.advance_secs(10);

        let decision = decide(&cache, &k, cache.now(), &DisplayPolicy::default());
        assert!(matches!(decision, DisplayDecision::Fresh { .. }));
        assert_eq!(decision.treatment(), Treatment::Normal);
        assert_eq!(decision.recheck_after(), None);
    }

    #[test]
    fn test_stale_entry_requests_recheck() {
        let (cache, clock) = cache();
        let k = key("sel-A", "daily");
        cache.write(&k, instagram_payload());
        clock.advance_secs(31);

        let policy = DisplayPolicy::default();
        let decision = decide(&cache, &k, cache.now(), &policy);
        match &decision {
            DisplayDecision::Stale {
                entry,
                age,
                recheck_after,
            } => {
                assert_eq!(entry.payload(), instagram_payload().as_slice());
                assert_eq!(*age, Duration::from_secs(31));
                assert_eq!(*recheck_after, Some(policy.recheck_delay));
            }
            other => panic!("expected stale, got {other:?}"),
        }
        assert_eq!(decision.treatment(), Treatment::Refreshing);
        assert_eq!(decision.clone().without_recheck().treatment(), Treatment::Outdated);
    }

    #[test]
    fn test_missing_key_falls_back_to_latest() {
        let (cache, clock) = cache();
        cache.write(&key("sel-A", "daily"), app_list_payload());
        clock.advance_secs(600);

        let decision = decide(&cache, &key("sel-B", "weekly"), cache.now(), &DisplayPolicy::default());
        match &decision {
            DisplayDecision::Fallback { entry, freshness } => {
                assert_eq!(entry.source_key(), &key("sel-A", "daily"));
                assert_eq!(*freshness, Freshness::Stale);
            }
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(decision.treatment(), Treatment::Placeholder);
    }

    #[test]
    fn test_nothing_cached_is_empty_state() {
        let (cache, _clock) = cache();
        let decision = decide(&cache, &CacheKey::from_raw("x"), cache.now(), &DisplayPolicy::default());
        assert_eq!(decision, DisplayDecision::Empty);
        assert_eq!(decision.treatment(), Treatment::NoDataYet);
        assert!(decision.entry().is_none());
    }

    #[test]
    fn test_empty_payload_is_not_empty_state() {
        let (cache, _clock) = cache();
        let k = key("sel-A", "daily");
        cache.write(&k, Vec::new());
        let decision = decide(&cache, &k, cache.now(), &DisplayPolicy::default());
        assert!(matches!(decision, DisplayDecision::Fresh { ref entry } if entry.is_empty()));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = CacheConfig::new("/tmp/x");
        config.recheck_delay_ms = 3_000;
        let policy = DisplayPolicy::from(&config);
        assert_eq!(policy.recheck_delay, Duration::from_secs(3));
        assert_eq!(policy.freshness_window, Duration::from_secs(30));
    }
}
