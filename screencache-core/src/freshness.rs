//! Freshness classification for cache entries.
//!
//! Entries are never evicted by age. They are judged at read time: an entry
//! younger than the caller's window is fresh, anything else is stale but
//! still displayable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::entry::CacheEntry;

/// Default freshness window for per-key reads.
pub const DEFAULT_FRESHNESS_WINDOW: Duration =
    Duration::from_millis(crate::config::DEFAULT_FRESHNESS_WINDOW_MS);

/// Age classification of an entry relative to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }
}

/// Age of `entry` at `now`.
///
/// An entry stamped in the future (clock skew between producer and
/// consumer) has age zero.
pub fn entry_age(entry: &CacheEntry, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(entry.written_at())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Classify `entry` at `now` against `window`.
///
/// Fresh iff `age < window`; an age of exactly `window` is stale.
pub fn classify(entry: &CacheEntry, now: DateTime<Utc>, window: Duration) -> Freshness {
    if entry_age(entry, now) < window {
        Freshness::Fresh
    } else {
        Freshness::Stale
    }
}
