//! Staleness-aware shared cache protocol.
//!
//! The producer writes a finished report under a key derived from the
//! selection and range label; the same entry also replaces the latest
//! pointer. The consumer reads by key, classifies by age and falls back to
//! the latest pointer when its key has never been written.
//!
//! # Failure Model
//!
//! The cache is an optimization. Store failures and malformed values are
//! logged and degrade to "absent"; nothing here returns an error.

use std::time::Duration;

use chrono::{DateTime, Utc};
use screencache_core::{
    classify, CacheEntry, CacheKey, Clock, Freshness, RangeLabel, SelectionId, Slot, SystemClock,
    UsageRecord,
};
use tracing::{debug, info, warn};

use crate::store::SharedStore;

/// Cross-process key/value cache with read-time staleness classification.
///
/// Holds no cache state of its own: every operation goes to the store, so
/// any number of instances over handles to the same store agree.
///
/// # Example
///
/// ```ignore
/// // Producer (report extension)
/// let key = cache.write_for(&SelectionId::named("focus"), &RangeLabel::new("daily"), records);
///
/// // Consumer (main app)
/// if let Some(entry) = cache.read(&key) {
///     let freshness = cache.classify(&entry, cache.now(), Duration::from_secs(30));
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StalenessAwareSharedCache<S, C = SystemClock> {
    store: S,
    clock: C,
}

impl<S: SharedStore> StalenessAwareSharedCache<S, SystemClock> {
    /// Create a cache over `store` stamping entries with the wall clock.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: SharedStore, C: Clock> StalenessAwareSharedCache<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current instant according to the cache's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Store `payload` under `key` and as the latest pointer.
    ///
    /// The entry is stamped with the current time. Both slots are written in
    /// one store call. Store failures are logged and the write is dropped.
    pub fn write(&self, key: &CacheKey, payload: Vec<UsageRecord>) {
        let slot = Slot::Entry(key).name();
        let records = payload.len();
        let entry = CacheEntry::new(key.clone(), payload, self.clock.now());
        let bytes = match entry.encode(&slot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode cache entry, write dropped");
                return;
            }
        };

        match self
            .store
            .put_all(&[(slot.as_str(), bytes.as_slice()), (Slot::LATEST, bytes.as_slice())])
        {
            Ok(()) => info!(
                key = %key,
                records,
                backend = self.store.backend(),
                "cached usage report"
            ),
            Err(e) => warn!(
                key = %key,
                error = %e,
                backend = self.store.backend(),
                "shared store write failed, write dropped"
            ),
        }
    }

    /// Derive the key for `selection` and `range`, write, and return the key.
    pub fn write_for(
        &self,
        selection: &SelectionId,
        range: &RangeLabel,
        payload: Vec<UsageRecord>,
    ) -> CacheKey {
        let key = CacheKey::derive(selection, range);
        self.write(&key, payload);
        key
    }

    /// Entry last written under `key`, if any.
    pub fn read(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.read_slot(&Slot::Entry(key).name())
    }

    /// Most recent entry written under any key, if any.
    pub fn read_latest(&self) -> Option<CacheEntry> {
        self.read_slot(Slot::LATEST)
    }

    /// Classify `entry` at `now` against `window`.
    pub fn classify(&self, entry: &CacheEntry, now: DateTime<Utc>, window: Duration) -> Freshness {
        classify(entry, now, window)
    }

    /// Remove the entry under `key`, and the latest pointer when it was
    /// written from `key`. The latest pointer is checked and removed in the
    /// same store transaction. Clearing an absent key does nothing.
    pub fn clear(&self, key: &CacheKey) {
        let slot = Slot::Entry(key).name();
        let written_from_key = |bytes: &[u8]| {
            CacheEntry::decode(Slot::LATEST, bytes).is_ok_and(|latest| latest.source_key() == key)
        };

        match self
            .store
            .remove_all_where(&[slot.as_str()], Slot::LATEST, &written_from_key)
        {
            Ok(removed) => debug!(key = %key, removed, "cleared cache key"),
            Err(e) => warn!(key = %key, error = %e, "shared store clear failed"),
        }
    }

    /// Publish the selection the consumer is currently displaying so the
    /// producer can derive the same key.
    pub fn set_current_selection(&self, selection: &SelectionId) {
        let bytes = match serde_json::to_vec(selection) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(selection = %selection, error = %e, "failed to encode selection");
                return;
            }
        };
        if let Err(e) = self.store.put(Slot::CURRENT_SELECTION, &bytes) {
            warn!(selection = %selection, error = %e, "failed to publish current selection");
        }
    }

    /// Selection last published by the consumer, or all entities.
    pub fn current_selection(&self) -> SelectionId {
        match self.store.get(Slot::CURRENT_SELECTION) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "malformed current selection, using all entities");
                SelectionId::All
            }),
            Ok(None) => SelectionId::All,
            Err(e) => {
                warn!(error = %e, "failed to read current selection, using all entities");
                SelectionId::All
            }
        }
    }

    fn read_slot(&self, slot: &str) -> Option<CacheEntry> {
        let bytes = match self.store.get(slot) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(slot, error = %e, backend = self.store.backend(), "shared store read failed");
                return None;
            }
        };
        match CacheEntry::decode(slot, &bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(slot, error = %e, "ignoring malformed cache entry");
                None
            }
        }
    }
}
