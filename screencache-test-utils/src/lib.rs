//! screencache Test Utilities
//!
//! Centralized test infrastructure for the screencache workspace:
//! - Manual clock for simulating elapsed time
//! - Proptest generators for keys and payloads
//! - Fixtures for the common report shapes
//! - Stores that fail or corrupt on demand

use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

pub use screencache_core::{
    CacheEntry, CacheKey, Clock, Freshness, RangeLabel, SelectionId, StoreError, UsageRecord,
};
pub use screencache_storage::{MemorySharedStore, OfflineStore, SharedStore};

// ============================================================================
// CLOCK
// ============================================================================

/// Fixed reference instant used across tests: 2026-10-14T12:00:00Z.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write().unwrap() = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.write().unwrap() += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(chrono::Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// `[{name: "Instagram", measure: 3600}]`
pub fn instagram_payload() -> Vec<UsageRecord> {
    vec![UsageRecord::new("Instagram", 3600.0)]
}

/// A typical "App List" report, most used first.
pub fn app_list_payload() -> Vec<UsageRecord> {
    vec![
        UsageRecord::new("Instagram", 3600.0),
        UsageRecord::new("Safari", 1250.0),
        UsageRecord::new("Messages", 900.0),
        UsageRecord::new("news.example.com", 300.0),
    ]
}

/// A "Total Pickups" report where measures are counts.
pub fn pickups_payload() -> Vec<UsageRecord> {
    vec![
        UsageRecord::new("Messages", 42.0),
        UsageRecord::new("Instagram", 17.0),
    ]
}

pub fn key(selection: &str, range: &str) -> CacheKey {
    CacheKey::derive(&SelectionId::named(selection), &RangeLabel::new(range))
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub fn arb_selection() -> impl Strategy<Value = SelectionId> {
    prop_oneof![
        Just(SelectionId::All),
        "[a-zA-Z0-9_|\\\\-]{1,12}".prop_map(SelectionId::named),
    ]
}

pub fn arb_range_label() -> impl Strategy<Value = RangeLabel> {
    prop_oneof![
        Just(RangeLabel::new("current")),
        Just(RangeLabel::new("daily")),
        "(hourly|daily|weekly)@[0-9]{4}-[0-9]{2}(-[0-9]{2})?".prop_map(RangeLabel::new),
        "[a-z|\\\\]{0,8}".prop_map(RangeLabel::new),
    ]
}

pub fn arb_usage_record() -> impl Strategy<Value = UsageRecord> {
    ("[A-Za-z][A-Za-z .]{0,15}", 0u32..86_400)
        .prop_map(|(name, secs)| UsageRecord::new(name, f64::from(secs)))
}

pub fn arb_payload() -> impl Strategy<Value = Vec<UsageRecord>> {
    prop::collection::vec(arb_usage_record(), 0..12)
}

// ============================================================================
// FAULT-INJECTING STORES
// ============================================================================

/// Store whose reads work but whose writes and removals fail.
#[derive(Debug, Clone, Default)]
pub struct WriteFailingStore {
    inner: MemorySharedStore,
}

impl WriteFailingStore {
    pub fn new(inner: MemorySharedStore) -> Self {
        Self { inner }
    }
}

impl SharedStore for WriteFailingStore {
    fn backend(&self) -> &'static str {
        "write-failing"
    }

    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(slot)
    }

    fn put_all(&self, _writes: &[(&str, &[u8])]) -> Result<(), StoreError> {
        Err(StoreError::TransactionFailed {
            reason: "injected write failure".to_string(),
        })
    }

    fn remove_all(&self, _slots: &[&str]) -> Result<u64, StoreError> {
        Err(StoreError::TransactionFailed {
            reason: "injected remove failure".to_string(),
        })
    }

    fn remove_all_where(
        &self,
        slots: &[&str],
        _guarded: &str,
        _predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<u64, StoreError> {
        self.remove_all(slots)
    }
}

/// Store that truncates every value it hands back, as a torn or
/// foreign-format write would look to a reader.
#[derive(Debug, Clone, Default)]
pub struct CorruptingStore {
    inner: MemorySharedStore,
}

impl CorruptingStore {
    pub fn new(inner: MemorySharedStore) -> Self {
        Self { inner }
    }
}

impl SharedStore for CorruptingStore {
    fn backend(&self) -> &'static str {
        "corrupting"
    }

    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.get(slot)?.map(|mut bytes| {
            bytes.truncate(bytes.len() / 2);
            bytes
        }))
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
