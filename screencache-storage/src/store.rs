//! Shared store abstraction and the in-process implementations.
//!
//! # Contract
//!
//! - Values are opaque bytes under string slot names.
//! - `put_all`, `remove_all` and `remove_all_where` apply every change or
//!   none. A concurrent reader observes a slot either fully old or fully new.
//! - `remove_all_where` inspects its guarded slot inside the same atomic
//!   step that removes it, so a write from another process cannot land
//!   between the check and the removal.
//! - No locking protocol beyond that: last write wins.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use screencache_core::{CacheConfig, StoreError};
use tracing::warn;

use crate::lmdb_store::LmdbSharedStore;

/// Durable key/value store reachable from every process that shares the cache.
pub trait SharedStore: Send + Sync {
    /// Short backend name for log fields.
    fn backend(&self) -> &'static str;

    /// Read the value in `slot`.
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write every `(slot, value)` pair atomically.
    fn put_all(&self, writes: &[(&str, &[u8])]) -> Result<(), StoreError>;

    /// Remove every slot atomically. Returns how many slots existed.
    fn remove_all(&self, slots: &[&str]) -> Result<u64, StoreError>;

    /// Remove every slot in `slots`, plus `guarded` when its current value
    /// satisfies `predicate`, in one atomic step. Returns how many slots
    /// were removed.
    fn remove_all_where(
        &self,
        slots: &[&str],
        guarded: &str,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<u64, StoreError>;

    fn put(&self, slot: &str, value: &[u8]) -> Result<(), StoreError> {
        self.put_all(&[(slot, value)])
    }

    fn remove(&self, slot: &str) -> Result<bool, StoreError> {
        self.remove_all(&[slot]).map(|removed| removed > 0)
    }
}

impl<S: SharedStore + ?Sized> SharedStore for Arc<S> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(slot)
    }

    fn put_all(&self, writes: &[(&str, &[u8])]) -> Result<(), StoreError> {
        (**self).put_all(writes)
    }

    fn remove_all(&self, slots: &[&str]) -> Result<u64, StoreError> {
        (**self).remove_all(slots)
    }

    fn remove_all_where(
        &self,
        slots: &[&str],
        guarded: &str,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<u64, StoreError> {
        (**self).remove_all_where(slots, guarded, predicate)
    }
}

/// Type-erased store handle.
pub type DynStore = Arc<dyn SharedStore>;

/// Open the LMDB store described by `config`.
///
/// If the store cannot be opened the cache must keep working as a
/// permanent miss, so this falls back to an [`OfflineStore`].
pub fn open_shared_store(config: &CacheConfig) -> DynStore {
    match LmdbSharedStore::open(&config.store_path, config.map_size_mb) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(
                store_path = %config.store_path.display(),
                error = %e,
                "shared store unavailable, cache disabled"
            );
            Arc::new(OfflineStore::new(e.to_string()))
        }
    }
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemorySharedStore {
    slots: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupied slot names, sorted.
    pub fn slot_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl SharedStore for MemorySharedStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(slots.get(slot).cloned())
    }

    fn put_all(&self, writes: &[(&str, &[u8])]) -> Result<(), StoreError> {
        let mut slots = self.slots.write().map_err(|_| StoreError::LockPoisoned)?;
        for (slot, value) in writes {
            slots.insert((*slot).to_string(), value.to_vec());
        }
        Ok(())
    }

    fn remove_all(&self, slots_to_remove: &[&str]) -> Result<u64, StoreError> {
        let mut slots = self.slots.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(slots_to_remove
            .iter()
            .filter(|slot| slots.remove(**slot).is_some())
            .count() as u64)
    }

    fn remove_all_where(
        &self,
        slots_to_remove: &[&str],
        guarded: &str,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<u64, StoreError> {
        let mut slots = self.slots.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut removed = slots_to_remove
            .iter()
            .filter(|slot| slots.remove(**slot).is_some())
            .count() as u64;
        if slots.get(guarded).is_some_and(|value| predicate(value.as_slice())) {
            slots.remove(guarded);
            removed += 1;
        }
        Ok(removed)
    }
}

/// Store that is never reachable.
#[derive(Debug, Clone)]
pub struct OfflineStore {
    reason: String,
}

impl OfflineStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn unavailable(&self) -> StoreError {
        StoreError::Unavailable {
            reason: self.reason.clone(),
        }
    }
}

impl SharedStore for OfflineStore {
    fn backend(&self) -> &'static str {
        "offline"
    }

    fn get(&self, _slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(self.unavailable())
    }

    fn put_all(&self, _writes: &[(&str, &[u8])]) -> Result<(), StoreError> {
        Err(self.unavailable())
    }

    fn remove_all(&self, _slots: &[&str]) -> Result<u64, StoreError> {
        Err(self.unavailable())
    }

    fn remove_all_where(
        &self,
        _slots: &[&str],
        _guarded: &str,
        _predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<u64, StoreError> {
        Err(self.unavailable())
    }
}
