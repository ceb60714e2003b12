//! LMDB-backed shared store.
//!
//! Uses the heed crate (Rust bindings for LMDB). LMDB environments are
//! memory-mapped files with a lock file alongside, so separate processes
//! that open the same directory (the report extension and the main app,
//! via a shared container) see one store.
//!
//! # Atomicity
//!
//! - `get` runs in a read transaction and sees a committed snapshot
//! - `put_all` and `remove_all` run in a single write transaction each

use std::path::{Path, PathBuf};

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use screencache_core::StoreError;
use tracing::debug;

use crate::store::SharedStore;

/// LMDB store for the shared cache.
///
/// # Example
///
/// ```ignore
/// use screencache_storage::{LmdbSharedStore, StalenessAwareSharedCache};
///
/// let store = LmdbSharedStore::open("/path/to/group/container/screencache", 16)?;
/// let cache = StalenessAwareSharedCache::new(store);
/// ```
#[derive(Clone)]
pub struct LmdbSharedStore {
    env: Env,
    db: Database<Str, Bytes>,
    path: PathBuf,
}

impl std::fmt::Debug for LmdbSharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbSharedStore")
            .field("path", &self.path)
            .finish()
    }
}

fn txn_error(e: heed::Error) -> StoreError {
    StoreError::TransactionFailed {
        reason: e.to_string(),
    }
}

impl LmdbSharedStore {
    /// Open (or create) the store in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the map in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| StoreError::OpenFailed {
                path: path.display().to_string(),
                reason: format!("map size of {max_size_mb} MB overflows"),
            })?;
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is only ever opened through this type, with
        // the same options, and the map file is not truncated by this crate.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path)
        }
        .map_err(|e| StoreError::OpenFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| StoreError::OpenFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(txn_error)?;

        debug!(path = %path.display(), max_size_mb, "opened shared LMDB store");

        Ok(Self {
            env,
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of occupied slots.
    pub fn len(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        self.db.len(&rtxn).map_err(txn_error)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.len().map(|n| n == 0)
    }
}

impl SharedStore for LmdbSharedStore {
    fn backend(&self) -> &'static str {
        "lmdb"
    }

    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let value = self.db.get(&rtxn, slot).map_err(txn_error)?;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    fn put_all(&self, writes: &[(&str, &[u8])]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        for (slot, value) in writes {
            self.db.put(&mut wtxn, slot, value).map_err(txn_error)?;
        }
        wtxn.commit().map_err(txn_error)
    }

    fn remove_all(&self, slots: &[&str]) -> Result<u64, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut removed = 0u64;
        for slot in slots {
            if self.db.delete(&mut wtxn, slot).map_err(txn_error)? {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(removed)
    }

    fn remove_all_where(
        &self,
        slots: &[&str],
        guarded: &str,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<u64, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut removed = 0u64;
        for slot in slots {
            if self.db.delete(&mut wtxn, slot).map_err(txn_error)? {
                removed += 1;
            }
        }
        let matches = self
            .db
            .get(&wtxn, guarded)
            .map_err(txn_error)?
            .is_some_and(|value| predicate(value));
        if matches && self.db.delete(&mut wtxn, guarded).map_err(txn_error)? {
            removed += 1;
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(removed)
    }
}
