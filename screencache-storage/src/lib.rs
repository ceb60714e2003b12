//! screencache Storage - Shared Store and Cache Protocol
//!
//! The shared store is the only state shared between the producer and the
//! consumer. [`StalenessAwareSharedCache`] is a stateless set of operations
//! over an injected store handle.

pub mod cache;
pub mod lmdb_store;
pub mod store;

pub use cache::StalenessAwareSharedCache;
pub use lmdb_store::LmdbSharedStore;
pub use store::{open_shared_store, DynStore, MemorySharedStore, OfflineStore, SharedStore};
