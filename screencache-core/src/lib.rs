//! screencache Core - Entry Model and Cache Contracts
//!
//! Pure data structures shared by the producer (report extension) and the
//! consumer (main application). No storage and no IO beyond config loading.

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod freshness;
pub mod key;
pub mod usage;

pub use clock::{Clock, SystemClock};
pub use config::CacheConfig;
pub use entry::{CacheEntry, UsageRecord};
pub use error::{CodecError, ConfigError, ScreencacheError, ScreencacheResult, StoreError};
pub use freshness::{classify, entry_age, Freshness};
pub use key::{CacheKey, RangeLabel, Segmentation, SelectionId, Slot};
pub use usage::{AggregationStats, UsageAggregator, REPORT_TOP_N};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
