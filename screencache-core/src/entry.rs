//! Cache entry model and its persisted layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::key::CacheKey;

/// One named measurement in a report, e.g. an app and its usage in seconds
/// or its pickup count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub name: String,
    pub measure: f64,
}

impl UsageRecord {
    pub fn new(name: impl Into<String>, measure: f64) -> Self {
        Self {
            name: name.into(),
            measure,
        }
    }
}

/// The unit stored per cache key.
///
/// Entries are immutable: a newer result for the same key is a new entry
/// that replaces this one in the store.
///
/// # Persisted Layout
///
/// ```json
/// {"payload":[{"name":"Instagram","measure":3600.0}],"writtenAt":1792000000000,"sourceKey":"sel-A|daily"}
/// ```
///
/// `writtenAt` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    payload: Vec<UsageRecord>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    written_at: DateTime<Utc>,
    source_key: CacheKey,
}

impl CacheEntry {
    pub fn new(source_key: CacheKey, payload: Vec<UsageRecord>, written_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            written_at,
            source_key,
        }
    }

    /// Records in the order the producer wrote them. May be empty, which
    /// means the producer computed the report and found no usage.
    pub fn payload(&self) -> &[UsageRecord] {
        &self.payload
    }

    pub fn written_at(&self) -> DateTime<Utc> {
        self.written_at
    }

    pub fn source_key(&self) -> &CacheKey {
        &self.source_key
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Sum of all measures in the payload.
    pub fn total_measure(&self) -> f64 {
        self.payload.iter().map(|r| r.measure).sum()
    }

    /// The `n` records with the largest measure, largest first.
    pub fn top(&self, n: usize) -> Vec<&UsageRecord> {
        let mut records: Vec<&UsageRecord> = self.payload.iter().collect();
        records.sort_by(|a, b| b.measure.total_cmp(&a.measure));
        records.truncate(n);
        records
    }

    /// Encode for storage under `slot`.
    pub fn encode(&self, slot: &str) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::Encode {
            slot: slot.to_string(),
            reason: e.to_string(),
        })
    }

    /// Decode a value read from `slot`.
    pub fn decode(slot: &str, bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed {
            slot: slot.to_string(),
            reason: e.to_string(),
        })
    }
}
