//! Cache key derivation for selection + time-range scoped usage reports.
//!
//! A [`CacheKey`] can only be built from a [`SelectionId`] and a
//! [`RangeLabel`] (or wrapped from a string that was derived earlier), so
//! producer and consumer always agree on where a report lives.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the escaped selection and the escaped range label.
const SEPARATOR: char = '|';

/// Escape character for [`SEPARATOR`] and itself.
const ESCAPE: char = '\\';

/// Which set of monitored entities a report covers.
///
/// Selection identifiers are opaque names chosen by the host application.
/// The vendor's app/category tokens behind a selection never reach the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SelectionId {
    /// Every monitored entity. Also used when no selection is known.
    All,
    /// A named selection.
    Named(String),
}

impl SelectionId {
    /// Rendered form of [`SelectionId::All`].
    pub const ALL_LABEL: &'static str = "all_apps";

    /// Create a selection from a name. Blank names and the reserved label
    /// resolve to [`SelectionId::All`].
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.trim().is_empty() || name == Self::ALL_LABEL {
            Self::All
        } else {
            Self::Named(name)
        }
    }

    /// Resolve an optional selection name, treating `None` as all entities.
    pub fn from_optional(name: Option<&str>) -> Self {
        name.map(Self::named).unwrap_or(Self::All)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => Self::ALL_LABEL,
            Self::Named(name) => name,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl From<String> for SelectionId {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl From<SelectionId> for String {
    fn from(selection: SelectionId) -> Self {
        selection.as_str().to_string()
    }
}

impl fmt::Display for SelectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report granularity used to bucket query windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segmentation {
    Hourly,
    Daily,
    Weekly,
}

impl Segmentation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

/// Coarse label summarizing a report's query period.
///
/// Labels name a logical window rather than exact timestamps, so repeated
/// queries against the same window land on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeLabel(String);

impl RangeLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Label for the window of `segmentation` containing `at`.
    ///
    /// - hourly: `hourly@2026-10-14T09`
    /// - daily: `daily@2026-10-14`
    /// - weekly: `weekly@2026-W42` (ISO week)
    pub fn bucketed(segmentation: Segmentation, at: DateTime<Utc>) -> Self {
        let bucket = match segmentation {
            Segmentation::Hourly => at.format("%Y-%m-%dT%H").to_string(),
            Segmentation::Daily => at.format("%Y-%m-%d").to_string(),
            Segmentation::Weekly => {
                let week = at.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
        };
        Self(format!("{}@{}", segmentation.as_str(), bucket))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RangeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key a cache entry is stored under.
///
/// # Format
///
/// `escape(selection) | escape(range)`, where `\` and `|` inside either part
/// are prefixed with `\`. The first unescaped `|` is always the separator,
/// so distinct (selection, range) pairs never derive the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a selection and range label.
    pub fn derive(selection: &SelectionId, range: &RangeLabel) -> Self {
        let selection = selection.as_str();
        let range = range.as_str();
        let mut key = String::with_capacity(selection.len() + range.len() + 1);
        push_escaped(&mut key, selection);
        key.push(SEPARATOR);
        push_escaped(&mut key, range);
        Self(key)
    }

    /// Wrap a key string that was derived elsewhere (e.g. read back from a
    /// stored entry or passed in by a host bridge).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn push_escaped(out: &mut String, part: &str) {
    for c in part.chars() {
        if c == SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

/// Named slot in the shared store.
///
/// Entry slots all live under [`Slot::ENTRY_PREFIX`], so no derived key can
/// collide with the latest pointer or the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<'a> {
    /// Per-key entry.
    Entry(&'a CacheKey),
    /// Most recent entry written under any key.
    Latest,
    /// Selection the consumer is currently displaying.
    CurrentSelection,
}

impl Slot<'_> {
    pub const ENTRY_PREFIX: &'static str = "entry/";
    pub const LATEST: &'static str = "latest";
    pub const CURRENT_SELECTION: &'static str = "selection/current";

    /// Name of this slot in the shared store.
    pub fn name(&self) -> String {
        match self {
            Slot::Entry(key) => format!("{}{}", Self::ENTRY_PREFIX, key.as_str()),
            Slot::Latest => Self::LATEST.to_string(),
            Slot::CurrentSelection => Self::CURRENT_SELECTION.to_string(),
        }
    }
}
