//! Producer-side aggregation of raw usage observations.
//!
//! The report extension walks the vendor's activity segments and sees the
//! same app (or web domain) once per segment. The aggregator folds those
//! observations into one record per display name, ordered most used first.

use std::collections::HashMap;

use crate::entry::UsageRecord;

/// Display name used when the vendor resolves no name for an entity.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Records kept in a finished report.
pub const REPORT_TOP_N: usize = 10;

/// Counters describing one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStats {
    /// Observations accepted into the aggregate.
    pub observations: u64,
    /// Distinct names in the result.
    pub unique: u64,
    /// Observations dropped for a negative or non-finite measure.
    pub rejected: u64,
}

/// Accumulates `(name, measure)` observations.
#[derive(Debug, Clone, Default)]
pub struct UsageAggregator {
    totals: HashMap<String, f64>,
    observations: u64,
    rejected: u64,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation. Repeated names sum.
    pub fn observe(&mut self, name: &str, measure: f64) {
        if !measure.is_finite() || measure < 0.0 {
            self.rejected += 1;
            return;
        }
        let name = name.trim();
        let name = if name.is_empty() { UNKNOWN_NAME } else { name };
        *self.totals.entry(name.to_string()).or_insert(0.0) += measure;
        self.observations += 1;
    }

    pub fn extend<'a, I>(&mut self, observations: I)
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        for (name, measure) in observations {
            self.observe(name, measure);
        }
    }

    /// Records sorted by measure descending, ties broken by name.
    pub fn finish(self) -> (Vec<UsageRecord>, AggregationStats) {
        let stats = AggregationStats {
            observations: self.observations,
            unique: self.totals.len() as u64,
            rejected: self.rejected,
        };
        let mut records: Vec<UsageRecord> = self
            .totals
            .into_iter()
            .map(|(name, measure)| UsageRecord { name, measure })
            .collect();
        records.sort_by(|a, b| {
            b.measure
                .total_cmp(&a.measure)
                .then_with(|| a.name.cmp(&b.name))
        });
        (records, stats)
    }

    /// Like [`finish`](Self::finish), keeping only the `n` most used.
    pub fn finish_top(self, n: usize) -> (Vec<UsageRecord>, AggregationStats) {
        let (mut records, stats) = self.finish();
        records.truncate(n);
        (records, stats)
    }
}
