//! Volume Bucket Cache
//!
//! Per-symbol accumulation of traded volume keyed by bucket start. Buckets
//! outside the active resolution window are evicted whenever a new bucket is
//! opened, so each symbol holds roughly one window of buckets.

use std::collections::{BTreeMap, HashMap};

/// Accumulated volume per `(symbol, bucket start)`.
#[derive(Debug, Default)]
pub struct VolumeBucketCache {
    symbols: HashMap<String, BTreeMap<i64, f64>>,
}

impl VolumeBucketCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to a bucket, creating it if absent.
    ///
    /// Returns `true` when the bucket was created by this call.
    pub fn add_volume(&mut self, symbol: &str, bucket_start: i64, amount: f64) -> bool {
        let buckets = self.symbols.entry(symbol.to_string()).or_default();
        let mut created = false;
        let total = buckets.entry(bucket_start).or_insert_with(|| {
            created = true;
            0.0
        });
        *total += amount;
        created
    }

    /// Accumulated volume for a bucket, or 0.
    #[must_use]
    pub fn get(&self, symbol: &str, bucket_start: i64) -> f64 {
        self.lookup(symbol, bucket_start).unwrap_or(0.0)
    }

    /// Accumulated volume for a bucket, if it exists.
    #[must_use]
    pub fn lookup(&self, symbol: &str, bucket_start: i64) -> Option<f64> {
        self.symbols.get(symbol)?.get(&bucket_start).copied()
    }

    /// Remove buckets starting before `cutoff`. Returns how many were removed.
    pub fn evict_older_than(&mut self, symbol: &str, cutoff: i64) -> usize {
        let Some(buckets) = self.symbols.get_mut(symbol) else {
            return 0;
        };
        let kept = buckets.split_off(&cutoff);
        let evicted = buckets.len();
        *buckets = kept;
        evicted
    }

    /// Number of live buckets for a symbol.
    #[must_use]
    pub fn bucket_count(&self, symbol: &str) -> usize {
        self.symbols.get(symbol).map_or(0, BTreeMap::len)
    }

    /// Drop every bucket of a symbol.
    pub fn clear_symbol(&mut self, symbol: &str) {
        self.symbols.remove(symbol);
    }
}
