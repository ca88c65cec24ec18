//! Cache Statistics Module
//!
//! Tracks cache effectiveness: hits, fetches, deduplicated joins, failures
//! and garbage collection.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Reads served from a fresh entry without a fetch
    pub hits: u64,
    /// Reads that started a new fetch
    pub misses: u64,
    /// Reads that joined a fetch already in flight
    pub deduplicated: u64,
    /// Fetches that completed with an error
    pub fetch_errors: u64,
    /// Entries removed by garbage collection
    pub gc_evictions: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Fraction of reads that did not issue a network call.
    ///
    /// Deduplicated joins count as hits here since they share another
    /// caller's request. Returns 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.deduplicated;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.deduplicated) as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_dedup(&mut self) {
        self.deduplicated += 1;
    }

    pub fn record_fetch_error(&mut self) {
        self.fetch_errors += 1;
    }

    pub fn record_gc_eviction(&mut self) {
        self.gc_evictions += 1;
    }

    // == Update Entry Count ==
    /// Updates the total entries count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
