//! Cache Statistics Module
//!
//! Tracks hit/miss/eviction counters and builds diagnostic snapshots.

use std::collections::BTreeMap;

use serde::Serialize;

// == Cache Counters ==
/// Running performance counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that found nothing usable
    pub misses: u64,
    /// Entries removed by capacity or memory pressure
    pub evictions: u64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    pub fn miss_rate(&self) -> f64 {
        ratio(self.misses, self.hits + self.misses)
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

// == Cache Stats ==
/// Point-in-time view of the cache for diagnostics.
///
/// Valid/stale/expired counts classify each entry against its own config.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub stale_entries: usize,
    pub expired_entries: usize,
    /// Sum of estimated entry sizes
    pub total_bytes: usize,
    /// Entry count per key prefix (text before the first `:`)
    pub entries_by_prefix: BTreeMap<String, usize>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    /// Fetches currently running
    pub in_flight: usize,
    /// `total_bytes / max_total_bytes`
    pub memory_usage_ratio: f64,
    /// Usage is at or above the pressure threshold
    pub memory_pressure: bool,
}

impl CacheStats {
    pub(crate) fn with_counters(counters: &CacheCounters) -> Self {
        Self {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            hit_rate: counters.hit_rate(),
            miss_rate: counters.miss_rate(),
            ..Self::default()
        }
    }
}

/// Groups keys like `vehicles:42` under `vehicles`.
pub fn key_prefix(key: &str) -> &str {
    key.split_once(':').map_or(key, |(prefix, _)| prefix)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_new() {
        let counters = CacheCounters::new();
        assert_eq!(counters.hits, 0);
        assert_eq!(counters.misses, 0);
        assert_eq!(counters.evictions, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let counters = CacheCounters::new();
        assert_eq!(counters.hit_rate(), 0.0);
        assert_eq!(counters.miss_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut counters = CacheCounters::new();
        counters.record_hit();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        assert_eq!(counters.hit_rate(), 0.75);
        assert_eq!(counters.miss_rate(), 0.25);
    }

    #[test]
    fn test_record_eviction() {
        let mut counters = CacheCounters::new();
        counters.record_eviction();
        counters.record_eviction();
        assert_eq!(counters.evictions, 2);
    }

    #[test]
    fn test_stats_copy_counters() {
        let mut counters = CacheCounters::new();
        counters.record_hit();
        counters.record_miss();

        let stats = CacheStats::with_counters(&counters);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_key_prefix() {
        assert_eq!(key_prefix("vehicles:42"), "vehicles");
        assert_eq!(key_prefix("routes:1:stops"), "routes");
        assert_eq!(key_prefix("settings"), "settings");
    }
}
