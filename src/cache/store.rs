//! Entry Store Module
//!
//! Entry table combining HashMap storage with recency tracking, byte
//! accounting and the eviction passes. Has no locking or event delivery of
//! its own; the manager wraps it in a mutex and publishes what it returns.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::cache::entry::{CacheEntry, EntrySource, Freshness};
use crate::cache::lru::AccessOrder;
use crate::cache::stats::{key_prefix, CacheCounters, CacheStats};
use crate::config::{CacheConfig, MemoryPolicy};

// == Entry Store ==
/// Key/entry table with LRU order and aggregate size tracking.
#[derive(Debug)]
pub struct EntryStore<T> {
    /// Key-entry storage
    entries: HashMap<String, CacheEntry<T>>,
    /// Recency order for eviction
    order: AccessOrder,
    /// Performance counters
    counters: CacheCounters,
    /// Sum of `size` over all entries
    total_bytes: usize,
}

impl<T> Default for EntryStore<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: AccessOrder::new(),
            counters: CacheCounters::new(),
            total_bytes: 0,
        }
    }
}

impl<T> EntryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    // == Lookup ==
    pub fn get(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    /// Looks up an entry and records a read against it.
    pub fn touch(&mut self, key: &str, now: u64) -> Option<&mut CacheEntry<T>> {
        let entry = self.entries.get_mut(key)?;
        entry.record_access(now);
        self.order.touch(key);
        Some(entry)
    }

    // == Insert ==
    /// Creates or overwrites the entry for `key`.
    ///
    /// An overwrite keeps `created_at` and the access count.
    pub fn insert(
        &mut self,
        key: &str,
        data: T,
        config: CacheConfig,
        size: usize,
        source: EntrySource,
        now: u64,
    ) {
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.total_bytes = self.total_bytes.saturating_sub(entry.size) + size;
                entry.overwrite(data, config, size, source, now);
            }
            None => {
                let entry = CacheEntry::new(key.to_string(), data, config, size, source, now);
                self.entries.insert(key.to_string(), entry);
                self.total_bytes += size;
            }
        }
        self.order.touch(key);
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(key);
        self.total_bytes = self.total_bytes.saturating_sub(entry.size);
        Some(entry)
    }

    /// Removes every entry matching `predicate`, coldest first.
    ///
    /// Returns the removed keys in removal order.
    pub fn remove_where<P>(&mut self, predicate: P) -> Vec<String>
    where
        P: Fn(&CacheEntry<T>) -> bool,
    {
        let doomed: Vec<String> = self
            .order
            .iter_coldest()
            .filter(|key| self.entries.get(*key).is_some_and(&predicate))
            .map(str::to_string)
            .collect();

        for key in &doomed {
            self.remove(key);
        }
        doomed
    }

    // == Cleanup Expired ==
    /// Removes all entries past their own `max_age`.
    pub fn remove_expired(&mut self, now: u64) -> Vec<String> {
        self.remove_where(|entry| entry.is_expired(now))
    }

    /// Removes every entry, returning the keys coldest first.
    pub fn drain(&mut self) -> Vec<String> {
        let keys: Vec<String> = self.order.iter_coldest().map(str::to_string).collect();
        self.entries.clear();
        self.order.clear();
        self.total_bytes = 0;
        keys
    }

    /// Drops every entry and zeroes the counters.
    pub fn reset(&mut self) {
        self.drain();
        self.counters = CacheCounters::new();
    }

    // == Eviction ==
    /// Brings the table back under its ceilings after a write to `protected`.
    ///
    /// Runs, in order: the entry-count ceiling, the two-tier memory pressure
    /// response, then the hard byte ceiling. `protected` is never evicted.
    /// Returns the evicted keys in eviction order.
    pub fn enforce_limits(
        &mut self,
        protected: &str,
        max_entries: usize,
        policy: &MemoryPolicy,
    ) -> Vec<String> {
        let mut evicted = Vec::new();

        while self.entries.len() > max_entries {
            match self.evict_coldest(protected) {
                Some(key) => evicted.push(key),
                None => break,
            }
        }

        let usage = self.usage_ratio(policy);
        if usage >= policy.emergency_threshold {
            let keep = ((self.entries.len() as f64 * policy.emergency_retain_fraction).ceil()
                as usize)
                .max(1);
            warn!(
                "Emergency cleanup at {:.0}% memory usage: keeping {} of {} entries",
                usage * 100.0,
                keep,
                self.entries.len()
            );
            while self.entries.len() > keep {
                match self.evict_coldest(protected) {
                    Some(key) => evicted.push(key),
                    None => break,
                }
            }
        } else if usage >= policy.pressure_threshold {
            let count = ((self.entries.len() as f64 * policy.aggressive_eviction_fraction).floor()
                as usize)
                .max(1);
            info!(
                "Aggressive cleanup at {:.0}% memory usage: evicting {} coldest entries",
                usage * 100.0,
                count
            );
            for _ in 0..count {
                match self.evict_coldest(protected) {
                    Some(key) => evicted.push(key),
                    None => break,
                }
            }
        }

        while self.total_bytes > policy.max_total_bytes {
            match self.evict_coldest(protected) {
                Some(key) => evicted.push(key),
                None => break,
            }
        }

        if !evicted.is_empty() {
            debug!("Evicted {} entries after writing '{}'", evicted.len(), protected);
        }
        evicted
    }

    fn evict_coldest(&mut self, protected: &str) -> Option<String> {
        let key = self.order.coldest_except(protected)?.to_string();
        self.remove(&key);
        self.counters.record_eviction();
        Some(key)
    }

    /// `total_bytes / max_total_bytes`; a zero ceiling reads as full once anything is stored.
    pub fn usage_ratio(&self, policy: &MemoryPolicy) -> f64 {
        if policy.max_total_bytes == 0 {
            return if self.total_bytes == 0 { 0.0 } else { 1.0 };
        }
        self.total_bytes as f64 / policy.max_total_bytes as f64
    }

    // == Counters ==
    pub fn record_hit(&mut self) {
        self.counters.record_hit();
    }

    pub fn record_miss(&mut self) {
        self.counters.record_miss();
    }

    pub fn counters(&self) -> CacheCounters {
        self.counters
    }

    // == Stats ==
    /// Builds a diagnostic snapshot at `now`.
    pub fn snapshot(&self, now: u64, policy: &MemoryPolicy) -> CacheStats {
        let mut stats = CacheStats::with_counters(&self.counters);
        stats.total_entries = self.entries.len();
        stats.total_bytes = self.total_bytes;

        for (key, entry) in &self.entries {
            match entry.freshness(now) {
                Freshness::Fresh => stats.valid_entries += 1,
                Freshness::Stale => stats.stale_entries += 1,
                Freshness::Expired => stats.expired_entries += 1,
            }
            *stats
                .entries_by_prefix
                .entry(key_prefix(key).to_string())
                .or_default() += 1;
        }

        stats.memory_usage_ratio = self.usage_ratio(policy);
        stats.memory_pressure = stats.memory_usage_ratio >= policy.pressure_threshold;
        stats
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> CacheConfig {
        CacheConfig::new(Duration::from_millis(100), Duration::from_millis(200)).unwrap()
    }

    fn roomy() -> MemoryPolicy {
        MemoryPolicy {
            max_total_bytes: 1_000_000,
            ..MemoryPolicy::default()
        }
    }

    fn put(store: &mut EntryStore<String>, key: &str, size: usize, now: u64) {
        store.insert(key, key.to_string(), config(), size, EntrySource::Cache, now);
    }

    #[test]
    fn test_store_new() {
        let store: EntryStore<String> = EntryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.total_bytes(), 0);
    }

    #[test]
    fn test_insert_and_overwrite_accounting() {
        let mut store = EntryStore::new();

        put(&mut store, "a", 10, 0);
        put(&mut store, "b", 5, 0);
        assert_eq!(store.total_bytes(), 15);

        store.insert("a", "new".to_string(), config(), 3, EntrySource::Network, 50);
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_bytes(), 8);

        let entry = store.get("a").unwrap();
        assert_eq!(entry.created_at, 0);
        assert_eq!(entry.updated_at, 50);
        assert_eq!(entry.source, EntrySource::Network);
    }

    #[test]
    fn test_touch_bumps_access() {
        let mut store = EntryStore::new();
        put(&mut store, "a", 1, 0);

        let entry = store.touch("a", 42).unwrap();
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.last_accessed, 42);
        assert!(store.touch("missing", 42).is_none());
    }

    #[test]
    fn test_remove_updates_bytes() {
        let mut store = EntryStore::new();
        put(&mut store, "a", 10, 0);

        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert_eq!(store.total_bytes(), 0);
    }

    #[test]
    fn test_count_ceiling_evicts_least_recently_accessed() {
        let mut store = EntryStore::new();
        put(&mut store, "k1", 1, 0);
        put(&mut store, "k2", 1, 0);
        store.touch("k1", 1);
        put(&mut store, "k3", 1, 2);

        let evicted = store.enforce_limits("k3", 2, &roomy());

        assert_eq!(evicted, vec!["k2".to_string()]);
        assert!(store.get("k1").is_some());
        assert_eq!(store.counters().evictions, 1);
    }

    #[test]
    fn test_aggressive_cleanup_removes_fraction() {
        let policy = MemoryPolicy {
            max_total_bytes: 100,
            pressure_threshold: 0.8,
            emergency_threshold: 0.95,
            aggressive_eviction_fraction: 0.25,
            emergency_retain_fraction: 0.1,
        };
        let mut store = EntryStore::new();
        for i in 0..8 {
            put(&mut store, &format!("k{}", i), 10, i);
        }
        // 80 of 100 bytes: aggressive tier, 25% of 8 entries
        let evicted = store.enforce_limits("k7", 1000, &policy);

        assert_eq!(evicted, vec!["k0".to_string(), "k1".to_string()]);
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn test_emergency_cleanup_keeps_hottest() {
        let policy = MemoryPolicy {
            max_total_bytes: 100,
            pressure_threshold: 0.5,
            emergency_threshold: 0.9,
            aggressive_eviction_fraction: 0.25,
            emergency_retain_fraction: 0.2,
        };
        let mut store = EntryStore::new();
        for i in 0..10 {
            put(&mut store, &format!("k{}", i), 10, i);
        }
        store.touch("k0", 20);

        let evicted = store.enforce_limits("k9", 1000, &policy);

        assert_eq!(evicted.len(), 8);
        assert!(store.get("k0").is_some());
        assert!(store.get("k9").is_some());
    }

    #[test]
    fn test_hard_byte_ceiling() {
        let policy = MemoryPolicy {
            max_total_bytes: 25,
            pressure_threshold: 2.0,
            emergency_threshold: 3.0,
            ..MemoryPolicy::default()
        };
        let mut store = EntryStore::new();
        put(&mut store, "a", 10, 0);
        put(&mut store, "b", 10, 1);
        put(&mut store, "c", 10, 2);

        let evicted = store.enforce_limits("c", 1000, &policy);

        assert_eq!(evicted, vec!["a".to_string()]);
        assert!(store.total_bytes() <= 25);
    }

    #[test]
    fn test_protected_key_survives() {
        let mut store = EntryStore::new();
        put(&mut store, "only", 10, 0);

        let evicted = store.enforce_limits("only", 0, &roomy());
        assert!(evicted.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_expired() {
        let mut store = EntryStore::new();
        put(&mut store, "old", 1, 0);
        put(&mut store, "new", 1, 150);

        let removed = store.remove_expired(200);

        assert_eq!(removed, vec!["old".to_string()]);
        assert!(store.get("new").is_some());
    }

    #[test]
    fn test_remove_where_and_drain() {
        let mut store = EntryStore::new();
        put(&mut store, "vehicles:1", 1, 0);
        put(&mut store, "routes:1", 1, 1);
        put(&mut store, "vehicles:2", 1, 2);

        let removed = store.remove_where(|e| e.key.starts_with("vehicles:"));
        assert_eq!(removed, vec!["vehicles:1".to_string(), "vehicles:2".to_string()]);

        let drained = store.drain();
        assert_eq!(drained, vec!["routes:1".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot() {
        let mut store = EntryStore::new();
        put(&mut store, "vehicles:1", 10, 0);
        put(&mut store, "vehicles:2", 10, 100);
        put(&mut store, "routes:1", 10, 150);
        store.record_hit();
        store.record_miss();

        let stats = store.snapshot(210, &roomy());

        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.stale_entries, 1);
        assert_eq!(stats.valid_entries, 1);
        assert_eq!(stats.total_bytes, 30);
        assert_eq!(stats.entries_by_prefix["vehicles"], 2);
        assert_eq!(stats.entries_by_prefix["routes"], 1);
        assert_eq!(stats.hit_rate, 0.5);
        assert!(!stats.memory_pressure);
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut store = EntryStore::new();
        put(&mut store, "a", 1, 0);
        store.record_hit();

        store.reset();

        assert!(store.is_empty());
        assert_eq!(store.counters(), CacheCounters::new());
    }
}
