//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with freshness tracking.

use serde::Serialize;

use crate::config::CacheConfig;

// == Entry Source ==
/// Provenance of the value an entry currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// Written by a successful fetch
    Network,
    /// Written directly, or served as a fallback after a failed fetch
    Cache,
    /// Served while the environment reported offline
    Offline,
}

// == Freshness ==
/// Where an entry's age falls relative to a config's windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// `age < ttl`
    Fresh,
    /// `ttl <= age < max_age`
    Stale,
    /// `age >= max_age`
    Expired,
}

impl Freshness {
    /// Classifies an age in milliseconds.
    ///
    /// Expiry is checked first, so a config with `max_age < ttl` simply has
    /// no stale window.
    pub fn classify(age_ms: u64, config: &CacheConfig) -> Self {
        if age_ms >= config.max_age_ms() {
            Freshness::Expired
        } else if age_ms >= config.ttl_ms() {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// True for anything younger than `max_age`.
    pub fn is_usable(self) -> bool {
        !matches!(self, Freshness::Expired)
    }
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// Key this entry is stored under
    pub key: String,
    /// Last fetched or set value
    pub data: T,
    /// Policy the entry was last written with
    pub config: CacheConfig,
    /// First write timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last write timestamp (Unix milliseconds)
    pub updated_at: u64,
    /// Last read or write timestamp (Unix milliseconds)
    pub last_accessed: u64,
    /// Estimated serialized size in bytes
    pub size: usize,
    /// Number of reads that served this entry
    pub access_count: u64,
    /// Where the held value came from
    pub source: EntrySource,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new entry written at `now`.
    pub fn new(
        key: String,
        data: T,
        config: CacheConfig,
        size: usize,
        source: EntrySource,
        now: u64,
    ) -> Self {
        Self {
            key,
            data,
            config,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            size,
            access_count: 0,
            source,
        }
    }

    // == Age ==
    /// Milliseconds since the last write. A clock that went backwards reads as 0.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.updated_at)
    }

    /// Freshness against a caller-supplied config.
    pub fn freshness_under(&self, config: &CacheConfig, now: u64) -> Freshness {
        Freshness::classify(self.age_ms(now), config)
    }

    /// Freshness against the entry's own config.
    pub fn freshness(&self, now: u64) -> Freshness {
        self.freshness_under(&self.config, now)
    }

    // == Is Expired ==
    /// Checks if the entry is past its own `max_age`.
    ///
    /// Boundary condition: an entry whose age equals `max_age` is expired.
    pub fn is_expired(&self, now: u64) -> bool {
        self.freshness(now) == Freshness::Expired
    }

    // == Time To Live ==
    /// Returns milliseconds until the entry turns stale, 0 once it has.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.config.ttl_ms().saturating_sub(self.age_ms(now))
    }

    // == Record Access ==
    pub fn record_access(&mut self, now: u64) {
        self.access_count += 1;
        self.last_accessed = now;
    }

    /// Replaces the value, keeping `created_at` and `access_count`.
    pub fn overwrite(
        &mut self,
        data: T,
        config: CacheConfig,
        size: usize,
        source: EntrySource,
        now: u64,
    ) {
        self.data = data;
        self.config = config;
        self.size = size;
        self.source = source;
        self.updated_at = now;
        self.last_accessed = now;
    }
}

// == Utility Functions ==
/// Estimates a value's size as its JSON-encoded byte length.
pub fn estimate_size<T: Serialize>(value: &T) -> serde_json::Result<usize> {
    serde_json::to_vec(value).map(|bytes| bytes.len())
}
