//! Cache Module
//!
//! In-memory cache engine with TTL/max-age freshness, stale-while-revalidate,
//! fetch deduplication, LRU and memory-pressure eviction, and change events.

mod entry;
mod events;
mod lru;
mod manager;
mod stats;
mod store;


// Re-export public types
pub use entry::{estimate_size, CacheEntry, EntrySource, Freshness};
pub use events::{CacheEvent, CacheEventKind, EventBus, KeyPattern, Subscription};
pub use lru::AccessOrder;
pub use manager::{CacheManager, StaleRead, WeakCacheManager};
pub use stats::{key_prefix, CacheCounters, CacheStats};
pub use store::EntryStore;
