//! Unified Cache - an in-memory cache manager
//!
//! Read-through caching with TTL staleness, max-age expiration,
//! stale-while-revalidate, in-flight fetch deduplication, offline fallback,
//! LRU and memory-pressure eviction, and pattern-based change events.

pub mod api;
pub mod cache;
pub mod config;
pub mod environment;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheEvent, CacheEventKind, CacheManager, CacheStats, StaleRead, Subscription};
pub use config::{CacheConfig, ConfigOverrides, ManagerSettings, MemoryPolicy};
pub use environment::{Clock, Connectivity, ManualClock, OnlineFlag, SystemClock};
pub use error::{CacheError, FetchError, Result};
pub use tasks::spawn_cleanup_task;
