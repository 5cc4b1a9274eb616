//! Cache Manager Module
//!
//! Read-through cache engine: freshness checks, stale-while-revalidate,
//! in-flight fetch deduplication, offline fallback, eviction and events.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::cache::entry::{estimate_size, CacheEntry, EntrySource, Freshness};
use crate::cache::events::{CacheEvent, CacheEventKind, EventBus, KeyPattern, Subscription};
use crate::cache::stats::CacheStats;
use crate::cache::store::EntryStore;
use crate::config::{CacheConfig, ManagerSettings};
use crate::environment::{Clock, Connectivity, OnlineFlag, SystemClock};
use crate::error::{CacheError, FetchError, Result};
use crate::tasks::spawn_cleanup_task;

type SharedFlight<T> = Shared<BoxFuture<'static, Result<T>>>;

/// One running fetch for one key.
struct InFlight<T> {
    id: u64,
    started_at: u64,
    result: SharedFlight<T>,
    abort: AbortHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlightMode {
    /// Reuse the registered flight if there is one
    Join,
    /// Always start a new flight and register it
    Force,
}

enum ReadPlan<T> {
    Serve(T),
    Revalidate(T),
    Fetch,
}

// == Stale Read ==
/// Result of [`CacheManager::get_cached_stale`].
#[derive(Debug, Clone, PartialEq)]
pub struct StaleRead<T> {
    pub data: T,
    /// The entry is past its own ttl
    pub is_stale: bool,
}

struct Inner<T> {
    store: Mutex<EntryStore<T>>,
    in_flight: Mutex<HashMap<String, InFlight<T>>>,
    events: EventBus,
    settings: ManagerSettings,
    clock: Arc<dyn Clock>,
    connectivity: Arc<dyn Connectivity>,
    next_flight: AtomicU64,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

// == Cache Manager ==
/// Explicitly owned cache instance.
///
/// Cloning is cheap and every clone shares the same table, in-flight map
/// and subscribers. Separate instances share nothing.
pub struct CacheManager<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CacheManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Non-owning handle used by background tasks.
pub struct WeakCacheManager<T> {
    inner: Weak<Inner<T>>,
}

impl<T> WeakCacheManager<T> {
    pub fn upgrade(&self) -> Option<CacheManager<T>> {
        self.inner.upgrade().map(|inner| CacheManager { inner })
    }
}

impl<T> CacheManager<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a manager on the system clock that always reports online.
    pub fn new(settings: ManagerSettings) -> Self {
        Self::with_environment(
            settings,
            Arc::new(SystemClock),
            Arc::new(OnlineFlag::default()),
        )
    }

    /// Creates a manager with injected time and connectivity sources.
    pub fn with_environment(
        settings: ManagerSettings,
        clock: Arc<dyn Clock>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        if let Err(err) = settings.validate() {
            warn!("Cache manager created with invalid settings: {}", err);
        }
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(EntryStore::new()),
                in_flight: Mutex::new(HashMap::new()),
                events: EventBus::new(),
                settings,
                clock,
                connectivity,
                next_flight: AtomicU64::new(0),
                cleanup_task: Mutex::new(None),
            }),
        }
    }

    // == Get ==
    /// Returns the cached value for `key`, fetching it when needed.
    ///
    /// Fresh data is returned without calling `fetcher`. Stale data under a
    /// stale-while-revalidate config is returned immediately while a
    /// background refresh runs. Otherwise the caller waits on a fetch, shared
    /// with every concurrent caller for the same key. While offline, any
    /// existing entry is returned regardless of age.
    pub async fn get<F, Fut, E>(&self, key: &str, fetcher: F, config: &CacheConfig) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.read_through(key, fetcher, config, false).await
    }

    /// Like [`get`](Self::get), but a failed fetch falls back to any existing
    /// entry, even an expired one, instead of returning the error.
    pub async fn get_or_stale<F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        config: &CacheConfig,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.read_through(key, fetcher, config, true).await
    }

    async fn read_through<F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        config: &CacheConfig,
        allow_stale_on_error: bool,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let now = self.now();
        let online = self.inner.connectivity.is_online();
        let mut events = Vec::new();
        let plan = {
            let mut store = self.inner.store.lock();
            plan_read(&mut store, key, config, now, online, &mut events)
        };
        self.inner.events.publish(events);

        match plan {
            ReadPlan::Serve(data) => {
                debug!("Cache hit for '{}' (online: {})", key, online);
                Ok(data)
            }
            ReadPlan::Revalidate(data) => {
                debug!("Serving stale '{}' while revalidating", key);
                let _background = self.start_flight(key, fetcher, config, FlightMode::Join);
                Ok(data)
            }
            ReadPlan::Fetch => {
                let flight = self.start_flight(key, fetcher, config, FlightMode::Join);
                match flight.await {
                    Ok(data) => Ok(data),
                    Err(err) if allow_stale_on_error => self.fallback(key, err),
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Serves whatever is stored for `key` after a failed fetch.
    fn fallback(&self, key: &str, err: CacheError) -> Result<T> {
        let now = self.now();
        let source = if self.inner.connectivity.is_online() {
            EntrySource::Cache
        } else {
            EntrySource::Offline
        };

        let mut store = self.inner.store.lock();
        match store.touch(key, now) {
            Some(entry) => {
                warn!("Fetch for '{}' failed, serving cached data: {}", key, err);
                entry.source = source;
                Ok(entry.data.clone())
            }
            None => Err(err),
        }
    }

    // == Force Refresh ==
    /// Fetches `key` unconditionally and stores the result.
    ///
    /// The new fetch becomes the one later `get` calls join. Callers already
    /// waiting on an older fetch keep waiting on it; both fetches write on
    /// completion, so the last to finish wins.
    pub async fn force_refresh<F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        config: &CacheConfig,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.start_flight(key, fetcher, config, FlightMode::Force)
            .await
    }

    fn start_flight<F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        config: &CacheConfig,
        mode: FlightMode,
    ) -> SharedFlight<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        // Held until the record is inserted, so a fast flight cannot try to
        // deregister before it is registered.
        let mut in_flight = self.inner.in_flight.lock();
        if mode == FlightMode::Join {
            if let Some(flight) = in_flight.get(key) {
                debug!("Joining in-flight fetch for '{}'", key);
                return flight.result.clone();
            }
        }

        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let guard = FlightGuard {
            manager: self.clone(),
            key: key.to_string(),
            id,
        };
        let config = config.clone();
        let task = tokio::spawn(async move {
            let outcome = fetcher()
                .await
                .map_err(|e| CacheError::Fetch(FetchError::new(e)));
            match &outcome {
                Ok(data) => guard.manager.store_fetched(&guard.key, data.clone(), &config),
                Err(err) => warn!("Fetch for '{}' failed: {}", guard.key, err),
            }
            drop(guard);
            outcome
        });

        let abort = task.abort_handle();
        let task_key = key.to_string();
        let result = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) if join_error.is_panic() => Err(CacheError::Fetch(
                    FetchError::new(anyhow::anyhow!("fetcher for '{}' panicked", task_key)),
                )),
                Err(_) => Err(CacheError::Cancelled(task_key)),
            }
        }
        .boxed()
        .shared();

        debug!("Started fetch #{} for '{}' ({:?})", id, key, mode);
        in_flight.insert(
            key.to_string(),
            InFlight {
                id,
                started_at: self.now(),
                result: result.clone(),
                abort,
            },
        );
        result
    }

    fn store_fetched(&self, key: &str, data: T, config: &CacheConfig) {
        if let Err(err) = self.write(key, data, config, EntrySource::Network) {
            warn!("Fetched value for '{}' was not cached: {}", key, err);
        }
    }

    // == Set ==
    /// Stores `data` under `key`.
    ///
    /// A value larger than `config.max_size` (or the aggregate byte ceiling)
    /// is rejected with [`CacheError::EntryTooLarge`] and any prior entry is
    /// left untouched. Returns the estimated size that was stored.
    pub fn set(&self, key: &str, data: T, config: &CacheConfig) -> Result<usize> {
        self.write(key, data, config, EntrySource::Cache)
    }

    fn write(
        &self,
        key: &str,
        data: T,
        config: &CacheConfig,
        source: EntrySource,
    ) -> Result<usize> {
        let size = estimate_size(&data).map_err(|e| CacheError::serialization(key, e))?;
        let memory = &self.inner.settings.memory;
        let limit = config
            .max_size
            .map_or(memory.max_total_bytes, |max| max.min(memory.max_total_bytes));
        if size > limit {
            warn!(
                "Rejected write of '{}': {} bytes exceeds limit of {}",
                key, size, limit
            );
            return Err(CacheError::EntryTooLarge {
                key: key.to_string(),
                size,
                limit,
            });
        }

        let now = self.now();
        let max_entries = config
            .max_entries
            .unwrap_or(self.inner.settings.max_entries);
        let evicted = {
            let mut store = self.inner.store.lock();
            store.insert(key, data, config.clone(), size, source, now);
            store.enforce_limits(key, max_entries, memory)
        };

        let mut events: Vec<CacheEvent> = evicted
            .into_iter()
            .map(|k| CacheEvent::new(CacheEventKind::Evicted, k, now))
            .collect();
        events.push(CacheEvent::new(CacheEventKind::Updated, key, now));
        self.inner.events.publish(events);
        Ok(size)
    }

    // == Cached Reads ==
    /// Returns the data if it is younger than `config.max_age`. Never fetches.
    pub fn get_cached(&self, key: &str, config: &CacheConfig) -> Option<T> {
        let now = self.now();
        let data = {
            let mut store = self.inner.store.lock();
            let usable = store
                .get(key)
                .is_some_and(|e| e.freshness_under(config, now).is_usable());
            if usable {
                serve_entry(&mut store, key, now, None)
            } else {
                store.record_miss();
                None
            }
        };

        let kind = if data.is_some() {
            CacheEventKind::Hit
        } else {
            CacheEventKind::Miss
        };
        self.inner.events.publish([CacheEvent::new(kind, key, now)]);
        data
    }

    /// Returns any stored data regardless of age.
    pub fn get_cached_stale(&self, key: &str) -> Option<StaleRead<T>> {
        let now = self.now();
        let store = self.inner.store.lock();
        let entry = store.get(key)?;
        Some(StaleRead {
            data: entry.data.clone(),
            is_stale: entry.freshness(now) != Freshness::Fresh,
        })
    }

    /// True if an entry exists and is younger than `config.max_age`.
    pub fn has(&self, key: &str, config: &CacheConfig) -> bool {
        let now = self.now();
        self.inner
            .store
            .lock()
            .get(key)
            .is_some_and(|e| e.freshness_under(config, now).is_usable())
    }

    /// Snapshot of the entry and its metadata.
    pub fn entry(&self, key: &str) -> Option<CacheEntry<T>> {
        self.inner.store.lock().get(key).cloned()
    }

    // == Clear ==
    /// Removes one entry. A fetch already running for `key` still writes
    /// when it completes.
    pub fn clear(&self, key: &str) -> bool {
        let removed = self.inner.store.lock().remove(key).is_some();
        if removed {
            debug!("Cleared '{}'", key);
            self.publish_all(CacheEventKind::Cleared, vec![key.to_string()]);
        }
        removed
    }

    /// Removes every entry whose key matches `pattern`.
    pub fn clear_pattern(&self, pattern: &Regex) -> usize {
        let removed = self
            .inner
            .store
            .lock()
            .remove_where(|entry| pattern.is_match(&entry.key));
        let count = removed.len();
        debug!("Cleared {} entries matching /{}/", count, pattern);
        self.publish_all(CacheEventKind::Cleared, removed);
        count
    }

    /// Empties the table and forgets every in-flight record.
    pub fn clear_all(&self) -> usize {
        let removed = self.inner.store.lock().drain();
        self.inner.in_flight.lock().clear();
        let count = removed.len();
        info!("Cleared all {} cache entries", count);
        self.publish_all(CacheEventKind::Cleared, removed);
        count
    }

    // == Cleanup ==
    /// Removes entries past their own `max_age`. Returns the count removed.
    pub fn cleanup(&self) -> usize {
        let now = self.now();
        let removed = self.inner.store.lock().remove_expired(now);
        let count = removed.len();
        self.publish_all(CacheEventKind::Expired, removed);
        count
    }

    fn publish_all(&self, kind: CacheEventKind, keys: Vec<String>) {
        let now = self.now();
        self.inner
            .events
            .publish(keys.into_iter().map(|key| CacheEvent::new(kind, key, now)));
    }

    // == Subscribe ==
    /// Calls `listener` for every event on keys matching `pattern`
    /// (`"routes:1"` exactly, or `"vehicles:*"` by prefix).
    ///
    /// The bus owns the listener until [`CacheManager::destroy`], so a
    /// listener that reads back from the cache should capture a
    /// [`WeakCacheManager`] from [`downgrade`](Self::downgrade). A strong
    /// clone would keep the manager alive after every other handle is gone.
    pub fn subscribe<L>(&self, pattern: impl Into<KeyPattern>, listener: L) -> Subscription
    where
        L: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(pattern, listener)
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let now = self.now();
        let mut stats = self
            .inner
            .store
            .lock()
            .snapshot(now, &self.inner.settings.memory);
        stats.in_flight = self.inner.in_flight.lock().len();
        stats
    }

    /// Start time (Unix milliseconds) of the registered fetch for `key`.
    pub fn in_flight_since(&self, key: &str) -> Option<u64> {
        self.inner.in_flight.lock().get(key).map(|f| f.started_at)
    }

    // == Lifecycle ==
    /// Starts the periodic cleanup sweep at the configured interval,
    /// replacing any sweep already running.
    pub fn start_cleanup_task(&self) {
        let interval = Duration::from_secs(self.inner.settings.cleanup_interval);
        let handle = spawn_cleanup_task(self, interval);
        if let Some(previous) = self.inner.cleanup_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stops background work and drops all state.
    ///
    /// Aborts the cleanup sweep and every registered fetch (their waiters
    /// receive [`CacheError::Cancelled`]), then drops entries, counters and
    /// subscribers. The manager remains usable.
    pub fn destroy(&self) {
        if let Some(handle) = self.inner.cleanup_task.lock().take() {
            handle.abort();
        }

        let flights: Vec<InFlight<T>> = self
            .inner
            .in_flight
            .lock()
            .drain()
            .map(|(_, flight)| flight)
            .collect();
        for flight in &flights {
            flight.abort.abort();
        }

        self.inner.store.lock().reset();
        self.inner.events.clear();
        info!(
            "Cache manager destroyed, cancelled {} in-flight fetches",
            flights.len()
        );
    }

    // == Accessors ==
    pub fn downgrade(&self) -> WeakCacheManager<T> {
        WeakCacheManager {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    pub fn len(&self) -> usize {
        self.inner.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.lock().is_empty()
    }

    fn now(&self) -> u64 {
        self.inner.clock.now_ms()
    }
}

impl<T> Default for CacheManager<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(ManagerSettings::default())
    }
}

impl<T> fmt::Debug for CacheManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("entries", &self.inner.store.lock().len())
            .field("in_flight", &self.inner.in_flight.lock().len())
            .field("events", &self.inner.events)
            .finish()
    }
}

// == Read Planning ==
/// Decides how `read_through` answers, recording hits/misses and queuing events.
fn plan_read<T: Clone>(
    store: &mut EntryStore<T>,
    key: &str,
    config: &CacheConfig,
    now: u64,
    online: bool,
    events: &mut Vec<CacheEvent>,
) -> ReadPlan<T> {
    let Some(freshness) = store.get(key).map(|e| e.freshness_under(config, now)) else {
        store.record_miss();
        events.push(CacheEvent::new(CacheEventKind::Miss, key, now));
        return ReadPlan::Fetch;
    };

    match freshness {
        Freshness::Fresh => serve(store, key, now, None, events),
        _ if !online => serve(store, key, now, Some(EntrySource::Offline), events),
        Freshness::Stale if config.stale_while_revalidate => {
            match serve(store, key, now, None, events) {
                ReadPlan::Serve(data) => ReadPlan::Revalidate(data),
                other => other,
            }
        }
        Freshness::Stale => {
            store.record_miss();
            events.push(CacheEvent::new(CacheEventKind::Miss, key, now));
            ReadPlan::Fetch
        }
        Freshness::Expired => {
            store.record_miss();
            events.push(CacheEvent::new(CacheEventKind::Expired, key, now));
            events.push(CacheEvent::new(CacheEventKind::Miss, key, now));
            ReadPlan::Fetch
        }
    }
}

fn serve<T: Clone>(
    store: &mut EntryStore<T>,
    key: &str,
    now: u64,
    source: Option<EntrySource>,
    events: &mut Vec<CacheEvent>,
) -> ReadPlan<T> {
    match serve_entry(store, key, now, source) {
        Some(data) => {
            events.push(CacheEvent::new(CacheEventKind::Hit, key, now));
            ReadPlan::Serve(data)
        }
        None => ReadPlan::Fetch,
    }
}

/// Touches the entry, optionally re-labels its source, and counts a hit.
fn serve_entry<T: Clone>(
    store: &mut EntryStore<T>,
    key: &str,
    now: u64,
    source: Option<EntrySource>,
) -> Option<T> {
    let data = {
        let entry = store.touch(key, now)?;
        if let Some(source) = source {
            entry.source = source;
        }
        entry.data.clone()
    };
    store.record_hit();
    Some(data)
}

// == Flight Guard ==
/// Deregisters a flight when its task finishes, panics or is aborted.
///
/// Only removes the record if it still belongs to this flight; a forced
/// refresh may have replaced it.
struct FlightGuard<T> {
    manager: CacheManager<T>,
    key: String,
    id: u64,
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        let mut in_flight = self.manager.inner.in_flight.lock();
        if in_flight.get(&self.key).is_some_and(|f| f.id == self.id) {
            in_flight.remove(&self.key);
        }
    }
}
