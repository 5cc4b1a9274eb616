//! Cache Events Module
//!
//! Pub/sub layer for cache-state observers. Listeners subscribe with a key
//! pattern and are called synchronously, in subscription order, for every
//! matching event.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;

// == Event Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEventKind {
    Hit,
    Miss,
    Updated,
    Cleared,
    Expired,
    Evicted,
}

// == Cache Event ==
/// A single cache lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    pub key: String,
    /// When the triggering mutation happened (Unix milliseconds)
    pub timestamp: u64,
}

impl CacheEvent {
    pub fn new(kind: CacheEventKind, key: impl Into<String>, timestamp: u64) -> Self {
        Self {
            kind,
            key: key.into(),
            timestamp,
        }
    }
}

// == Key Pattern ==
/// Which keys a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    /// Matches one key exactly
    Exact(String),
    /// Matches every key starting with the prefix
    Prefix(String),
}

impl KeyPattern {
    /// Parses `"vehicles:*"` as a prefix and anything else as an exact key.
    ///
    /// A lone `"*"` matches every key.
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => KeyPattern::Prefix(prefix.to_string()),
            None => KeyPattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Exact(exact) => exact == key,
            KeyPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
        }
    }
}

impl From<&str> for KeyPattern {
    fn from(pattern: &str) -> Self {
        KeyPattern::parse(pattern)
    }
}

// == Event Bus ==
type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    pattern: KeyPattern,
    listener: Listener,
}

#[derive(Default)]
struct Registry {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Subscriber list with isolated, synchronous delivery.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    // == Subscribe ==
    /// Registers `listener` for keys matching `pattern`.
    pub fn subscribe<L>(&self, pattern: impl Into<KeyPattern>, listener: L) -> Subscription
    where
        L: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.subscribers.lock().push(Subscriber {
            id,
            pattern: pattern.into(),
            listener: Arc::new(listener),
        });
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    // == Publish ==
    /// Delivers each event to every matching listener.
    ///
    /// The subscriber lock is released before any listener runs, so
    /// listeners may subscribe, unsubscribe or call back into the cache.
    /// A panicking listener is logged and skipped.
    pub fn publish(&self, events: impl IntoIterator<Item = CacheEvent>) {
        for event in events {
            let listeners: Vec<Listener> = self
                .registry
                .subscribers
                .lock()
                .iter()
                .filter(|s| s.pattern.matches(&event.key))
                .map(|s| Arc::clone(&s.listener))
                .collect();

            for listener in listeners {
                if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                    error!(
                        "Cache event listener panicked on {:?} for '{}'",
                        event.kind, event.key
                    );
                }
            }
        }
    }

    /// Drops every subscription.
    pub fn clear(&self) {
        self.registry.subscribers.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.lock().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// == Subscription ==
/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}
