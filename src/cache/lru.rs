//! Access Order Module
//!
//! Recency ordering of keys for LRU eviction.

use std::collections::VecDeque;

// == Access Order ==
/// Tracks keys by last access.
///
/// Keys are stored in a VecDeque where:
/// - Front = Most recently accessed
/// - Back = Least recently accessed
///
/// Every read and write touches its key, so the back of the queue is always
/// the entry with the oldest `last_accessed`, with ties broken by touch order.
#[derive(Debug, Default)]
pub struct AccessOrder {
    order: VecDeque<String>,
}

impl AccessOrder {
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Marks a key as just accessed (moves to front).
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    // == Coldest ==
    /// Returns the least recently accessed key other than `protected`.
    pub fn coldest_except(&self, protected: &str) -> Option<&str> {
        self.order
            .iter()
            .rev()
            .map(String::as_str)
            .find(|k| *k != protected)
    }

    /// Keys from coldest to hottest.
    pub fn iter_coldest(&self) -> impl Iterator<Item = &str> {
        self.order.iter().rev().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }
}
