//! In-memory cache with a fixed freshness window.
//!
//! Entries are never evicted: once older than the window they are only
//! reported as invalid, and callers must not use them to satisfy a read.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::types::Units;

/// Default freshness window in milliseconds.
pub const DEFAULT_WINDOW_MS: i64 = 60_000;

pub fn default_window() -> Duration {
    Duration::milliseconds(DEFAULT_WINDOW_MS)
}

/// Compose an opaque cache key as `{operation}_{city}_{units}`.
pub fn cache_key(operation: &str, city: &str, units: Units) -> String {
    format!("{}_{}_{}", operation, city, units.as_str())
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    written_at: DateTime<Utc>,
}

/// Key/value store with a per-entry write timestamp.
pub struct TimeWindowCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl<V> std::fmt::Debug for TimeWindowCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeWindowCache")
            .field("entries", &self.entries.lock().len())
            .field("window", &self.window)
            .finish()
    }
}

impl<V: Clone> TimeWindowCache<V> {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window,
            clock,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True iff an entry exists and `now - written_at < window`.
    pub fn is_valid(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|entry| now - entry.written_at < self.window)
    }

    /// Stored value regardless of age.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.lock().get(key).map(|entry| entry.value.clone())
    }

    /// Stored value only while it is still fresh.
    ///
    /// Checks validity and reads under one lock acquisition.
    pub fn get_fresh(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| now - entry.written_at < self.window)
            .map(|entry| entry.value.clone())
    }

    /// Replace any existing entry and reset its timestamp to now.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            written_at: self.clock.now(),
        };
        self.entries.lock().insert(key.into(), entry);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
