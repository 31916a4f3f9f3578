//! Key-value store contract
//!
//! The TTL cache persists through this narrow string-to-string interface so
//! it can sit on top of browser-style local storage, a file, or memory.

use moka::sync::Cache;
use std::fmt::Debug;
use std::sync::Arc;

/// Synchronous string key-value store
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read value for `key`
    fn get(&self, key: &str) -> Option<String>;

    /// Write value for `key`
    fn set(&self, key: &str, value: String);

    /// Delete `key`
    fn remove(&self, key: &str);
}

/// Shared, dynamically dispatched store
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Bounded in-process store
///
/// Eviction is capacity-based only; expiry is the TTL cache's job.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Cache<String, String>,
}

impl MemoryStore {
    /// Create store holding at most `max_capacity` entries
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Whether `key` is present
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }
}

impl Default for MemoryStore {
    /// Create store with default capacity (1,000 entries)
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String) {
        self.inner.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.inner.invalidate(key);
    }
}
