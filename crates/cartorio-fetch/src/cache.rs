//! Time-boxed single-entry cache over a [`KeyValueStore`]
//!
//! Entries are stored as `{"value": ..., "cachedAt": <epoch ms>}` under one
//! fixed key. An entry is valid while `now - cachedAt < ttl`; expired,
//! unparsable or incomplete entries are removed when read and reported as a
//! miss.

use crate::store::SharedStore;
use cartorio_context::{SharedClock, SystemClock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

/// Persisted cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResource<T> {
    /// Cached value
    pub value: T,
    /// Write time, milliseconds since the Unix epoch
    #[serde(rename = "cachedAt")]
    pub cached_at: i64,
}

#[derive(Serialize)]
struct CachedResourceRef<'a, T> {
    value: &'a T,
    #[serde(rename = "cachedAt")]
    cached_at: i64,
}

/// TTL cache for one value of type `T`
pub struct TtlCache<T> {
    store: SharedStore,
    key: String,
    ttl: Duration,
    clock: SharedClock,
    _value: PhantomData<fn() -> T>,
}

impl<T> TtlCache<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create cache stored under `key`
    pub fn new(store: SharedStore, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
            clock: SystemClock::shared(),
            _value: PhantomData,
        }
    }

    /// With clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Storage key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Time-to-live
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read the cached value if present and still fresh
    pub fn read(&self) -> Option<T> {
        let raw = self.store.get(&self.key)?;

        let entry: CachedResource<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "dropping corrupt cache entry");
                self.store.remove(&self.key);
                return None;
            }
        };

        let age_ms = self.clock.now_millis().saturating_sub(entry.cached_at);
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if age_ms >= ttl_ms {
            tracing::debug!(key = %self.key, age_ms, "cache entry expired");
            self.store.remove(&self.key);
            return None;
        }

        Some(entry.value)
    }

    /// Store `value` stamped with the current time
    pub fn write(&self, value: &T) {
        let entry = CachedResourceRef {
            value,
            cached_at: self.clock.now_millis(),
        };
        match serde_json::to_string(&entry) {
            Ok(raw) => self.store.set(&self.key, raw),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to serialize cache entry");
            }
        }
    }

    /// Remove the cached entry
    #[inline]
    pub fn invalidate(&self) {
        self.store.remove(&self.key);
    }
}

impl<T> fmt::Debug for TtlCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
