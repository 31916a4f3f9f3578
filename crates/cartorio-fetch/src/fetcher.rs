//! Cached, retrying fetch of one keyed resource

use crate::cache::TtlCache;
use crate::error::SourceError;
use crate::retry::RetryPolicy;
use crate::source::ResourceSource;
use crate::store::SharedStore;
use cartorio_context::{SharedClock, SystemClock};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Fetcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Storage key of the cache entry
    pub cache_key: String,
    /// Cache time-to-live in milliseconds
    pub ttl_ms: u64,
    /// Delay after each failed attempt, in milliseconds
    pub retry_delays_ms: Vec<u64>,
}

impl FetchConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With cache key
    #[inline]
    #[must_use]
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = key.into();
        self
    }

    /// With TTL
    #[inline]
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With retry delays in milliseconds
    #[inline]
    #[must_use]
    pub fn with_retry_delays(mut self, delays_ms: Vec<u64>) -> Self {
        self.retry_delays_ms = delays_ms;
        self
    }

    /// Cache TTL
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Retry policy
    #[inline]
    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::from_millis(self.retry_delays_ms.clone())
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_key: "cartorio.profile".to_string(),
            ttl_ms: 300_000,
            retry_delays_ms: vec![500, 1_000, 2_000],
        }
    }
}

/// Retry-with-backoff fetch guarded by a [`TtlCache`]
pub struct CachedFetcher<T> {
    source: Arc<dyn ResourceSource<T>>,
    cache: TtlCache<T>,
    retry: RetryPolicy,
    clock: SharedClock,
    last_error: Mutex<Option<SourceError>>,
    last_retrieved_at: Mutex<Option<DateTime<Utc>>>,
}

impl<T> CachedFetcher<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create fetcher
    pub fn new(source: impl ResourceSource<T> + 'static, store: SharedStore, config: FetchConfig) -> Self {
        Self {
            source: Arc::new(source),
            cache: TtlCache::new(store, config.cache_key.clone(), config.ttl()),
            retry: config.retry(),
            clock: SystemClock::shared(),
            last_error: Mutex::new(None),
            last_retrieved_at: Mutex::new(None),
        }
    }

    /// With clock, used for cache timestamps and retrieval times
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.cache = self.cache.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Fetch the resource for `key`
    ///
    /// Serves a fresh, matching cache entry unless `skip_cache` is set.
    /// Otherwise runs the retry schedule; the first success is cached and
    /// returned. `None` means every attempt failed; see [`last_error`](Self::last_error).
    pub async fn fetch(&self, key: &str, skip_cache: bool) -> Option<T> {
        if !skip_cache {
            if let Some(value) = self.cache.read() {
                if self.source.matches(key, &value) {
                    tracing::debug!(key, "cache hit");
                    self.mark_retrieved();
                    return Some(value);
                }
                tracing::debug!(key, "cached entry belongs to another key");
            }
        }

        let value = self.fetch_with_retry(key).await?;
        self.cache.write(&value);
        self.mark_retrieved();
        Some(value)
    }

    async fn fetch_with_retry(&self, key: &str) -> Option<T> {
        let attempts = self.retry.attempts();

        for attempt in 0..attempts {
            match self.source.fetch(key).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(key, attempt = attempt + 1, "fetch succeeded after retry");
                    }
                    *self.last_error.lock() = None;
                    return Some(value);
                }
                Err(err) => {
                    if err.is_not_found() {
                        tracing::debug!(key, attempt = attempt + 1, attempts, "resource not visible yet");
                    } else {
                        tracing::warn!(key, attempt = attempt + 1, attempts, error = %err, "fetch attempt failed");
                    }
                    *self.last_error.lock() = Some(err);

                    if let Some(delay) = self.retry.delay_after(attempt) {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::warn!(
            key,
            attempts,
            error = ?self.last_error.lock().as_ref(),
            "giving up on fetch"
        );
        None
    }

    /// Remove the cached entry
    ///
    /// Call before `fetch(key, true)` whenever the value may have changed
    /// out of band.
    #[inline]
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Error of the most recent failed attempt, cleared on success
    #[must_use]
    pub fn last_error(&self) -> Option<SourceError> {
        self.last_error.lock().clone()
    }

    /// When a value was last handed out
    #[must_use]
    pub fn last_retrieved_at(&self) -> Option<DateTime<Utc>> {
        *self.last_retrieved_at.lock()
    }

    /// Underlying cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &TtlCache<T> {
        &self.cache
    }

    fn mark_retrieved(&self) {
        *self.last_retrieved_at.lock() = Some(self.clock.now());
    }
}

impl<T> fmt::Debug for CachedFetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFetcher")
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
