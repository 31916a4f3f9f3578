use cartorio_persist::{SaveError, Saver};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Inner<T> {
    calls: Mutex<Vec<T>>,
    latency: Duration,
    failures_left: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Saver that records every payload, with optional latency and failures
///
/// Clones share the same record.
pub struct RecordingSaver<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RecordingSaver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for RecordingSaver<T> {
    fn default() -> Self {
        Self::with_latency(Duration::ZERO)
    }
}

impl<T> RecordingSaver<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every save takes `latency` of tokio time
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                calls: Mutex::new(Vec::new()),
                latency,
                failures_left: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Fail the next `count` saves
    pub fn fail_next(&self, count: usize) {
        self.inner.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().len()
    }

    /// Highest number of saves observed running at once
    pub fn max_concurrency(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

impl<T: Clone> RecordingSaver<T> {
    /// Payloads in call order
    pub fn calls(&self) -> Vec<T> {
        self.inner.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl<T: Send + Sync + Clone + 'static> Saver<T> for RecordingSaver<T> {
    async fn save(&self, payload: T) -> Result<(), SaveError> {
        self.inner.calls.lock().push(payload);
        let running = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.inner.latency.is_zero() {
            tokio::time::sleep(self.inner.latency).await;
        }
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fail = self
            .inner
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            Err(SaveError::new("scripted save failure"))
        } else {
            Ok(())
        }
    }
}
