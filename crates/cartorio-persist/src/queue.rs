//! Debounced persistence queue
//!
//! # Ordering
//!
//! The store only ever receives the latest payload known at write time:
//! debounced payloads overwrite each other, and while a save is in flight new
//! payloads overwrite the single queued slot. When the running save settles
//! the queued payload (if any) is sent next, in a loop, until nothing is
//! queued.
//!
//! # Cancellation
//!
//! [`SaveQueue::cancel`] discards the debounced and queued payloads. A save
//! already handed to the [`Saver`] is never interrupted.

use crate::error::SaveError;
use crate::saver::Saver;
use cartorio_context::{SharedClock, SystemClock};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Callback invoked with every save failure
pub type ErrorCallback = Arc<dyn Fn(&SaveError) + Send + Sync>;

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaveQueueConfig {
    /// Debounce window in milliseconds
    pub debounce_ms: u64,
    /// When false every save request is a no-op
    pub enabled: bool,
}

impl SaveQueueConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With debounce window
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With enabled flag
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Debounce window
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SaveQueueConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            enabled: true,
        }
    }
}

/// Observable queue state
#[derive(Debug, Clone, Default)]
pub struct SaveQueueState {
    /// A save is currently running
    pub is_saving: bool,
    /// Failure of the most recent save, cleared by the next success
    pub last_error: Option<Arc<SaveError>>,
    /// Completion time of the most recent successful save
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Something was requested that the store does not reflect yet
    pub has_pending_changes: bool,
}

struct Slot<T> {
    enabled: bool,
    disposed: bool,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every timer (re)start and cancellation; a timer whose
    /// generation no longer matches must not fire.
    generation: u64,
    debounced: Option<T>,
    queued: Option<T>,
    in_flight: bool,
}

impl<T> Slot<T> {
    fn has_pending(&self) -> bool {
        self.in_flight || self.debounced.is_some() || self.queued.is_some()
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
        self.debounced = None;
    }
}

struct Shared<T> {
    saver: Arc<dyn Saver<T>>,
    delay: Duration,
    clock: SharedClock,
    on_error: Option<ErrorCallback>,
    slot: Mutex<Slot<T>>,
    state: watch::Sender<SaveQueueState>,
}

impl<T: Send + 'static> Shared<T> {
    fn fire_debounced(self: &Arc<Self>, generation: u64) {
        let mut slot = self.slot.lock();
        if slot.disposed || slot.generation != generation {
            return;
        }
        slot.timer = None;
        let Some(payload) = slot.debounced.take() else {
            return;
        };
        tracing::debug!("debounce elapsed, dispatching save");
        self.dispatch(&mut slot, payload);
    }

    /// Start a save or park the payload behind the running one.
    fn dispatch(self: &Arc<Self>, slot: &mut Slot<T>, payload: T) {
        if slot.in_flight {
            if slot.queued.replace(payload).is_some() {
                tracing::debug!("replaced queued payload with newer one");
            }
            return;
        }
        slot.in_flight = true;
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.drain(payload).await });
    }

    async fn drain(self: Arc<Self>, first: T) {
        let mut next = Some(first);
        while let Some(payload) = next.take() {
            self.state.send_modify(|s| s.is_saving = true);

            // a panicking saver counts as a failed save
            let outcome = AssertUnwindSafe(self.saver.save(payload))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(SaveError::new(panic_message(&*panic))));

            match outcome {
                Ok(()) => {
                    let saved_at = self.clock.now();
                    tracing::debug!(%saved_at, "save completed");
                    self.state.send_modify(|s| {
                        s.last_saved_at = Some(saved_at);
                        s.last_error = None;
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "save failed");
                    if let Some(on_error) = &self.on_error {
                        on_error(&err);
                    }
                    let err = Arc::new(err);
                    self.state.send_modify(|s| s.last_error = Some(err));
                }
            }

            next = {
                let mut slot = self.slot.lock();
                let queued = slot.queued.take();
                if queued.is_none() {
                    slot.in_flight = false;
                    let pending = slot.has_pending();
                    self.state.send_modify(|s| {
                        s.is_saving = false;
                        s.has_pending_changes = pending;
                    });
                }
                queued
            };
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("save panicked: {detail}")
}

/// Debounced, single-flight persistence queue
///
/// Owns its state exclusively. Dropping the queue disposes it: the debounce
/// timer is cancelled so nothing fires afterwards.
pub struct SaveQueue<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> SaveQueue<T> {
    /// Create queue with default configuration
    pub fn new(saver: impl Saver<T> + 'static) -> Self {
        Self::builder(saver).build()
    }

    /// Start building a queue around `saver`
    pub fn builder(saver: impl Saver<T> + 'static) -> SaveQueueBuilder<T> {
        SaveQueueBuilder {
            saver: Arc::new(saver),
            config: SaveQueueConfig::default(),
            clock: SystemClock::shared(),
            on_error: None,
        }
    }

    /// Record a change and (re)start the debounce timer
    ///
    /// Nothing is written before the timer fires; then only the most recent
    /// payload is saved. No-op when disabled.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn trigger_save(&self, payload: T) {
        let mut slot = self.shared.slot.lock();
        if !slot.enabled || slot.disposed {
            return;
        }
        slot.stop_timer();
        slot.debounced = Some(payload);
        let generation = slot.generation;
        self.shared.state.send_modify(|s| s.has_pending_changes = true);

        let shared = Arc::clone(&self.shared);
        let delay = shared.delay;
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire_debounced(generation);
        }));
    }

    /// Cancel the debounce timer and save `payload` now
    ///
    /// Follows the single-flight rule: if a save is running, `payload` becomes
    /// the queued one. No-op when disabled.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn force_save(&self, payload: T) {
        let mut slot = self.shared.slot.lock();
        if !slot.enabled || slot.disposed {
            return;
        }
        slot.stop_timer();
        self.shared.state.send_modify(|s| s.has_pending_changes = true);
        self.shared.dispatch(&mut slot, payload);
    }

    /// Drop the debounced and queued payloads
    ///
    /// A save already in flight completes normally.
    pub fn cancel(&self) {
        let mut slot = self.shared.slot.lock();
        self.cancel_locked(&mut slot);
    }

    fn cancel_locked(&self, slot: &mut Slot<T>) {
        slot.stop_timer();
        if slot.queued.take().is_some() {
            tracing::debug!("discarded queued payload");
        }
        let pending = slot.has_pending();
        self.shared
            .state
            .send_modify(|s| s.has_pending_changes = pending);
    }

    /// Enable or disable the queue; disabling cancels pending work
    pub fn set_enabled(&self, enabled: bool) {
        let mut slot = self.shared.slot.lock();
        slot.enabled = enabled;
        if !enabled {
            self.cancel_locked(&mut slot);
        }
    }

    /// Whether save requests are accepted
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        let slot = self.shared.slot.lock();
        slot.enabled && !slot.disposed
    }

    /// Cancel pending work and refuse all later requests
    pub fn dispose(&self) {
        let mut slot = self.shared.slot.lock();
        if slot.disposed {
            return;
        }
        self.cancel_locked(&mut slot);
        slot.disposed = true;
        tracing::debug!("save queue disposed");
    }

    /// Snapshot of the observable state
    #[must_use]
    pub fn state(&self) -> SaveQueueState {
        self.shared.state.borrow().clone()
    }

    /// Watch state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SaveQueueState> {
        self.shared.state.subscribe()
    }

    /// Resolve once nothing is pending and no save is running
    pub async fn settled(&self) {
        let mut rx = self.shared.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx
            .wait_for(|s| !s.has_pending_changes && !s.is_saving)
            .await;
    }
}

impl<T: Send + 'static> Drop for SaveQueue<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Send + 'static> fmt::Debug for SaveQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveQueue")
            .field("delay", &self.shared.delay)
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SaveQueue`]
pub struct SaveQueueBuilder<T> {
    saver: Arc<dyn Saver<T>>,
    config: SaveQueueConfig,
    clock: SharedClock,
    on_error: Option<ErrorCallback>,
}

impl<T: Send + 'static> SaveQueueBuilder<T> {
    /// With configuration
    #[must_use]
    pub fn config(mut self, config: SaveQueueConfig) -> Self {
        self.config = config;
        self
    }

    /// With debounce window
    #[must_use]
    pub fn debounce(mut self, delay: Duration) -> Self {
        self.config = self.config.with_debounce(delay);
        self
    }

    /// With clock used for `last_saved_at`
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// With failure callback
    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&SaveError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Build the queue
    #[must_use]
    pub fn build(self) -> SaveQueue<T> {
        let (state, _) = watch::channel(SaveQueueState::default());
        SaveQueue {
            shared: Arc::new(Shared {
                saver: self.saver,
                delay: self.config.debounce(),
                clock: self.clock,
                on_error: self.on_error,
                slot: Mutex::new(Slot {
                    enabled: self.config.enabled,
                    disposed: false,
                    timer: None,
                    generation: 0,
                    debounced: None,
                    queued: None,
                    in_flight: false,
                }),
                state,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;
    use tokio::time::sleep;

    /// Records payloads; optionally blocks each save until a permit is added.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
        fail_on: Option<String>,
        panic_on: Option<String>,
    }

    #[async_trait::async_trait]
    impl Saver<String> for Recorder {
        async fn save(&self, payload: String) -> Result<(), SaveError> {
            self.calls.lock().push(payload.clone());
            if self.panic_on.as_ref() == Some(&payload) {
                panic!("store exploded on {payload}");
            }
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            match &self.fail_on {
                Some(bad) if *bad == payload => Err(SaveError::new(format!("rejected {payload}"))),
                _ => Ok(()),
            }
        }
    }

    fn calls(rec: &Recorder) -> Vec<String> {
        rec.calls.lock().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_coalesces_to_last_payload() {
        let rec = Arc::new(Recorder::default());
        let queue = SaveQueue::new(rec.clone());

        queue.trigger_save("a".into());
        sleep(Duration::from_millis(100)).await;
        queue.trigger_save("b".into());
        sleep(Duration::from_millis(100)).await;
        queue.trigger_save("c".into());

        sleep(Duration::from_millis(501)).await;
        queue.settled().await;
        assert_eq!(calls(&rec), vec!["c".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn respects_custom_delay() {
        let rec = Arc::new(Recorder::default());
        let queue = SaveQueue::builder(rec.clone())
            .debounce(Duration::from_millis(1000))
            .build();

        queue.trigger_save("x".into());
        sleep(Duration::from_millis(999)).await;
        assert!(calls(&rec).is_empty());

        sleep(Duration::from_millis(2)).await;
        assert_eq!(calls(&rec), vec!["x".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_flight_sends_queued_after_in_flight() {
        let gate = Arc::new(Semaphore::new(0));
        let rec = Arc::new(Recorder {
            gate: Some(gate.clone()),
            ..Recorder::default()
        });
        let queue = SaveQueue::new(rec.clone());

        queue.trigger_save("first".into());
        sleep(Duration::from_millis(501)).await;
        assert_eq!(calls(&rec), vec!["first".to_string()]);
        assert!(queue.state().is_saving);

        queue.trigger_save("second".into());
        sleep(Duration::from_millis(501)).await;
        // still blocked behind "first"
        assert_eq!(calls(&rec).len(), 1);

        gate.add_permits(2);
        queue.settled().await;

        assert_eq!(calls(&rec), vec!["first".to_string(), "second".to_string()]);
        assert_eq!(rec.max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_payload_is_latest_wins() {
        let gate = Arc::new(Semaphore::new(0));
        let rec = Arc::new(Recorder {
            gate: Some(gate.clone()),
            ..Recorder::default()
        });
        let queue = SaveQueue::new(rec.clone());

        queue.force_save("first".into());
        tokio::task::yield_now().await;
        queue.force_save("second".into());
        queue.force_save("third".into());

        gate.add_permits(3);
        queue.settled().await;
        assert_eq!(calls(&rec), vec!["first".to_string(), "third".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn force_save_cancels_debounce() {
        let rec = Arc::new(Recorder::default());
        let queue = SaveQueue::new(rec.clone());

        queue.trigger_save("A".into());
        queue.force_save("B".into());

        sleep(Duration::from_millis(1000)).await;
        queue.settled().await;
        assert_eq!(calls(&rec), vec!["B".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_queue_is_noop() {
        let rec = Arc::new(Recorder::default());
        let queue = SaveQueue::builder(rec.clone())
            .config(SaveQueueConfig::new().with_enabled(false))
            .build();

        queue.trigger_save("x".into());
        queue.force_save("y".into());
        assert!(!queue.state().has_pending_changes);

        sleep(Duration::from_millis(1000)).await;
        assert!(calls(&rec).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_captured_and_queue_keeps_working() {
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        let rec = Arc::new(Recorder {
            fail_on: Some("bad".into()),
            ..Recorder::default()
        });
        let queue = SaveQueue::builder(rec.clone())
            .on_error(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        queue.force_save("good".into());
        queue.settled().await;
        let saved_at = queue.state().last_saved_at;
        assert!(saved_at.is_some());

        queue.force_save("bad".into());
        queue.settled().await;
        let state = queue.state();
        assert_eq!(state.last_error.as_ref().unwrap().message(), "rejected bad");
        assert_eq!(state.last_saved_at, saved_at);
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        queue.force_save("good again".into());
        queue.settled().await;
        assert!(queue.state().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_save_is_reported_and_queue_drains() {
        let rec = Arc::new(Recorder {
            panic_on: Some("boom".into()),
            ..Recorder::default()
        });
        let queue = SaveQueue::new(rec.clone());

        queue.force_save("boom".into());
        queue.force_save("after".into());
        queue.settled().await;

        let state = queue.state();
        assert_eq!(calls(&rec), vec!["boom", "after"]);
        assert!(!state.is_saving);
        assert!(!state.has_pending_changes);
        assert!(state.last_error.is_none());
        assert!(state.last_saved_at.is_some());

        queue.force_save("boom".into());
        queue.settled().await;
        let err = queue.state().last_error.unwrap();
        assert_eq!(err.message(), "save panicked: store exploded on boom");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_queued_but_not_in_flight() {
        let gate = Arc::new(Semaphore::new(0));
        let rec = Arc::new(Recorder {
            gate: Some(gate.clone()),
            ..Recorder::default()
        });
        let queue = SaveQueue::new(rec.clone());

        queue.force_save("running".into());
        tokio::task::yield_now().await;
        queue.force_save("queued".into());
        queue.trigger_save("debounced".into());

        queue.cancel();
        assert!(queue.state().has_pending_changes);

        gate.add_permits(3);
        queue.settled().await;
        sleep(Duration::from_millis(1000)).await;
        assert_eq!(calls(&rec), vec!["running".to_string()]);
        assert!(!queue.state().has_pending_changes);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_queue_cancels_timer() {
        let rec = Arc::new(Recorder::default());
        let queue = SaveQueue::new(rec.clone());

        queue.trigger_save("never".into());
        drop(queue);

        sleep(Duration::from_millis(1000)).await;
        assert!(calls(&rec).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_flag_tracks_drain() {
        let rec = Arc::new(Recorder::default());
        let queue = SaveQueue::new(rec.clone());

        queue.trigger_save("n1".into());
        queue.trigger_save("n2".into());
        assert!(queue.state().has_pending_changes);

        sleep(Duration::from_millis(501)).await;
        queue.settled().await;
        assert_eq!(calls(&rec), vec!["n2".to_string()]);
        assert!(!queue.state().has_pending_changes);
    }

    #[test]
    fn config_defaults() {
        let config = SaveQueueConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert!(config.enabled);
    }
}
