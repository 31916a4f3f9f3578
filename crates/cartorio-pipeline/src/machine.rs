//! Processing state machine driven by push notifications

use crate::notification::{EventFilter, NotificationCallback, PipelineTrigger, PushChannel, StatusNotification};
use crate::stage::{Stage, StageOrdering};
use cartorio_context::Subscription;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Observable pipeline state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingState {
    /// Current stage
    pub stage: Stage,
    /// Message of the `error` stage
    pub error: Option<String>,
    /// Output attached to the `completed` stage
    pub result: Option<Value>,
}

impl ProcessingState {
    /// State at `stage` with nothing attached
    #[inline]
    #[must_use]
    pub fn at(stage: Stage) -> Self {
        Self {
            stage,
            ..Self::default()
        }
    }

    /// `error` state with message
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: Stage::Error,
            error: Some(message.into()),
            result: None,
        }
    }

    /// Progress percentage, derived from the stage
    #[inline]
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        self.stage.progress()
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Policy for out-of-order notifications
    pub ordering: StageOrdering,
    /// Channel keys are `{channel_prefix}-{target}`
    pub channel_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ordering: StageOrdering::LastWins,
            channel_prefix: "document-status".to_string(),
        }
    }
}

impl PipelineConfig {
    /// With ordering policy
    #[inline]
    #[must_use]
    pub fn with_ordering(mut self, ordering: StageOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Channel key for `target`
    #[must_use]
    pub fn channel_key(&self, target: &str) -> String {
        format!("{}-{target}", self.channel_prefix)
    }
}

struct Inner {
    channel: Arc<dyn PushChannel>,
    trigger: Arc<dyn PipelineTrigger>,
    config: PipelineConfig,
    state: watch::Sender<ProcessingState>,
    subscription: Mutex<Option<Subscription>>,
    epoch: AtomicU64,
    disposed: AtomicBool,
}

impl Inner {
    fn is_live(&self, epoch: u64) -> bool {
        !self.disposed.load(Ordering::Acquire) && self.epoch.load(Ordering::Acquire) == epoch
    }

    fn apply(&self, notification: StatusNotification) {
        let record = notification.new;
        let next = match record.status.parse::<Stage>() {
            Ok(stage) => stage,
            Err(err) => {
                tracing::warn!(error = %err, "notification ignored");
                return;
            }
        };
        let ordering = self.config.ordering;

        self.state.send_if_modified(|state| {
            if !ordering.admits(state.stage, next) {
                tracing::debug!(current = %state.stage, reported = %next, "stale notification ignored");
                return false;
            }
            tracing::debug!(from = %state.stage, to = %next, "notification applied");
            *state = match next {
                Stage::Error => ProcessingState::failed(
                    record.error_message.unwrap_or_else(|| "processing failed".to_string()),
                ),
                Stage::Completed => ProcessingState {
                    stage: Stage::Completed,
                    error: None,
                    result: record.result,
                },
                stage => ProcessingState::at(stage),
            };
            true
        });
    }

    fn fail(&self, epoch: u64, message: String) {
        if self.is_live(epoch) {
            tracing::error!(error = %message, "pipeline failed to start");
            self.state.send_replace(ProcessingState::failed(message));
        }
    }
}

/// Tracks one document through the remote pipeline
///
/// After [`start`](Self::start) the only driver of state is the push
/// channel; nothing is polled and nothing is inferred from elapsed time.
pub struct ProcessingMachine {
    inner: Arc<Inner>,
}

impl ProcessingMachine {
    /// Create machine
    pub fn new(
        channel: Arc<dyn PushChannel>,
        trigger: Arc<dyn PipelineTrigger>,
        config: PipelineConfig,
    ) -> Self {
        let (state, _) = watch::channel(ProcessingState::default());
        Self {
            inner: Arc::new(Inner {
                channel,
                trigger,
                config,
                state,
                subscription: Mutex::new(None),
                epoch: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to `target`'s status channel and trigger processing
    ///
    /// An empty target fails immediately. Subscription or trigger failures
    /// surface as the `error` stage. Any earlier subscription is replaced.
    pub async fn start(&self, target: &str) {
        if self.inner.disposed.load(Ordering::Acquire) {
            tracing::warn!(target, "start on disposed processing machine ignored");
            return;
        }
        let epoch = self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = self.inner.subscription.lock().take();
        drop(previous);

        let target = target.trim();
        if target.is_empty() {
            self.inner.fail(epoch, "no document id to process".to_string());
            return;
        }

        self.inner.state.send_replace(ProcessingState::at(Stage::Classifying));

        let key = self.inner.config.channel_key(target);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let callback: NotificationCallback = Arc::new(move |notification| {
            if let Some(inner) = weak.upgrade() {
                if inner.is_live(epoch) {
                    inner.apply(notification);
                }
            }
        });

        let subscription = match self.inner.channel.subscribe(&key, EventFilter::Update, callback) {
            Ok(subscription) => subscription,
            Err(err) => return self.inner.fail(epoch, err.to_string()),
        };
        if self.inner.is_live(epoch) {
            *self.inner.subscription.lock() = Some(subscription);
        } else {
            // superseded while subscribing; `subscription` drops here
            return;
        }

        tracing::info!(target, channel = %key, "pipeline started");
        if let Err(err) = self.inner.trigger.begin(target).await {
            self.inner.fail(epoch, err.to_string());
        }
    }

    /// Return to `idle`; the subscription stays open
    pub fn reset(&self) {
        self.inner.state.send_replace(ProcessingState::default());
    }

    /// Unsubscribe and ignore every later notification
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = self.inner.subscription.lock().take();
        drop(subscription);
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ProcessingState {
        self.inner.state.borrow().clone()
    }

    /// Observe state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProcessingState> {
        self.inner.state.subscribe()
    }

    /// Whether a push subscription is held
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.inner.subscription.lock().is_some()
    }
}

impl Drop for ProcessingMachine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ProcessingMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingMachine")
            .field("config", &self.inner.config)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}
