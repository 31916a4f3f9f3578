use cartorio_context::Subscription;
use cartorio_pipeline::{
    EventFilter, NotificationCallback, PipelineError, PipelineTrigger, PushChannel, StatusNotification,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type Registry = Arc<Mutex<HashMap<String, Vec<(u64, NotificationCallback)>>>>;

/// Push channel whose notifications are emitted by the test
#[derive(Default)]
pub struct ManualPushChannel {
    subscribers: Registry,
    next_id: AtomicU64,
    refuse: AtomicBool,
}

impl ManualPushChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver to every subscriber of `channel_key`; returns how many
    pub fn emit(&self, channel_key: &str, notification: StatusNotification) -> usize {
        let callbacks: Vec<NotificationCallback> = self
            .subscribers
            .lock()
            .get(channel_key)
            .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        for callback in &callbacks {
            callback(notification.clone());
        }
        callbacks.len()
    }

    /// Decode a raw JSON payload and deliver it
    pub fn emit_json(&self, channel_key: &str, payload: serde_json::Value) -> usize {
        self.emit(channel_key, serde_json::from_value(payload).unwrap())
    }

    pub fn subscriber_count(&self, channel_key: &str) -> usize {
        self.subscribers.lock().get(channel_key).map_or(0, Vec::len)
    }

    /// Make later subscribe calls fail
    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl PushChannel for ManualPushChannel {
    fn subscribe(
        &self,
        channel_key: &str,
        _filter: EventFilter,
        callback: NotificationCallback,
    ) -> Result<Subscription, PipelineError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(PipelineError::Subscribe {
                channel: channel_key.to_string(),
                reason: "channel closed".to_string(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .entry(channel_key.to_string())
            .or_default()
            .push((id, callback));

        let registry = Arc::clone(&self.subscribers);
        let key = channel_key.to_string();
        Ok(Subscription::new(channel_key, move || {
            if let Some(subs) = registry.lock().get_mut(&key) {
                subs.retain(|(sub_id, _)| *sub_id != id);
            }
        }))
    }
}

/// Trigger that records targets, optionally failing
#[derive(Debug, Default)]
pub struct RecordingTrigger {
    begun: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingTrigger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn begun(&self) -> Vec<String> {
        self.begun.lock().clone()
    }
}

#[async_trait::async_trait]
impl PipelineTrigger for RecordingTrigger {
    async fn begin(&self, target: &str) -> Result<(), PipelineError> {
        self.begun.lock().push(target.to_string());
        if self.fail.load(Ordering::SeqCst) {
            Err(PipelineError::Trigger(format!("no record {target}")))
        } else {
            Ok(())
        }
    }
}
