//! Disposal handle for push subscriptions

use parking_lot::Mutex;
use std::fmt;

type UnsubscribeFn = Box<dyn FnOnce() + Send>;

/// Handle returned by a push channel's `subscribe`
///
/// Holds the action that detaches the callback. `unsubscribe` runs it at most
/// once; dropping the handle runs it if nobody did.
pub struct Subscription {
    channel_key: String,
    unsubscribe: Mutex<Option<UnsubscribeFn>>,
}

impl Subscription {
    /// Create handle for `channel_key` with its detach action
    pub fn new(channel_key: impl Into<String>, unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            channel_key: channel_key.into(),
            unsubscribe: Mutex::new(Some(Box::new(unsubscribe))),
        }
    }

    /// Channel this subscription listens on
    #[inline]
    #[must_use]
    pub fn channel_key(&self) -> &str {
        &self.channel_key
    }

    /// Whether the detach action has not run yet
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.unsubscribe.lock().is_some()
    }

    /// Detach from the channel. Idempotent.
    pub fn unsubscribe(&mut self) {
        self.detach();
    }

    fn detach(&self) {
        let action = self.unsubscribe.lock().take();
        if let Some(action) = action {
            tracing::debug!(channel = %self.channel_key, "unsubscribing");
            action();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel_key", &self.channel_key)
            .field("active", &self.is_active())
            .finish()
    }
}
