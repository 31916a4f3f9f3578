//! Push notification payloads and channel contracts

use crate::error::PipelineError;
use cartorio_context::Subscription;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Row change carried by a status notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Reported stage name
    pub status: String,
    /// Failure message, for the `error` stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Pipeline output, for the `completed` stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Notification pushed by the remote pipeline: `{ "new": { "status": ... } }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusNotification {
    /// Updated record
    pub new: StatusRecord,
}

impl StatusNotification {
    /// Notification reporting `status`
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            new: StatusRecord {
                status: status.into(),
                ..StatusRecord::default()
            },
        }
    }

    /// `error` notification with message
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        let mut notification = Self::new("error");
        notification.new.error_message = Some(message.into());
        notification
    }

    /// With result payload
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.new.result = Some(result);
        self
    }
}

/// Which row changes a subscription receives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventFilter {
    /// Inserts
    Insert,
    /// Updates
    #[default]
    Update,
    /// Deletes
    Delete,
    /// Everything
    #[serde(rename = "*")]
    All,
}

/// Callback invoked for every delivered notification
pub type NotificationCallback = Arc<dyn Fn(StatusNotification) + Send + Sync>;

/// Push subscription contract
pub trait PushChannel: Send + Sync {
    /// Register `callback` on `channel_key`
    ///
    /// The callback may fire before this returns. Dropping the returned
    /// handle detaches it.
    fn subscribe(
        &self,
        channel_key: &str,
        filter: EventFilter,
        callback: NotificationCallback,
    ) -> Result<Subscription, PipelineError>;
}

/// Outbound mutation that kicks off the remote pipeline
#[async_trait::async_trait]
pub trait PipelineTrigger: Send + Sync {
    /// Mark `target` as ready for processing
    async fn begin(&self, target: &str) -> Result<(), PipelineError>;
}
