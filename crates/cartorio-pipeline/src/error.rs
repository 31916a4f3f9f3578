//! Pipeline errors

use thiserror::Error;

/// Failures of the push channel or the trigger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Could not subscribe to the status channel
    #[error("subscription to {channel} failed: {reason}")]
    Subscribe {
        /// Channel key
        channel: String,
        /// Upstream reason
        reason: String,
    },

    /// Could not start the remote pipeline
    #[error("pipeline trigger failed: {0}")]
    Trigger(String),
}
