//! Upstream failures and their user-facing classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of user-facing failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Backend credentials missing or rejected
    InvalidCredentials,
    /// Quota or rate limit exceeded
    QuotaExceeded,
    /// Content refused by safety filters
    SafetyRejection,
    /// Connectivity failure
    Network,
    /// Request carried nothing to analyze
    MissingInput,
    /// Anything else; the raw message is shown
    Unclassified,
}

impl ErrorCategory {
    /// Derive the category from an upstream message
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["api key", "api_key", "unauthenticated", "permission_denied", "invalid credentials"]) {
            Self::InvalidCredentials
        } else if has(&["quota", "rate limit", "resource_exhausted", "too many requests", "429"]) {
            Self::QuotaExceeded
        } else if has(&["safety", "blocked", "harm_category"]) {
            Self::SafetyRejection
        } else if has(&["network", "failed to fetch", "connection", "timed out", "dns"]) {
            Self::Network
        } else {
            Self::Unclassified
        }
    }

    /// Message shown to the user; `raw` is used only for [`Self::Unclassified`]
    #[must_use]
    pub fn user_message(self, raw: &str) -> String {
        match self {
            Self::InvalidCredentials => {
                "Invalid API key. Check the generative backend configuration.".to_string()
            }
            Self::QuotaExceeded => {
                "Request quota exceeded. Wait a moment and try again.".to_string()
            }
            Self::SafetyRejection => "The content was blocked by the safety filters.".to_string(),
            Self::Network => {
                "Connection error. Check your internet connection and try again.".to_string()
            }
            Self::MissingInput => "No document data to analyze.".to_string(),
            Self::Unclassified => raw.to_string(),
        }
    }
}

/// Failure reported by a generative backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    category: Option<ErrorCategory>,
    cancelled: bool,
}

impl BackendError {
    /// Create error classified from its message
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: None,
            cancelled: false,
        }
    }

    /// Create error with an explicit category
    #[inline]
    pub fn categorized(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: Some(category),
            cancelled: false,
        }
    }

    /// Stream ended because the request was aborted
    #[inline]
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            message: "request aborted".to_string(),
            category: None,
            cancelled: true,
        }
    }

    /// Raw message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this reports an abort rather than a failure
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Explicit category, or one derived from the message
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.category
            .unwrap_or_else(|| ErrorCategory::from_message(&self.message))
    }
}

/// Classified failure carried by an `Error` stream state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFailure {
    /// Category
    pub category: ErrorCategory,
    /// Human-readable message suitable for display
    pub message: String,
}

impl StreamFailure {
    /// Failure of `category` with its standard message
    #[must_use]
    pub fn new(category: ErrorCategory, raw: &str) -> Self {
        Self {
            category,
            message: category.user_message(raw),
        }
    }

    /// Classify a backend error
    #[must_use]
    pub fn from_backend(err: &BackendError) -> Self {
        Self::new(err.category(), err.message())
    }
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_messages() {
        let cases = [
            ("API key not valid. Please pass a valid API key.", ErrorCategory::InvalidCredentials),
            ("[429 Too Many Requests] Resource has been exhausted (e.g. check quota).", ErrorCategory::QuotaExceeded),
            ("Candidate was blocked due to SAFETY", ErrorCategory::SafetyRejection),
            ("TypeError: Failed to fetch", ErrorCategory::Network),
            ("model overloaded", ErrorCategory::Unclassified),
        ];
        for (message, expected) in cases {
            assert_eq!(ErrorCategory::from_message(message), expected, "{message}");
        }
    }

    #[test]
    fn unclassified_passes_raw_message_through() {
        let failure = StreamFailure::from_backend(&BackendError::new("model overloaded"));
        assert_eq!(failure.category, ErrorCategory::Unclassified);
        assert_eq!(failure.message, "model overloaded");
    }

    #[test]
    fn explicit_category_wins() {
        let err = BackendError::categorized(ErrorCategory::Network, "quota");
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn cancelled_is_flagged() {
        assert!(BackendError::cancelled().is_cancelled());
        assert!(!BackendError::new("x").is_cancelled());
    }
}
