//! Save failure type

use std::error::Error as StdError;
use std::fmt::Display;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure reported by an underlying save
///
/// Whatever the save function rejected with is normalized into this type so
/// `lastError` always carries a displayable message.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SaveError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl SaveError {
    /// Create error with message
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an error, keeping it as the source
    pub fn wrap(err: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Coerce any displayable rejection value into an error
    #[inline]
    pub fn from_display(value: impl Display) -> Self {
        Self::new(value.to_string())
    }

    /// Message suitable for display
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for SaveError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for SaveError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
