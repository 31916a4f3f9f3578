//! Upstream fetch failures

/// Failure of a single upstream fetch attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The resource is not visible upstream (yet)
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Any other upstream failure
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl SourceError {
    /// Create not-found error
    #[inline]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Create upstream error
    #[inline]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Whether this is the not-found classification
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
