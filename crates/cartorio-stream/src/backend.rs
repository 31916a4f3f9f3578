//! Generative backend contract

use crate::error::BackendError;
use crate::request::AnalysisRequest;
use futures::Stream;
use std::pin::Pin;

/// One partial unit of a streamed response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Reasoning ("thinking") text
    pub reasoning: Option<String>,
    /// Visible output text
    pub text: Option<String>,
}

impl Fragment {
    /// Fragment carrying visible text
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            reasoning: None,
            text: Some(text.into()),
        }
    }

    /// Fragment carrying reasoning text
    #[inline]
    #[must_use]
    pub fn reasoning(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: Some(reasoning.into()),
            text: None,
        }
    }
}

/// Ordered, possibly unbounded fragment sequence
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, BackendError>> + Send>>;

/// Backend able to stream a response for an [`AnalysisRequest`]
#[async_trait::async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Whether credentials and endpoint are set up
    fn is_configured(&self) -> bool {
        true
    }

    /// Open the response stream
    ///
    /// Dropping the returned stream abandons it.
    async fn invoke(&self, request: &AnalysisRequest) -> Result<FragmentStream, BackendError>;
}
