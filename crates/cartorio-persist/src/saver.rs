//! Underlying save contract

use crate::error::SaveError;
use std::future::Future;
use std::sync::Arc;

/// Asynchronous write of one payload to a durable store
///
/// Arbitrary latency; may fail. The queue never calls it concurrently.
#[async_trait::async_trait]
pub trait Saver<T>: Send + Sync {
    /// Persist `payload`
    async fn save(&self, payload: T) -> Result<(), SaveError>;
}

#[async_trait::async_trait]
impl<T, S> Saver<T> for Arc<S>
where
    T: Send + 'static,
    S: Saver<T> + ?Sized,
{
    async fn save(&self, payload: T) -> Result<(), SaveError> {
        (**self).save(payload).await
    }
}

/// [`Saver`] backed by an async closure
#[derive(Debug, Clone)]
pub struct FnSaver<F>(F);

/// Wrap an async closure as a [`Saver`]
#[inline]
pub fn saver_fn<F>(f: F) -> FnSaver<F> {
    FnSaver(f)
}

#[async_trait::async_trait]
impl<T, F, Fut> Saver<T> for FnSaver<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SaveError>> + Send,
{
    async fn save(&self, payload: T) -> Result<(), SaveError> {
        (self.0)(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_saver_forwards_payload() {
        let saver = saver_fn(|n: u32| async move {
            if n == 0 {
                Err(SaveError::new("zero"))
            } else {
                Ok(())
            }
        });

        assert!(saver.save(1).await.is_ok());
        assert_eq!(saver.save(0).await.unwrap_err().message(), "zero");
    }
}
