use cartorio_fetch::{ResourceSource, SourceError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;

type Matcher<T> = Arc<dyn Fn(&str, &T) -> bool + Send + Sync>;

struct Inner<T> {
    results: Mutex<VecDeque<Result<T, SourceError>>>,
    attempts: Mutex<Vec<(String, Instant)>>,
    matcher: Mutex<Option<Matcher<T>>>,
}

/// Source replaying scripted results; not-found once the script runs out
pub struct ScriptedSource<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ScriptedSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ScriptedSource<T> {
    pub fn new(results: Vec<Result<T, SourceError>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                results: Mutex::new(results.into()),
                attempts: Mutex::new(Vec::new()),
                matcher: Mutex::new(None),
            }),
        }
    }

    /// Use `matcher` to decide whether a cached value belongs to a key
    pub fn with_matcher(self, matcher: impl Fn(&str, &T) -> bool + Send + Sync + 'static) -> Self {
        *self.inner.matcher.lock() = Some(Arc::new(matcher));
        self
    }

    pub fn push(&self, result: Result<T, SourceError>) {
        self.inner.results.lock().push_back(result);
    }

    pub fn attempt_count(&self) -> usize {
        self.inner.attempts.lock().len()
    }

    /// Keys requested, in order
    pub fn attempted_keys(&self) -> Vec<String> {
        self.inner.attempts.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// When each attempt happened, in tokio time
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.inner.attempts.lock().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait::async_trait]
impl<T: Send + Sync + 'static> ResourceSource<T> for ScriptedSource<T> {
    async fn fetch(&self, key: &str) -> Result<T, SourceError> {
        self.inner.attempts.lock().push((key.to_string(), Instant::now()));
        self.inner
            .results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SourceError::not_found(key)))
    }

    fn matches(&self, key: &str, value: &T) -> bool {
        self.inner.matcher.lock().as_ref().map_or(true, |m| m(key, value))
    }
}
