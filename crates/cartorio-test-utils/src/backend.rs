use cartorio_stream::{AnalysisRequest, BackendError, Fragment, FragmentStream, GenerativeBackend};
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

enum Script {
    Stream(FragmentStream),
    Fail(BackendError),
}

struct Inner {
    configured: AtomicBool,
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

/// Backend handing out one scripted response per invocation
#[derive(Clone)]
pub struct ScriptedBackend {
    inner: Arc<Inner>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                configured: AtomicBool::new(true),
                scripts: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_configured(&self, configured: bool) {
        self.inner.configured.store(configured, Ordering::SeqCst);
    }

    /// Next response is driven by hand through the returned feed
    pub fn feed(&self) -> FragmentFeed {
        let (tx, rx) = mpsc::unbounded();
        self.inner.scripts.lock().push_back(Script::Stream(rx.boxed()));
        FragmentFeed { tx }
    }

    /// Next response yields `fragments`, each after `interval` of tokio time
    pub fn push_fragments(&self, fragments: Vec<Fragment>, interval: Duration) {
        let stream = futures::stream::iter(fragments)
            .then(move |fragment| async move {
                tokio::time::sleep(interval).await;
                Ok::<_, BackendError>(fragment)
            })
            .boxed();
        self.inner.scripts.lock().push_back(Script::Stream(stream));
    }

    /// Next invocation fails before streaming
    pub fn push_failure(&self, error: BackendError) {
        self.inner.scripts.lock().push_back(Script::Fail(error));
    }

    pub fn invocation_count(&self) -> usize {
        self.inner.requests.lock().len()
    }
}

#[async_trait::async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn is_configured(&self) -> bool {
        self.inner.configured.load(Ordering::SeqCst)
    }

    async fn invoke(&self, request: &AnalysisRequest) -> Result<FragmentStream, BackendError> {
        self.inner.requests.lock().push(request.clone());
        match self.inner.scripts.lock().pop_front() {
            Some(Script::Stream(stream)) => Ok(stream),
            Some(Script::Fail(error)) => Err(error),
            None => Err(BackendError::new("no scripted response")),
        }
    }
}

/// Sending half of a hand-driven response
pub struct FragmentFeed {
    tx: mpsc::UnboundedSender<Result<Fragment, BackendError>>,
}

impl FragmentFeed {
    pub fn text(&self, text: &str) {
        let _ = self.tx.unbounded_send(Ok(Fragment::text(text)));
    }

    pub fn reasoning(&self, reasoning: &str) {
        let _ = self.tx.unbounded_send(Ok(Fragment::reasoning(reasoning)));
    }

    pub fn fail(&self, error: BackendError) {
        let _ = self.tx.unbounded_send(Err(error));
    }

    /// End the stream
    pub fn finish(self) {
        self.tx.close_channel();
    }

    /// Whether the consumer dropped the stream
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}
