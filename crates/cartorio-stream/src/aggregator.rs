//! Stream aggregation with per-attempt cancellation

use crate::backend::{Fragment, GenerativeBackend};
use crate::error::{BackendError, ErrorCategory, StreamFailure};
use crate::request::AnalysisRequest;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Aggregation status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Nothing running
    #[default]
    Idle,
    /// Consuming fragments
    Analyzing,
    /// Stream exhausted, or stopped with partial content
    Completed,
    /// Upstream failure
    Error,
}

/// Observable aggregation state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    /// Status
    pub status: StreamStatus,
    /// Concatenated visible output
    pub content: String,
    /// Concatenated reasoning text
    pub thinking: String,
    /// Seconds since the attempt started, as of the last reasoning fragment
    pub thinking_duration_secs: u64,
    /// Present only in [`StreamStatus::Error`]
    pub error: Option<StreamFailure>,
}

impl StreamState {
    fn failed(failure: StreamFailure) -> Self {
        Self {
            status: StreamStatus::Error,
            error: Some(failure),
            ..Self::default()
        }
    }

    fn analyzing() -> Self {
        Self {
            status: StreamStatus::Analyzing,
            ..Self::default()
        }
    }
}

struct Attempt {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Control {
    attempt: Option<Attempt>,
    next_id: u64,
    disposed: bool,
}

impl Control {
    fn cancel_current(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            if !attempt.task.is_finished() {
                tracing::debug!(attempt = attempt.id, "cancelling stream attempt");
            }
            attempt.cancel.cancel();
        }
    }
}

struct Shared {
    backend: Arc<dyn GenerativeBackend>,
    control: Mutex<Control>,
    state: watch::Sender<StreamState>,
}

/// Consumes backend fragment streams into a [`StreamState`]
///
/// Each [`start`](Self::start) opens a new attempt with its own
/// cancellation token. Every state mutation of an attempt is applied under
/// the state lock only if that token is still live, and a new attempt
/// cancels the old token before resetting the state, so a superseded
/// attempt can never write into its successor.
pub struct StreamAggregator {
    shared: Arc<Shared>,
}

impl StreamAggregator {
    /// Create aggregator over `backend`
    pub fn new(backend: impl GenerativeBackend + 'static) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    /// Create aggregator over a shared backend
    #[must_use]
    pub fn from_arc(backend: Arc<dyn GenerativeBackend>) -> Self {
        let (state, _) = watch::channel(StreamState::default());
        Self {
            shared: Arc::new(Shared {
                backend,
                control: Mutex::new(Control::default()),
                state,
            }),
        }
    }

    /// Start a new attempt, cancelling any running one
    ///
    /// Fails fast into [`StreamStatus::Error`] when the backend is not
    /// configured or the request carries no data.
    pub fn start(&self, request: AnalysisRequest) {
        let mut control = self.shared.control.lock();
        if control.disposed {
            tracing::warn!("start on disposed stream aggregator ignored");
            return;
        }
        control.cancel_current();

        let precondition = if !self.shared.backend.is_configured() {
            Some(StreamFailure::new(
                ErrorCategory::InvalidCredentials,
                "generative backend is not configured",
            ))
        } else if !request.has_input() {
            Some(StreamFailure::new(ErrorCategory::MissingInput, "no document data"))
        } else {
            None
        };
        if let Some(failure) = precondition {
            tracing::warn!(error = %failure, "analysis rejected before start");
            self.shared.state.send_replace(StreamState::failed(failure));
            return;
        }

        control.next_id += 1;
        let id = control.next_id;
        let cancel = CancellationToken::new();
        self.shared.state.send_replace(StreamState::analyzing());

        tracing::info!(attempt = id, documents = request.documents.len(), "analysis started");
        let task = tokio::spawn(run_attempt(
            Arc::clone(&self.shared),
            request,
            cancel.clone(),
            id,
        ));
        control.attempt = Some(Attempt { id, cancel, task });
    }

    /// Cancel the running attempt, keeping what was received
    ///
    /// Status becomes `Completed` if any content arrived, otherwise `Idle`.
    /// No-op unless analyzing.
    pub fn stop(&self) {
        let mut control = self.shared.control.lock();
        control.cancel_current();
        self.shared.settle_stopped();
    }

    /// Stop and clear all accumulated state
    pub fn reset(&self) {
        let mut control = self.shared.control.lock();
        control.cancel_current();
        self.shared.state.send_replace(StreamState::default());
    }

    /// Cancel the running attempt and refuse further starts
    ///
    /// A running attempt ends as if stopped, so [`finished`](Self::finished)
    /// resolves.
    pub fn dispose(&self) {
        let mut control = self.shared.control.lock();
        control.cancel_current();
        self.shared.settle_stopped();
        control.disposed = true;
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.shared.state.borrow().clone()
    }

    /// Observe state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.shared.state.subscribe()
    }

    /// Wait until the status leaves `Analyzing`
    pub async fn finished(&self) -> StreamState {
        let mut rx = self.shared.state.subscribe();
        let finished = rx
            .wait_for(|state| state.status != StreamStatus::Analyzing)
            .await
            .map(|state| state.clone());
        finished.unwrap_or_else(|_| self.state())
    }
}

impl Drop for StreamAggregator {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for StreamAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamAggregator")
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

async fn run_attempt(shared: Arc<Shared>, request: AnalysisRequest, cancel: CancellationToken, id: u64) {
    let started = Instant::now();

    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        opened = shared.backend.invoke(&request) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(err) => return shared.fail(&cancel, &err, id),
    };

    let mut fragments = 0_usize;
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(attempt = id, fragments, "stream abandoned");
                return;
            }
            next = stream.next() => next,
        };
        match next {
            Some(Ok(fragment)) => {
                fragments += 1;
                shared.apply(&cancel, &fragment, started);
            }
            Some(Err(err)) => return shared.fail(&cancel, &err, id),
            None => {
                shared.guarded(&cancel, |state| {
                    state.status = StreamStatus::Completed;
                    true
                });
                tracing::info!(attempt = id, fragments, "analysis completed");
                return;
            }
        }
    }
}

impl Shared {
    /// Leave `Analyzing` after a cancellation. Callers hold the control lock.
    fn settle_stopped(&self) {
        self.state.send_if_modified(|state| {
            if state.status != StreamStatus::Analyzing {
                return false;
            }
            state.status = stopped_status(state);
            true
        });
    }

    /// Mutate state only while `cancel` is live; the check and the write
    /// happen under the same lock.
    fn guarded(&self, cancel: &CancellationToken, f: impl FnOnce(&mut StreamState) -> bool) {
        self.state.send_if_modified(|state| !cancel.is_cancelled() && f(state));
    }

    fn apply(&self, cancel: &CancellationToken, fragment: &Fragment, started: Instant) {
        self.guarded(cancel, |state| {
            let mut changed = false;
            if let Some(reasoning) = fragment.reasoning.as_deref().filter(|r| !r.is_empty()) {
                state.thinking.push_str(reasoning);
                state.thinking_duration_secs = started.elapsed().as_secs();
                changed = true;
            }
            if let Some(text) = fragment.text.as_deref().filter(|t| !t.is_empty()) {
                state.content.push_str(text);
                changed = true;
            }
            changed
        });
    }

    fn fail(&self, cancel: &CancellationToken, err: &BackendError, id: u64) {
        if err.is_cancelled() {
            tracing::debug!(attempt = id, "upstream reported abort");
            self.guarded(cancel, |state| {
                state.status = stopped_status(state);
                true
            });
            return;
        }

        let failure = StreamFailure::from_backend(err);
        tracing::error!(attempt = id, category = ?failure.category, error = %err, "analysis failed");
        self.guarded(cancel, |state| {
            state.status = StreamStatus::Error;
            state.error = Some(failure);
            true
        });
    }
}

fn stopped_status(state: &StreamState) -> StreamStatus {
    if state.content.is_empty() {
        StreamStatus::Idle
    } else {
        StreamStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FragmentStream;
    use crate::request::InputDocument;
    use futures::channel::mpsc;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Feed = mpsc::UnboundedSender<Result<Fragment, BackendError>>;

    /// Hands out pre-registered streams, one per invocation.
    struct Channelled {
        configured: bool,
        streams: Mutex<VecDeque<FragmentStream>>,
        invocations: AtomicUsize,
    }

    impl Channelled {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                configured: true,
                streams: Mutex::new(VecDeque::new()),
                invocations: AtomicUsize::new(0),
            })
        }

        fn feed(&self) -> Feed {
            let (tx, rx) = mpsc::unbounded();
            self.streams.lock().push_back(Box::pin(rx));
            tx
        }
    }

    #[async_trait::async_trait]
    impl GenerativeBackend for Channelled {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn invoke(&self, _request: &AnalysisRequest) -> Result<FragmentStream, BackendError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            self.streams
                .lock()
                .pop_front()
                .ok_or_else(|| BackendError::new("no stream registered"))
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(vec![InputDocument::new("rg.jpg", "image/jpeg", vec![1, 2, 3])])
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait(aggregator: &StreamAggregator, f: impl FnMut(&StreamState) -> bool) {
        let mut rx = aggregator.subscribe();
        rx.wait_for(f).await.unwrap();
    }

    fn send(feed: &Feed, fragment: Fragment) {
        let _ = feed.unbounded_send(Ok(fragment));
    }

    #[tokio::test(start_paused = true)]
    async fn accumulates_both_channels_until_exhausted() {
        let backend = Channelled::new();
        let feed = backend.feed();
        let aggregator = StreamAggregator::from_arc(backend.clone());

        aggregator.start(request());
        assert_eq!(aggregator.state().status, StreamStatus::Analyzing);

        send(&feed, Fragment::reasoning("Reading "));
        wait(&aggregator, |s| s.thinking == "Reading ").await;
        tokio::time::advance(Duration::from_secs(3)).await;
        send(&feed, Fragment::reasoning("the RG."));
        send(&feed, Fragment::text("Name: "));
        send(&feed, Fragment::text("Maria"));
        feed.close_channel();

        let state = aggregator.finished().await;
        assert_eq!(state.status, StreamStatus::Completed);
        assert_eq!(state.thinking, "Reading the RG.");
        assert_eq!(state.content, "Name: Maria");
        assert_eq!(state.thinking_duration_secs, 3);
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_keeps_partial_content() {
        let backend = Channelled::new();
        let feed = backend.feed();
        let aggregator = StreamAggregator::from_arc(backend.clone());

        aggregator.start(request());
        send(&feed, Fragment::text("partial"));
        wait(&aggregator, |s| s.content == "partial").await;

        aggregator.stop();
        send(&feed, Fragment::text(" late"));
        settle().await;

        let state = aggregator.state();
        assert_eq!(state.status, StreamStatus::Completed);
        assert_eq!(state.content, "partial");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_content_returns_to_idle() {
        let backend = Channelled::new();
        let _feed = backend.feed();
        let aggregator = StreamAggregator::from_arc(backend.clone());

        aggregator.start(request());
        settle().await;
        aggregator.stop();
        assert_eq!(aggregator.state().status, StreamStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_isolates_attempts() {
        let backend = Channelled::new();
        let first = backend.feed();
        let second = backend.feed();
        let aggregator = StreamAggregator::from_arc(backend.clone());

        aggregator.start(request());
        send(&first, Fragment::text("A1"));
        wait(&aggregator, |s| s.content == "A1").await;

        aggregator.start(request());
        assert_eq!(aggregator.state().content, "");
        send(&first, Fragment::text("A2"));
        send(&second, Fragment::text("B1"));
        second.close_channel();
        first.close_channel();

        let state = aggregator.finished().await;
        settle().await;
        assert_eq!(state.content, "B1");
        assert_eq!(aggregator.state().content, "B1");
        assert_eq!(backend.invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_is_classified() {
        let backend = Channelled::new();
        let feed = backend.feed();
        let aggregator = StreamAggregator::from_arc(backend.clone());

        aggregator.start(request());
        let _ = feed.unbounded_send(Err(BackendError::new("429 quota exceeded")));

        let state = aggregator.finished().await;
        assert_eq!(state.status, StreamStatus::Error);
        assert_eq!(state.error.unwrap().category, ErrorCategory::QuotaExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_abort_is_not_an_error() {
        let backend = Channelled::new();
        let feed = backend.feed();
        let aggregator = StreamAggregator::from_arc(backend.clone());

        aggregator.start(request());
        send(&feed, Fragment::text("so far"));
        let _ = feed.unbounded_send(Err(BackendError::cancelled()));

        let state = aggregator.finished().await;
        assert_eq!(state.status, StreamStatus::Completed);
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_backend_fails_fast() {
        let backend = Arc::new(Channelled {
            configured: false,
            streams: Mutex::new(VecDeque::new()),
            invocations: AtomicUsize::new(0),
        });
        let aggregator = StreamAggregator::from_arc(backend.clone());

        aggregator.start(request());
        let state = aggregator.state();
        assert_eq!(state.status, StreamStatus::Error);
        assert_eq!(state.error.unwrap().category, ErrorCategory::InvalidCredentials);
        settle().await;
        assert_eq!(backend.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_request_fails_fast() {
        let backend = Channelled::new();
        let aggregator = StreamAggregator::from_arc(backend.clone());

        aggregator.start(AnalysisRequest::default());
        let state = aggregator.state();
        assert_eq!(state.status, StreamStatus::Error);
        assert_eq!(state.error.unwrap().category, ErrorCategory::MissingInput);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_freezes_state() {
        let backend = Channelled::new();
        let feed = backend.feed();
        let aggregator = StreamAggregator::from_arc(backend.clone());

        aggregator.start(request());
        send(&feed, Fragment::text("kept"));
        wait(&aggregator, |s| s.content == "kept").await;

        aggregator.dispose();
        send(&feed, Fragment::text(" dropped"));
        settle().await;
        assert_eq!(aggregator.state().content, "kept");

        aggregator.start(request());
        assert_eq!(aggregator.state().content, "kept");
        assert_eq!(backend.invocations.load(Ordering::SeqCst), 1);
    }
}
