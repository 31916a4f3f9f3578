//! Scripted scenarios and their reports

use cartorio_core::CartorioConfig;
use cartorio_fetch::{CachedFetcher, MemoryStore, SharedStore, SourceError};
use cartorio_persist::SaveQueue;
use cartorio_pipeline::{ProcessingMachine, StatusNotification};
use cartorio_stream::{Fragment, StreamAggregator, StreamStatus};
use cartorio_test_utils::{document_request, ManualPushChannel, RecordingSaver, RecordingTrigger, ScriptedBackend, ScriptedSource};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scenario {
    SaveQueue,
    ProfileFetch,
    Stream,
    Pipeline,
}

impl Scenario {
    pub(crate) const ALL: [Self; 4] = [Self::SaveQueue, Self::ProfileFetch, Self::Stream, Self::Pipeline];

    fn name(self) -> &'static str {
        match self {
            Self::SaveQueue => "save-queue",
            Self::ProfileFetch => "profile-fetch",
            Self::Stream => "stream",
            Self::Pipeline => "pipeline",
        }
    }

    pub(crate) async fn run(self, config: &CartorioConfig) -> Report {
        tracing::info!(scenario = self.name(), "scenario started");
        let mut report = Report::new(self.name());
        match self {
            Self::SaveQueue => save_queue(config, &mut report).await,
            Self::ProfileFetch => profile_fetch(config, &mut report).await,
            Self::Stream => stream(&mut report).await,
            Self::Pipeline => pipeline(config, &mut report).await,
        }
        tracing::info!(scenario = self.name(), passed = report.passed(), "scenario finished");
        report
    }
}

pub(crate) struct Report {
    name: &'static str,
    checks: Vec<(String, bool)>,
}

impl Report {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            checks: Vec::new(),
        }
    }

    fn check(&mut self, label: impl Into<String>, ok: bool) {
        self.checks.push((label.into(), ok));
    }

    pub(crate) fn passed(&self) -> bool {
        self.checks.iter().all(|(_, ok)| *ok)
    }

    pub(crate) fn generate_text(&self) -> String {
        let mut out = format!(
            "== {} [{}]\n",
            self.name,
            if self.passed() { "PASS" } else { "FAIL" }
        );
        for (label, ok) in &self.checks {
            let _ = writeln!(out, "  {} {label}", if *ok { "ok  " } else { "FAIL" });
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Edit(u32);

async fn save_queue(config: &CartorioConfig, report: &mut Report) {
    let debounce = config.persistence.debounce();
    let saver = RecordingSaver::with_latency(Duration::from_millis(100));
    let queue = SaveQueue::builder(saver.clone())
        .config(config.persistence.clone())
        .build();

    for n in 1..=3 {
        queue.trigger_save(Edit(n));
    }
    report.check("pending right after edits", queue.state().has_pending_changes || !queue.is_enabled());
    tokio::time::sleep(debounce + Duration::from_millis(1)).await;
    queue.settled().await;

    if queue.is_enabled() {
        report.check("burst coalesced to last edit", saver.calls() == vec![Edit(3)]);
    } else {
        report.check("disabled queue saved nothing", saver.call_count() == 0);
        return;
    }

    queue.force_save(Edit(10));
    queue.force_save(Edit(11));
    queue.force_save(Edit(12));
    queue.settled().await;
    let calls = saver.calls();
    tracing::info!(?calls, "saves observed");
    report.check(
        "in-flight save followed by latest queued",
        calls.get(1..) == Some(&[Edit(10), Edit(12)][..]),
    );
    report.check("never more than one save at once", saver.max_concurrency() == 1);
    report.check("nothing pending after settle", !queue.state().has_pending_changes);
}

async fn profile_fetch(config: &CartorioConfig, report: &mut Report) {
    let source = ScriptedSource::new(vec![
        Err(SourceError::not_found("u1")),
        Ok("Maria Souza".to_string()),
    ]);
    let store: SharedStore = Arc::new(MemoryStore::default());
    let fetcher = CachedFetcher::new(source.clone(), store, config.profile.clone());
    let attempts = config.profile.retry().attempts();

    let first = fetcher.fetch("u1", false).await;
    if attempts >= 2 {
        report.check("found after one retry", first.as_deref() == Some("Maria Souza"));
    } else {
        report.check("single attempt gives up", first.is_none());
        return;
    }

    let before = source.attempt_count();
    let cached = fetcher.fetch("u1", false).await;
    report.check("served from cache", cached.is_some() && source.attempt_count() == before);

    fetcher.invalidate();
    let started = tokio::time::Instant::now();
    let gone = fetcher.fetch("u1", true).await;
    tracing::info!(elapsed = ?started.elapsed(), "exhausted retry schedule");
    report.check("exhausted schedule returns nothing", gone.is_none());
    report.check(
        "attempt count follows schedule",
        source.attempt_count() == before + attempts,
    );
}

async fn stream(report: &mut Report) {
    let backend = ScriptedBackend::new();
    backend.push_fragments(
        vec![
            Fragment::reasoning("Looks like a birth certificate. "),
            Fragment::text("nome: "),
            Fragment::text("João"),
            Fragment::text(" da Silva"),
        ],
        Duration::from_millis(50),
    );
    let aggregator = StreamAggregator::new(backend.clone());

    aggregator.start(document_request());
    tokio::time::sleep(Duration::from_millis(125)).await;
    aggregator.stop();
    let stopped = aggregator.state();
    tracing::info!(content = %stopped.content, "stopped mid-stream");
    report.check(
        "stop keeps partial content",
        stopped.status == StreamStatus::Completed && stopped.content == "nome: ",
    );

    let feed = backend.feed();
    aggregator.start(document_request());
    report.check("restart clears previous attempt", aggregator.state().content.is_empty());
    feed.reasoning("Second look.");
    feed.text("nome: João da Silva");
    feed.finish();
    let done = aggregator.finished().await;
    report.check(
        "second attempt completes alone",
        done.status == StreamStatus::Completed && done.content == "nome: João da Silva",
    );

    backend.set_configured(false);
    aggregator.start(document_request());
    report.check("unconfigured backend fails fast", aggregator.state().status == StreamStatus::Error);
}

async fn pipeline(config: &CartorioConfig, report: &mut Report) {
    let channel = ManualPushChannel::new();
    let trigger = RecordingTrigger::new();
    let machine = ProcessingMachine::new(channel.clone(), trigger.clone(), config.pipeline.clone());
    let key = config.pipeline.channel_key("doc-1");

    machine.start("doc-1").await;
    let mut progress = vec![machine.state().progress_percent()];
    for stage in ["extracting", "mapping", "generating"] {
        channel.emit(&key, StatusNotification::new(stage));
        progress.push(machine.state().progress_percent());
    }
    report.check("progress follows stage table", progress == [25, 50, 75, 90]);

    channel.emit(&key, StatusNotification::new("extracting"));
    tracing::info!(
        ordering = ?config.pipeline.ordering,
        stage = %machine.state().stage,
        "late notification for an earlier stage"
    );

    channel.emit(&key, StatusNotification::new("completed"));
    report.check("completion reaches 100%", machine.state().progress_percent() == 100);

    machine.dispose();
    report.check("dispose unsubscribes", channel.subscriber_count(&key) == 0);
    report.check("trigger fired once", trigger.begun() == ["doc-1"]);
}
