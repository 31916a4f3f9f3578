use cartorio_pipeline::{
    PipelineConfig, ProcessingMachine, Stage, StageOrdering, StatusNotification,
};
use cartorio_test_utils::{ManualPushChannel, RecordingTrigger};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

const KEY: &str = "document-status-doc-42";

fn machine(channel: &Arc<ManualPushChannel>, trigger: &Arc<RecordingTrigger>, ordering: StageOrdering) -> ProcessingMachine {
    ProcessingMachine::new(
        channel.clone(),
        trigger.clone(),
        PipelineConfig::default().with_ordering(ordering),
    )
}

#[tokio::test]
async fn test_raw_push_payloads() {
    let channel = ManualPushChannel::new();
    let trigger = RecordingTrigger::new();
    let machine = machine(&channel, &trigger, StageOrdering::LastWins);
    machine.start("doc-42").await;

    assert_eq!(channel.emit_json(KEY, json!({ "new": { "status": "extracting" } })), 1);
    assert_eq!(machine.state().progress_percent(), 50);

    channel.emit_json(KEY, json!({ "new": { "status": "error", "error_message": "X" } }));
    assert_eq!(machine.state().stage, Stage::Error);
    assert_eq!(machine.state().error.as_deref(), Some("X"));
}

#[tokio::test]
async fn test_full_run_to_completion() {
    let channel = ManualPushChannel::new();
    let trigger = RecordingTrigger::new();
    let machine = machine(&channel, &trigger, StageOrdering::Monotonic);
    let mut rx = machine.subscribe();
    machine.start("doc-42").await;

    let mut seen = vec![rx.borrow_and_update().progress_percent()];
    for stage in ["extracting", "mapping", "generating", "completed"] {
        channel.emit(KEY, StatusNotification::new(stage));
        seen.push(rx.borrow_and_update().progress_percent());
    }
    assert_eq!(seen, vec![25, 50, 75, 90, 100]);
    assert_eq!(trigger.begun(), vec!["doc-42".to_string()]);
}

#[tokio::test]
async fn test_subscription_refused() {
    let channel = ManualPushChannel::new();
    channel.refuse_subscriptions(true);
    let trigger = RecordingTrigger::new();
    let machine = machine(&channel, &trigger, StageOrdering::LastWins);

    machine.start("doc-42").await;
    assert_eq!(machine.state().stage, Stage::Error);
    assert!(trigger.begun().is_empty());
}

#[tokio::test]
async fn test_trigger_failure() {
    let channel = ManualPushChannel::new();
    let trigger = RecordingTrigger::new();
    trigger.set_failing(true);
    let machine = machine(&channel, &trigger, StageOrdering::LastWins);

    machine.start("doc-42").await;
    assert_eq!(machine.state().stage, Stage::Error);
}

#[tokio::test]
async fn test_drop_unsubscribes() {
    let channel = ManualPushChannel::new();
    let trigger = RecordingTrigger::new();
    let machine = machine(&channel, &trigger, StageOrdering::LastWins);
    machine.start("doc-42").await;
    assert_eq!(channel.subscriber_count(KEY), 1);

    drop(machine);
    assert_eq!(channel.subscriber_count(KEY), 0);
    assert_eq!(channel.emit(KEY, StatusNotification::new("mapping")), 0);
}

fn stage_name() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("classifying"),
        Just("extracting"),
        Just("mapping"),
        Just("generating"),
        Just("completed"),
        Just("error"),
        Just("bogus"),
    ]
}

fn run(ordering: StageOrdering, names: &[&'static str]) -> Vec<Stage> {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(async {
        let channel = ManualPushChannel::new();
        let trigger = RecordingTrigger::new();
        let machine = machine(&channel, &trigger, ordering);
        machine.start("doc-42").await;

        let mut observed = vec![machine.state().stage];
        for name in names {
            let notification = if *name == "error" {
                StatusNotification::error("failed")
            } else {
                StatusNotification::new(*name)
            };
            channel.emit(KEY, notification);
            let state = machine.state();
            assert_eq!(state.progress_percent(), state.stage.progress());
            observed.push(state.stage);
        }
        observed
    })
}

proptest! {
    #[test]
    fn prop_last_wins_tracks_last_known_stage(names in prop::collection::vec(stage_name(), 1..16)) {
        let observed = run(StageOrdering::LastWins, &names);
        let expected = names
            .iter()
            .rev()
            .find_map(|n| n.parse::<Stage>().ok())
            .unwrap_or(Stage::Classifying);
        prop_assert_eq!(*observed.last().unwrap(), expected);
    }

    #[test]
    fn prop_monotonic_never_moves_backward(names in prop::collection::vec(stage_name(), 1..16)) {
        let observed = run(StageOrdering::Monotonic, &names);
        for pair in observed.windows(2) {
            let (before, after) = (pair[0], pair[1]);
            if before.is_terminal() {
                prop_assert_eq!(after, before);
            } else {
                prop_assert!(after == Stage::Error || after.rank() >= before.rank());
            }
        }
    }
}
