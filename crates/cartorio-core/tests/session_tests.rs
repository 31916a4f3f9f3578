use cartorio_context::Clock;
use cartorio_core::prelude::*;
use cartorio_fetch::{FetchConfig, MemoryStore, SharedStore, SourceError};
use cartorio_test_utils::{ManualClock, ScriptedSource};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;

fn profile(id: &str) -> Profile {
    let mut profile = Profile::new(UserId::new(id));
    profile.office = Some("1º Tabelionato".to_string());
    profile
}

fn store() -> SharedStore {
    Arc::new(MemoryStore::default())
}

#[tokio::test(start_paused = true)]
async fn test_expired_stored_session_is_dropped() {
    let clock = ManualClock::at_millis(1_700_000_000_000);
    let source = ScriptedSource::new(vec![Ok(profile("u1"))]);
    let boot = SessionBootstrapper::new(source.clone(), store(), FetchConfig::default()).with_clock(clock.shared());

    let expired = Session::new(UserId::new("u1"), "t").with_expiry(clock.now() - ChronoDuration::minutes(1));
    boot.bootstrap(Some(expired)).await;

    let state = boot.state();
    assert!(!state.loading);
    assert!(state.session.is_none());
    assert_eq!(source.attempt_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_profile_retry_then_cache() {
    let source = ScriptedSource::new(vec![Err(SourceError::not_found("u1")), Ok(profile("u1"))]);
    let boot = SessionBootstrapper::new(source.clone(), store(), FetchConfig::default());

    boot.bootstrap(Some(Session::new(UserId::new("u1"), "t"))).await;
    assert_eq!(boot.state().profile, Some(profile("u1")));
    assert_eq!(source.attempt_count(), 2);

    boot.handle_event(AuthEvent::SignedOut).await;
    boot.handle_event(AuthEvent::SignedIn(Session::new(UserId::new("u1"), "t2"))).await;
    // cache was invalidated on sign-out and the script is exhausted
    assert_eq!(source.attempt_count(), 5);
    assert!(boot.state().profile.is_none());
}
