//! Session bootstrap
//!
//! On startup the initial session read and the first auth-change event race
//! each other, and both want to load the user's profile. The bootstrapper
//! makes the initial load run once and keeps one profile load per user in
//! flight at a time.

use cartorio_context::{InitGuard, Session, SharedClock, SystemClock, UserId};
use cartorio_fetch::{CachedFetcher, FetchConfig, ResourceSource, SharedStore, SourceError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Profile row of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Same as the session's user id
    pub id: UserId,
    /// Display name
    #[serde(default)]
    pub full_name: Option<String>,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Notary office the user belongs to
    #[serde(default)]
    pub office: Option<String>,
}

impl Profile {
    /// Profile with only an id
    #[must_use]
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            full_name: None,
            email: None,
            office: None,
        }
    }
}

/// Auth change reported by the identity provider
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// Session restored at startup
    InitialSession(Option<Session>),
    /// Fresh sign-in
    SignedIn(Session),
    /// Access token rotated
    TokenRefreshed(Session),
    /// User attributes changed
    UserUpdated(Session),
    /// Session ended
    SignedOut,
}

/// Observable auth state
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    /// Current session
    pub session: Option<Session>,
    /// Profile of the session's user, once loaded
    pub profile: Option<Profile>,
    /// Bootstrap has not finished
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            profile: None,
            loading: true,
        }
    }
}

/// Serves cached profiles only for the user they belong to
struct ByUser<S>(S);

#[async_trait::async_trait]
impl<S: ResourceSource<Profile>> ResourceSource<Profile> for ByUser<S> {
    async fn fetch(&self, key: &str) -> Result<Profile, SourceError> {
        self.0.fetch(key).await
    }

    fn matches(&self, key: &str, value: &Profile) -> bool {
        value.id.as_str() == key
    }
}

/// Resolves the session at startup and keeps the profile in step with it
pub struct SessionBootstrapper {
    guard: InitGuard,
    profiles: CachedFetcher<Profile>,
    loading_for: Mutex<Option<UserId>>,
    state: watch::Sender<AuthState>,
    clock: SharedClock,
}

impl SessionBootstrapper {
    /// Create bootstrapper loading profiles from `source`
    pub fn new(
        source: impl ResourceSource<Profile> + 'static,
        store: SharedStore,
        config: FetchConfig,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            guard: InitGuard::new(),
            profiles: CachedFetcher::new(ByUser(source), store, config),
            loading_for: Mutex::new(None),
            state,
            clock: SystemClock::shared(),
        }
    }

    /// With clock, used for session expiry and cache timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.profiles = self.profiles.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Resolve the initial session; runs once until sign-out
    pub async fn bootstrap(&self, initial: Option<Session>) {
        if !self.guard.try_begin() {
            tracing::debug!("bootstrap already handled");
            return;
        }

        let session = initial.filter(|s| {
            let expired = s.is_expired(self.clock.as_ref());
            if expired {
                tracing::warn!(user = %s.user_id, "stored session expired");
            }
            !expired
        });

        match session {
            Some(session) => {
                let user = session.user_id.clone();
                self.state.send_modify(|state| state.session = Some(session));
                self.load_profile(&user, false).await;
            }
            None => self.state.send_modify(|state| state.session = None),
        }

        self.state.send_modify(|state| state.loading = false);
        tracing::info!(signed_in = self.state.borrow().session.is_some(), "session bootstrapped");
    }

    /// React to an auth change
    pub async fn handle_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::InitialSession(session) => self.bootstrap(session).await,
            AuthEvent::SignedIn(session)
            | AuthEvent::TokenRefreshed(session)
            | AuthEvent::UserUpdated(session) => {
                // a live session makes the pending initial read redundant
                let _ = self.guard.try_begin();
                let user = session.user_id.clone();
                self.state.send_modify(|state| {
                    if state.profile.as_ref().is_some_and(|p| p.id != user) {
                        state.profile = None;
                    }
                    state.session = Some(session);
                    state.loading = false;
                });
                let needs_profile = self.state.borrow().profile.is_none();

                if needs_profile {
                    self.load_profile(&user, false).await;
                }
            }
            AuthEvent::SignedOut => {
                self.profiles.invalidate();
                self.state.send_replace(AuthState {
                    loading: false,
                    ..AuthState::default()
                });
                self.guard.reset();
                tracing::info!("signed out");
            }
        }
    }

    /// Reload the current user's profile past the cache
    pub async fn refresh_profile(&self) -> Option<Profile> {
        let user = self.state.borrow().session.as_ref().map(|s| s.user_id.clone())?;
        self.profiles.invalidate();
        self.load_profile(&user, true).await
    }

    async fn load_profile(&self, user: &UserId, skip_cache: bool) -> Option<Profile> {
        {
            let mut loading = self.loading_for.lock();
            if loading.as_ref() == Some(user) {
                tracing::debug!(%user, "profile load already in flight");
                return None;
            }
            *loading = Some(user.clone());
        }

        let profile = self.profiles.fetch(user.as_str(), skip_cache).await;
        {
            let mut loading = self.loading_for.lock();
            if loading.as_ref() == Some(user) {
                *loading = None;
            }
        }

        match &profile {
            Some(found) => {
                self.state.send_if_modified(|state| {
                    let current = state.session.as_ref().is_some_and(|s| &s.user_id == user);
                    if current {
                        state.profile = Some(found.clone());
                    }
                    current
                });
            }
            None => tracing::warn!(%user, error = ?self.profiles.last_error(), "profile unavailable"),
        }
        profile
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Observe state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Profile fetcher, for diagnostics
    #[must_use]
    pub fn profiles(&self) -> &CachedFetcher<Profile> {
        &self.profiles
    }
}

impl fmt::Debug for SessionBootstrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBootstrapper")
            .field("started", &self.guard.is_started())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartorio_fetch::MemoryStore;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Profiles by id, answered after a fixed latency.
    struct Directory {
        profiles: HashMap<String, Profile>,
        calls: Arc<AtomicUsize>,
    }

    impl Directory {
        fn with(ids: &[&str]) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let profiles = ids
                .iter()
                .map(|id| {
                    let mut profile = Profile::new(UserId::new(*id));
                    profile.full_name = Some(format!("User {id}"));
                    ((*id).to_string(), profile)
                })
                .collect();
            (
                Self {
                    profiles,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait::async_trait]
    impl ResourceSource<Profile> for Directory {
        async fn fetch(&self, key: &str) -> Result<Profile, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.profiles
                .get(key)
                .cloned()
                .ok_or_else(|| SourceError::not_found(key))
        }
    }

    fn bootstrapper(ids: &[&str]) -> (Arc<SessionBootstrapper>, Arc<AtomicUsize>) {
        let (directory, calls) = Directory::with(ids);
        let store: SharedStore = Arc::new(MemoryStore::default());
        (
            Arc::new(SessionBootstrapper::new(directory, store, FetchConfig::default())),
            calls,
        )
    }

    fn session(id: &str) -> Session {
        Session::new(UserId::new(id), "token")
    }

    #[tokio::test(start_paused = true)]
    async fn racing_initial_reads_load_once() {
        let (boot, calls) = bootstrapper(&["u1"]);

        let a = tokio::spawn({
            let boot = boot.clone();
            async move { boot.bootstrap(Some(session("u1"))).await }
        });
        let b = tokio::spawn({
            let boot = boot.clone();
            async move { boot.handle_event(AuthEvent::InitialSession(Some(session("u1")))).await }
        });
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let state = boot.state();
        assert!(!state.loading);
        assert_eq!(state.profile.unwrap().id, UserId::new("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn no_session_finishes_loading() {
        let (boot, calls) = bootstrapper(&[]);
        boot.bootstrap(None).await;

        let state = boot.state();
        assert!(!state.loading);
        assert!(state.session.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_profile_still_finishes_loading() {
        let (boot, _) = bootstrapper(&[]);
        boot.bootstrap(Some(session("ghost"))).await;

        let state = boot.state();
        assert!(!state.loading);
        assert!(state.session.is_some());
        assert!(state.profile.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn token_refresh_for_same_user_reuses_profile() {
        let (boot, calls) = bootstrapper(&["u1"]);
        boot.bootstrap(Some(session("u1"))).await;
        boot.handle_event(AuthEvent::TokenRefreshed(session("u1"))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(boot.state().profile.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sign_in_as_other_user_loads_their_profile() {
        let (boot, calls) = bootstrapper(&["u1", "u2"]);
        boot.bootstrap(Some(session("u1"))).await;
        boot.handle_event(AuthEvent::SignedIn(session("u2"))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(boot.state().profile.unwrap().id, UserId::new("u2"));
    }

    #[tokio::test(start_paused = true)]
    async fn sign_out_clears_and_rearms() {
        let (boot, calls) = bootstrapper(&["u1"]);
        boot.bootstrap(Some(session("u1"))).await;
        boot.handle_event(AuthEvent::SignedOut).await;

        let state = boot.state();
        assert!(state.session.is_none() && state.profile.is_none() && !state.loading);

        boot.bootstrap(Some(session("u1"))).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_user_load_does_not_release_later_one() {
        let (boot, calls) = bootstrapper(&["u1", "u2"]);

        let first = tokio::spawn({
            let boot = boot.clone();
            async move { boot.handle_event(AuthEvent::SignedIn(session("u1"))).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = tokio::spawn({
            let boot = boot.clone();
            async move { boot.handle_event(AuthEvent::SignedIn(session("u2"))).await }
        });

        // u1 has finished, u2 is still loading
        tokio::time::sleep(Duration::from_millis(45)).await;
        assert!(first.is_finished());
        boot.handle_event(AuthEvent::TokenRefreshed(session("u2"))).await;
        second.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(boot.state().profile.unwrap().id, UserId::new("u2"));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_skips_cache() {
        let (boot, calls) = bootstrapper(&["u1"]);
        boot.bootstrap(Some(session("u1"))).await;

        let refreshed = boot.refresh_profile().await;
        assert_eq!(refreshed.map(|p| p.id), Some(UserId::new("u1")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
