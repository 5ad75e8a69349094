//! Session store
//!
//! Owns the in-memory session: the current user, their decoded
//! preferences, and whether a previously live session has since been
//! invalidated. Every auth failure is absorbed into state here, so
//! callers read state and subscribe to events instead of catching
//! errors.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use atrium_client::{response_error, AuthClient};
use atrium_core::performance;
use atrium_core::{
    decode_preference_value, MeResponse, NotificationSink, Preference, SessionState, User,
};
use reqwest::StatusCode;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::notify::{first_password_notice, PASSWORD_NOTICE_HEIGHT};
use crate::readiness::{InitializationGate, AUTH_WAIT_KEY};
use crate::storage::SnapshotStorage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    HydrationStarted,
    /// The current user or their preferences changed, including to
    /// "no user".
    UserUpdated,
    /// A previously live session could not be renewed.
    SessionExpired,
    LoggedOut,
}

#[derive(Default)]
struct SessionInner {
    user: Option<User>,
    /// Preference values by key, JSON-encoded as the backend stores
    /// them.
    preferences: HashMap<String, String>,
    expired: bool,
    /// Sticky marker that some user was applied this process lifetime,
    /// cleared only by logout. Distinguishes in-session expiry from a
    /// cold start that never had a session.
    was_authenticated: bool,
}

pub struct SessionStore {
    client: Arc<AuthClient>,
    inner: RwLock<SessionInner>,
    events: broadcast::Sender<SessionEvent>,
    gate: Arc<InitializationGate>,
    notifier: Arc<dyn NotificationSink>,
    snapshots: Option<SnapshotStorage>,
}

impl SessionStore {
    pub fn new(
        client: Arc<AuthClient>,
        gate: Arc<InitializationGate>,
        notifier: Arc<dyn NotificationSink>,
        snapshots: Option<SnapshotStorage>,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            client,
            inner: RwLock::new(SessionInner::default()),
            events,
            gate,
            notifier,
            snapshots,
        }
    }

    /// Load the session at startup.
    ///
    /// A provisional user from the `user` cookie (or, failing that,
    /// the on-disk snapshot) is applied immediately so the host can
    /// render something, then the backend's answer replaces it
    /// wholesale. The gate's auth key completes on every path.
    pub async fn hydrate(&self) -> SessionState {
        performance::measure_async("session_hydrate", self.hydrate_inner()).await
    }

    async fn hydrate_inner(&self) -> SessionState {
        self.emit(SessionEvent::HydrationStarted);

        if let Some(user) = self
            .client
            .user_cookie_snapshot()
            .or_else(|| self.snapshots.as_ref().and_then(SnapshotStorage::load))
        {
            debug!(user_id = %user.id, "provisional session restored");
            self.apply_provisional(user);
        }

        let state = self.fetch_authoritative().await;
        self.gate.complete(AUTH_WAIT_KEY);
        state
    }

    /// Re-fetch the current user and reconcile. Unlike [`hydrate`]
    /// this consults no provisional sources and leaves the
    /// initialization gate alone, but loading surfaces still get a
    /// fresh start signal.
    pub async fn refresh_user(&self) -> SessionState {
        debug!("re-fetching current user");
        self.emit(SessionEvent::HydrationStarted);
        self.fetch_authoritative().await
    }

    async fn fetch_authoritative(&self) -> SessionState {
        let response = match self.client.get("auth/me").await {
            Ok(response) => response,
            Err(e) => {
                e.log();
                return self.clear_session("current user fetch failed");
            }
        };

        // An unauthenticated visitor is a steady state, not an error.
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("no active session");
            self.discard_snapshot();
            return self.clear_session("backend reported no session");
        }

        if !response.status().is_success() {
            response_error(response, "fetch current user").await.log();
            return self.clear_session("current user fetch failed");
        }

        match response.json::<MeResponse>().await {
            Ok(MeResponse {
                status: true,
                data: Some(user),
            }) => self.apply_authoritative(user),
            Ok(_) => {
                debug!("current user payload carried no session");
                self.discard_snapshot();
                self.clear_session("backend reported no session")
            }
            Err(e) => {
                warn!("malformed current user payload: {}", e);
                self.clear_session("malformed current user payload")
            }
        }
    }

    fn apply_provisional(&self, user: User) {
        let preferences = index_preferences(&user.preferences);
        {
            let mut inner = self.write();
            inner.preferences = preferences;
            inner.user = Some(user);
            inner.was_authenticated = true;
        }
        self.emit(SessionEvent::UserUpdated);
    }

    fn apply_authoritative(&self, user: User) -> SessionState {
        if user.is_first_password {
            self.notifier.publish(first_password_notice());
        }

        if let Some(snapshots) = &self.snapshots {
            if let Err(e) = snapshots.save(&user) {
                warn!("failed to persist session snapshot: {}", e);
            }
        }

        info!(
            user_id = %user.id,
            role = user.role_name().unwrap_or("none"),
            "session established"
        );

        let preferences = index_preferences(&user.preferences);
        {
            let mut inner = self.write();
            inner.preferences = preferences;
            inner.user = Some(user);
            inner.expired = false;
            inner.was_authenticated = true;
        }
        self.emit(SessionEvent::UserUpdated);
        SessionState::Authenticated
    }

    /// Remove the persisted snapshot after the backend disowned the
    /// session. A transient fetch failure keeps it, so an offline start
    /// can still paint the provisional user.
    fn discard_snapshot(&self) {
        if let Some(snapshots) = &self.snapshots {
            if let Err(e) = snapshots.clear() {
                warn!("failed to remove session snapshot: {}", e);
            }
        }
    }

    /// Drop the in-memory user. The expired flag is left alone: only a
    /// successful hydration or an explicit logout resets it.
    fn clear_session(&self, reason: &str) -> SessionState {
        debug!(reason, "clearing in-memory session");
        let expired = {
            let mut inner = self.write();
            inner.user = None;
            inner.preferences.clear();
            inner.expired
        };
        self.emit(SessionEvent::UserUpdated);
        if expired {
            SessionState::Expired
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Force the expired state after a failed renewal.
    ///
    /// Ignored unless a session was live at some point in this process,
    /// so a cold start against a dead backend stays plain
    /// unauthenticated instead of prompting for re-authentication.
    pub fn mark_expired(&self) {
        {
            let mut inner = self.write();
            if !inner.was_authenticated {
                debug!("ignoring expiry signal, no session was ever live");
                return;
            }
            inner.user = None;
            inner.preferences.clear();
            inner.expired = true;
        }
        warn!("session expired, re-authentication required");
        self.emit(SessionEvent::SessionExpired);
    }

    /// Whether a previously live session has been forcibly cleared.
    /// Drives the re-authentication prompt, distinct from the ordinary
    /// logged-out state.
    pub fn session_expired(&self) -> bool {
        self.read().expired
    }

    /// Sign out: expire the auth cookies, drop any snapshot, and reset
    /// to a clean unauthenticated state. Navigation afterward is the
    /// caller's concern.
    pub fn logout(&self) {
        self.client.clear_session_cookies();
        self.discard_snapshot();

        {
            let mut inner = self.write();
            *inner = SessionInner::default();
        }
        info!("signed out");
        self.emit(SessionEvent::LoggedOut);
    }

    /// Local-only preference write for immediate feedback. Persisting
    /// the change to the backend is a separate domain action.
    pub fn update_preference(&self, key: &str, value: serde_json::Value) {
        let encoded = match serde_json::to_string(&value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key, "failed to encode preference value: {}", e);
                return;
            }
        };

        {
            let mut inner = self.write();
            inner.preferences.insert(key.to_string(), encoded);
        }
        self.emit(SessionEvent::UserUpdated);
    }

    pub fn get_preference(&self, key: &str) -> Option<serde_json::Value> {
        self.read()
            .preferences
            .get(key)
            .map(|raw| decode_preference_value(raw))
    }

    pub fn state(&self) -> SessionState {
        let inner = self.read();
        if inner.user.is_some() {
            SessionState::Authenticated
        } else if inner.expired {
            SessionState::Expired
        } else {
            SessionState::Unauthenticated
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().user.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Vertical space hosts should currently reserve for the
    /// first-password banner: [`PASSWORD_NOTICE_HEIGHT`] while the flag
    /// is set, zero otherwise.
    pub fn password_notice_height(&self) -> u32 {
        let applies = self.with_user(|user| user.map(|u| u.is_first_password).unwrap_or(false));
        if applies {
            PASSWORD_NOTICE_HEIGHT
        } else {
            0
        }
    }

    /// Run `f` against the current user under the read lock, without
    /// cloning.
    pub(crate) fn with_user<R>(&self, f: impl FnOnce(Option<&User>) -> R) -> R {
        f(self.read().user.as_ref())
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn index_preferences(preferences: &[Preference]) -> HashMap<String, String> {
    preferences
        .iter()
        .map(|p| (p.key.clone(), p.value.clone()))
        .collect()
}
