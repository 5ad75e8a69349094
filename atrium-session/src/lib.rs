//! Atrium session layer
//!
//! Ties the authenticated HTTP client, the refresh coordinator, and
//! the background session check together behind one facade that owns
//! session state, permission checks, and application readiness.
//!
//! Hosts build an [`AtriumSession`], call [`AtriumSession::hydrate`]
//! once at startup, then read state and subscribe to events. Auth
//! failures never surface as errors from this layer; they show up as
//! state transitions.

pub mod notify;
pub mod permissions;
pub mod readiness;
pub mod storage;
pub mod store;

pub use notify::{
    first_password_notice, BroadcastNotificationSink, LogNotificationSink, PASSWORD_NOTICE_HEIGHT,
};
pub use permissions::PermissionEvaluator;
pub use readiness::{InitializationGate, AUTH_WAIT_KEY};
pub use storage::SnapshotStorage;
pub use store::{SessionEvent, SessionStore};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use atrium_client::{
    create_http_client, ApiClientConfig, AuthClient, HttpTokenRefresher, RefreshEvent,
    SessionCheckWorker, TokenRefreshCoordinator,
};
use atrium_core::{
    ApiConfig, AtriumConfig, AtriumError, NotificationSink, SessionState, TokenRefresher, User,
};
use reqwest::cookie::Jar;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::warn;

/// Errors raised while assembling or tearing down the session layer.
/// Runtime auth failures never appear here, they are absorbed into
/// session state instead.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] AtriumError),

    #[error("Session layer error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SessionError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// The assembled session layer.
pub struct AtriumSession {
    config: AtriumConfig,
    client: Arc<AuthClient>,
    store: Arc<SessionStore>,
    evaluator: PermissionEvaluator,
    gate: Arc<InitializationGate>,
    worker: tokio::sync::Mutex<SessionCheckWorker>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl AtriumSession {
    pub fn builder(config: AtriumConfig) -> AtriumSessionBuilder {
        AtriumSessionBuilder::new(config)
    }

    /// Build with defaults for everything but the config.
    pub async fn new(config: AtriumConfig) -> SessionResult<Self> {
        Self::builder(config).build().await
    }

    pub async fn hydrate(&self) -> SessionState {
        self.store.hydrate().await
    }

    pub async fn refresh_user(&self) -> SessionState {
        self.store.refresh_user().await
    }

    /// Manually invoke the single-flight session refresh, returning
    /// whether the backend renewed it. Concurrent callers share one
    /// attempt.
    pub async fn refresh_session(&self) -> bool {
        self.client.coordinator().refresh().await
    }

    pub fn logout(&self) {
        self.store.logout();
    }

    /// Wait until every registered readiness key has completed.
    pub async fn ready(&self) {
        self.gate.ready().await;
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Hold the readiness gate open for a feature's own setup work.
    pub fn register_app_wait(&self, key: impl Into<String>) {
        self.gate.register(key);
    }

    pub fn complete_app_wait(&self, key: &str) {
        self.gate.complete(key);
    }

    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    pub fn current_user(&self) -> Option<User> {
        self.store.current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn session_expired(&self) -> bool {
        self.store.session_expired()
    }

    /// Force the expired state, e.g. from a host-level auth failure
    /// outside this layer's own plumbing.
    pub fn mark_session_expired(&self) {
        self.store.mark_expired();
    }

    pub fn update_preference(&self, key: &str, value: serde_json::Value) {
        self.store.update_preference(key, value);
    }

    pub fn get_preference(&self, key: &str) -> Option<serde_json::Value> {
        self.store.get_preference(key)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.evaluator.has_permission(permission)
    }

    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        self.evaluator.has_any_permission(permissions)
    }

    pub fn has_all_permissions(&self, permissions: &[&str]) -> bool {
        self.evaluator.has_all_permissions(permissions)
    }

    pub fn is_admin(&self) -> bool {
        self.evaluator.is_admin()
    }

    pub fn password_notice_height(&self) -> u32 {
        self.store.password_notice_height()
    }

    pub fn subscribe_session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.store.subscribe()
    }

    pub fn subscribe_refresh_events(&self) -> broadcast::Receiver<RefreshEvent> {
        self.client.coordinator().subscribe()
    }

    pub fn subscribe_readiness(&self) -> watch::Receiver<bool> {
        self.gate.subscribe()
    }

    /// Request an immediate session check, e.g. when the host window
    /// regains focus.
    pub async fn poke_session_check(&self) {
        self.worker.lock().await.poke();
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn gate(&self) -> &Arc<InitializationGate> {
        &self.gate
    }

    pub fn client(&self) -> &Arc<AuthClient> {
        &self.client
    }

    pub fn config(&self) -> &AtriumConfig {
        &self.config
    }

    /// Stop the background worker and the expiry listener.
    pub async fn shutdown(&self) -> SessionResult<()> {
        self.worker.lock().await.shutdown().await;

        let listener = {
            let mut slot = self
                .listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(handle) = listener {
            handle.abort();
            if let Err(e) = handle.await {
                if e.is_panic() {
                    return Err(SessionError::internal_with_source(
                        "refresh event listener panicked",
                        e,
                    ));
                }
            }
        }
        Ok(())
    }
}

pub struct AtriumSessionBuilder {
    config: AtriumConfig,
    notifier: Option<Arc<dyn NotificationSink>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    start_checks: bool,
}

impl AtriumSessionBuilder {
    pub fn new(config: AtriumConfig) -> Self {
        Self {
            config,
            notifier: None,
            refresher: None,
            start_checks: true,
        }
    }

    /// Route notices somewhere other than the log.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Replace the HTTP-based session refresher.
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Enable or disable the periodic background session check.
    pub fn with_session_checks(mut self, enabled: bool) -> Self {
        self.start_checks = enabled;
        self
    }

    pub async fn build(self) -> SessionResult<AtriumSession> {
        self.config.validate()?;

        let client_config = ApiClientConfig::from(&self.config.api);
        let jar = Arc::new(Jar::default());
        let http = create_http_client(&client_config, Arc::clone(&jar))?;

        // The refresher rides the same jar as every other request, so
        // cookies set by a refresh reach the replays.
        let refresher = self.refresher.unwrap_or_else(|| {
            Arc::new(HttpTokenRefresher::new(
                http.clone(),
                &client_config.base_url,
            ))
        });
        let coordinator = Arc::new(TokenRefreshCoordinator::new(refresher));
        let client = Arc::new(AuthClient::from_parts(
            http,
            jar,
            client_config,
            Arc::clone(&coordinator),
        )?);

        let gate = Arc::new(InitializationGate::new(Duration::from_secs(
            self.config.session.gate_warn_secs,
        )));
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(LogNotificationSink));
        let snapshots = if self.config.session.persist_snapshot {
            Some(SnapshotStorage::new(self.config.session.snapshot_path())?)
        } else {
            None
        };

        let store = Arc::new(SessionStore::new(
            Arc::clone(&client),
            Arc::clone(&gate),
            notifier,
            snapshots,
        ));
        let evaluator = PermissionEvaluator::new(Arc::clone(&store));

        let listener = spawn_expiry_listener(Arc::clone(&store), coordinator.subscribe());

        let mut worker = SessionCheckWorker::new(
            Arc::clone(&client),
            Duration::from_secs(self.config.session.check_interval_secs),
            Duration::from_secs(self.config.session.check_jitter_secs),
        );
        if self.start_checks {
            worker.start();
        }

        Ok(AtriumSession {
            config: self.config,
            client,
            store,
            evaluator,
            gate,
            worker: tokio::sync::Mutex::new(worker),
            listener: Mutex::new(Some(listener)),
        })
    }
}

/// Forward failed refreshes into the store's expired state.
fn spawn_expiry_listener(
    store: Arc<SessionStore>,
    mut events: broadcast::Receiver<RefreshEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RefreshEvent::Failed) => store.mark_expired(),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "refresh event listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Session layer configured from the environment, suitable for most
/// hosts.
pub async fn create_default() -> SessionResult<AtriumSession> {
    let mut config = AtriumConfig::default();
    config.api = ApiConfig::from_env();
    AtriumSession::builder(config).build().await
}

/// In-memory session layer for tests and short-lived tools: no disk
/// snapshot, no background checks.
pub async fn create_ephemeral(base_url: &str) -> SessionResult<AtriumSession> {
    let mut config = AtriumConfig::default();
    config.api.base_url = base_url.to_string();
    config.session.persist_snapshot = false;
    AtriumSession::builder(config)
        .with_session_checks(false)
        .build()
        .await
}

pub mod prelude {
    pub use crate::notify::{BroadcastNotificationSink, LogNotificationSink};
    pub use crate::permissions::PermissionEvaluator;
    pub use crate::readiness::{InitializationGate, AUTH_WAIT_KEY};
    pub use crate::store::{SessionEvent, SessionStore};
    pub use crate::{
        create_default, create_ephemeral, AtriumSession, AtriumSessionBuilder, SessionError,
        SessionResult,
    };
    pub use atrium_client::RefreshEvent;
    pub use atrium_core::{AtriumConfig, Notice, SessionState, User};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> AtriumConfig {
        let mut config = AtriumConfig::default();
        config.api.base_url = "http://127.0.0.1:9/api".to_string();
        config.session.persist_snapshot = false;
        config
    }

    #[tokio::test]
    async fn builder_assembles_without_background_checks() {
        let session = AtriumSession::builder(offline_config())
            .with_session_checks(false)
            .build()
            .await
            .unwrap();

        assert!(!session.is_ready());
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(!session.worker.lock().await.is_running());

        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = offline_config();
        config.api.base_url.clear();

        assert!(AtriumSession::builder(config).build().await.is_err());
    }
}
