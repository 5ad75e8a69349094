//! Single-flight session refresh
//!
//! Every expiry signal funnels into one coordinator so that any number
//! of concurrent 401s produce at most one refresh call to the backend.

use async_trait::async_trait;
use atrium_core::{AtriumError, AtriumResult, ErrorContext, TokenRefresher};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Lifecycle of a refresh attempt, broadcast to interested parties.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshEvent {
    Started,
    Succeeded,
    /// The backend no longer honors the session. Subscribers should
    /// treat it as expired.
    Failed,
}

type SharedAttempt = Shared<BoxFuture<'static, bool>>;

/// Deduplicates refresh attempts.
///
/// Triggers funnel in from three places: the authenticated client on a
/// 401, the periodic check worker, and explicit pokes from the host.
/// Whoever arrives while an attempt is outstanding awaits that same
/// attempt and observes its result.
pub struct TokenRefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    in_flight: Mutex<Option<SharedAttempt>>,
    events: broadcast::Sender<RefreshEvent>,
}

impl TokenRefreshCoordinator {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            refresher,
            in_flight: Mutex::new(None),
            events,
        }
    }

    /// Coordinator that refuses every refresh, for deployments where an
    /// expired session must surface immediately.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopRefresher))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// Refresh the session, returning whether it was renewed.
    pub async fn refresh(&self) -> bool {
        let attempt = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) => {
                    debug!("joining in-flight session refresh");
                    existing.clone()
                }
                None => {
                    let attempt =
                        Self::run_refresh(Arc::clone(&self.refresher), self.events.clone())
                            .boxed()
                            .shared();
                    *slot = Some(attempt.clone());
                    attempt
                }
            }
        };

        let renewed = attempt.clone().await;

        // Clear the in-flight marker so the next expiry starts a fresh
        // attempt. Never clobber a newer attempt that raced in.
        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&attempt)) {
            *slot = None;
        }

        renewed
    }

    async fn run_refresh(
        refresher: Arc<dyn TokenRefresher>,
        events: broadcast::Sender<RefreshEvent>,
    ) -> bool {
        let _ = events.send(RefreshEvent::Started);
        info!("refreshing session");

        match refresher.refresh().await {
            Ok(()) => {
                info!("session refreshed");
                let _ = events.send(RefreshEvent::Succeeded);
                true
            }
            Err(e) => {
                warn!("session refresh failed: {}", e);
                let _ = events.send(RefreshEvent::Failed);
                false
            }
        }
    }
}

/// Default refresher hitting the backend's refresh endpoint. The shared
/// cookie jar carries the refresh credential out and captures the
/// renewed cookies from `Set-Cookie` on the way back.
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    refresh_url: String,
}

impl HttpTokenRefresher {
    /// `client` must share the cookie jar of the requests it is meant
    /// to rescue.
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            refresh_url: format!("{}/auth/refresh-token", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self) -> AtriumResult<()> {
        let response = self
            .client
            .post(&self.refresh_url)
            .send()
            .await
            .map_err(|e| atrium_core::http_error!("refresh request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(atrium_core::auth_error!(format!(
                "refresh rejected with status {}",
                status.as_u16()
            )));
        }

        Ok(())
    }
}

struct NoopRefresher;

#[async_trait]
impl TokenRefresher for NoopRefresher {
    async fn refresh(&self) -> AtriumResult<()> {
        Err(atrium_core::auth_error!("session refresh is not configured"))
    }
}
