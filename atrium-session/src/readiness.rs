//! Initialization gate
//!
//! Holds overall readiness behind a set of opaque string keys. The
//! application is ready exactly when the set is empty. Features add a
//! key before starting async setup work and remove it when done,
//! including on their error paths.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Reserved key held by session hydration from the start, so the gate
/// cannot release before the session question is answered.
pub const AUTH_WAIT_KEY: &str = "auth";

pub struct InitializationGate {
    pending: Mutex<HashSet<String>>,
    ready_tx: watch::Sender<bool>,
    /// Interval between stall warnings while waiting. Zero disables
    /// them.
    warn_after: Duration,
}

impl InitializationGate {
    /// A new gate starts not-ready, seeded with [`AUTH_WAIT_KEY`].
    pub fn new(warn_after: Duration) -> Self {
        let mut pending = HashSet::new();
        pending.insert(AUTH_WAIT_KEY.to_string());
        let (ready_tx, _) = watch::channel(false);

        Self {
            pending: Mutex::new(pending),
            ready_tx,
            warn_after,
        }
    }

    /// Add `key` to the pending set, forcing the gate back to
    /// not-ready. Registering a key twice is a no-op.
    pub fn register(&self, key: impl Into<String>) {
        let key = key.into();
        let mut pending = self.lock();
        if pending.insert(key.clone()) {
            debug!(key = %key, pending = pending.len(), "initialization wait registered");
            self.ready_tx.send_replace(false);
        }
    }

    /// Remove `key`; when the set becomes empty the gate flips to
    /// ready. Completing a key that was never registered is a no-op.
    pub fn complete(&self, key: &str) {
        let mut pending = self.lock();
        if !pending.remove(key) {
            return;
        }

        if pending.is_empty() {
            info!(key = %key, "initialization complete, application ready");
            self.ready_tx.send_replace(true);
        } else {
            debug!(key = %key, pending = pending.len(), "initialization wait completed");
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Keys still holding the gate, sorted for stable diagnostics.
    pub fn pending(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().iter().cloned().collect();
        keys.sort();
        keys
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// Wait until every pending key has completed.
    ///
    /// There is deliberately no timeout: a key that never completes
    /// holds the application at its loading surface. While waiting, a
    /// warning naming the pending keys is logged every `warn_after`.
    pub async fn ready(&self) {
        let mut rx = self.ready_tx.subscribe();

        loop {
            if *rx.borrow_and_update() {
                return;
            }

            if self.warn_after.is_zero() {
                if rx.changed().await.is_err() {
                    return;
                }
            } else {
                match tokio::time::timeout(self.warn_after, rx.changed()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => return,
                    Err(_) => {
                        warn!(
                            pending = ?self.pending(),
                            "application still initializing"
                        );
                    }
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
