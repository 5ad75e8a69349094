//! Periodic session validity checks
//!
//! Backend sessions live for days, so validity only needs coarse,
//! hours-scale confirmation. Each tick issues a lightweight check
//! through the authenticated client; an expired session funnels into
//! the refresh coordinator via the standard 401 path.

use crate::http::AuthClient;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct SessionCheckWorker {
    client: Arc<AuthClient>,
    interval: Duration,
    jitter: Duration,
    shutdown: Arc<Notify>,
    poke: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl SessionCheckWorker {
    /// `jitter` shifts this instance's check schedule by a random
    /// offset so a fleet of clients does not hit the backend in
    /// lockstep.
    pub fn new(client: Arc<AuthClient>, interval: Duration, jitter: Duration) -> Self {
        Self {
            client,
            interval,
            jitter,
            shutdown: Arc::new(Notify::new()),
            poke: Arc::new(Notify::new()),
            handle: None,
        }
    }

    /// Spawn the background loop. Calling it again while running is a
    /// no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let client = Arc::clone(&self.client);
        let shutdown = Arc::clone(&self.shutdown);
        let poke = Arc::clone(&self.poke);
        let interval = self.interval;
        let first_delay = jittered(self.interval, self.jitter);

        self.handle = Some(tokio::spawn(async move {
            // Startup hydration already answered the session question,
            // so the first check waits a full interval.
            let start = tokio::time::Instant::now() + first_delay;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        check_session(&client).await;
                    }
                    _ = poke.notified() => {
                        debug!("session check requested out of band");
                        check_session(&client).await;
                    }
                    _ = shutdown.notified() => {
                        debug!("session check worker stopping");
                        break;
                    }
                }
            }
        }));
    }

    /// Request an immediate check, e.g. when an operator returns to a
    /// dormant terminal.
    pub fn poke(&self) {
        self.poke.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shutdown.notify_one();
            if let Err(e) = handle.await {
                warn!("session check worker did not shut down cleanly: {}", e);
            }
        }
    }
}

fn jittered(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        interval
    } else {
        interval + Duration::from_millis(fastrand::u64(0..=jitter.as_millis() as u64))
    }
}

async fn check_session(client: &AuthClient) {
    match client.get("auth/check-session").await {
        Ok(response) if response.status().is_success() => {
            debug!("session check passed");
        }
        Ok(response) => {
            // A 401 here means the refresh already ran and failed; the
            // coordinator's subscribers handle the expiry. Anything else
            // is the backend misbehaving.
            warn!("session check returned {}", response.status());
        }
        Err(e) => {
            warn!("session check failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let interval = Duration::from_secs(60);
        for _ in 0..100 {
            let delay = jittered(interval, Duration::from_secs(5));
            assert!(delay >= interval);
            assert!(delay <= interval + Duration::from_secs(5));
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let interval = Duration::from_secs(60);
        assert_eq!(jittered(interval, Duration::ZERO), interval);
    }
}
