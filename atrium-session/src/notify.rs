//! Notification sinks
//!
//! The session layer raises user-facing notices (for example the
//! first-password prompt) through an injected sink instead of talking
//! to any rendering surface directly.

use atrium_core::{Notice, NotificationSink};
use tokio::sync::broadcast;
use tracing::info;

/// Height in logical pixels hosts reserve for the first-password
/// banner, exposed so layout code does not hard-code it.
pub const PASSWORD_NOTICE_HEIGHT: u32 = 40;

/// The persistent notice shown while the account still uses its
/// initially assigned password.
pub fn first_password_notice() -> Notice {
    Notice::persistent(
        "first-password",
        "Change your password",
        "Your account still uses the password it was created with. Set a new one to continue securely.",
    )
}

/// Default sink: writes notices to the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn publish(&self, notice: Notice) {
        info!(
            key = %notice.key,
            persistent = notice.persistent,
            "{}: {}",
            notice.title,
            notice.body
        );
    }
}

/// Fans notices out to broadcast subscribers, for hosts that render
/// them from their own event loop.
pub struct BroadcastNotificationSink {
    tx: broadcast::Sender<Notice>,
}

impl BroadcastNotificationSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for BroadcastNotificationSink {
    fn publish(&self, notice: Notice) {
        // Send only fails when nobody is subscribed.
        let _ = self.tx.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_password_notice_is_persistent() {
        let notice = first_password_notice();
        assert_eq!(notice.key, "first-password");
        assert!(notice.persistent);
    }

    #[tokio::test]
    async fn broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastNotificationSink::new();
        let mut rx = sink.subscribe();

        sink.publish(first_password_notice());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, first_password_notice());
    }
}
