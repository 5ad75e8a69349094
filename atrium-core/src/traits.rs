//! Trait seams between the session stack and its host application

use crate::error::AtriumResult;
use async_trait::async_trait;

/// Renews the backend session using whatever credential the deployment
/// holds (refresh cookie, device token).
///
/// Callers treat the outcome as binary: `Ok` means the session was
/// renewed and in-flight work may retry, `Err` means it is gone.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> AtriumResult<()>;
}

/// Receives user-facing notices raised by the session layer.
///
/// The host decides how to render them: toast, banner, or a modal that
/// blocks until acknowledged.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notice: Notice);
}

/// A notice for the signed-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    /// Stable key so sinks can de-duplicate repeats of the same notice.
    pub key: String,
    pub title: String,
    pub body: String,
    /// Persistent notices stay visible until the user acts on them.
    pub persistent: bool,
}

impl Notice {
    pub fn persistent(
        key: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            body: body.into(),
            persistent: true,
        }
    }

    pub fn transient(
        key: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            body: body.into(),
            persistent: false,
        }
    }
}
