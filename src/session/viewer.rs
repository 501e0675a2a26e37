use async_trait::async_trait;

/// Reason used when the viewer reports a failure without saying why.
pub const DEFAULT_FAILURE_REASON: &str = "AR session could not be started";

/// The immersive viewer that actually enters and leaves AR.
#[async_trait]
pub trait Viewer: Send + Sync {
    /// Asks the viewer to enter immersive mode. `Ok` only means the request
    /// was accepted; the session is live once `ViewerEvent::SessionStarted`
    /// arrives.
    async fn activate_session(&self) -> Result<(), String>;
}

/// Lifecycle signals emitted by the viewer, in the order it emits them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    SessionStarted,
    SessionEnded,
    SessionError(String),
}

impl ViewerEvent {
    pub fn error(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if reason.trim().is_empty() {
            ViewerEvent::SessionError(DEFAULT_FAILURE_REASON.to_string())
        } else {
            ViewerEvent::SessionError(reason)
        }
    }
}
