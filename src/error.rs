use thiserror::Error;

/// Failures surfaced by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The viewer refused or failed to enter immersive mode. Recoverable:
    /// the session is already back to idle and the user may retry.
    #[error("AR session activation failed: {0}")]
    ActivationFailed(String),
}

/// Failures from screenshot and recording requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("a capture is already in progress")]
    Busy,

    #[error("capture requires an active AR session")]
    SessionInactive,

    #[error("capture backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("recorder failed: {0}")]
    Recorder(String),

    #[error("failed to encode still frame: {0}")]
    Encode(String),
}

/// Failures from the audio element boundary. Never fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("audio playback blocked: {0}")]
    PlaybackBlocked(String),

    #[error("audio output error: {0}")]
    Output(String),

    #[error("no audio configured for this scene")]
    Unavailable,
}
