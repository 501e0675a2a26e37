//! The command surface a UI shell calls. Every command returns
//! `Result<_, String>` so errors cross the boundary as plain messages.

use crate::{
    audio::AudioSnapshot,
    capture::{Artifact, CaptureJob, CaptureOrchestrator, CaptureSnapshot, GalleryItem, RecordingToggle},
    session::{SessionController, SessionState, StartOutcome},
    ArViewer,
};

fn session_from_state(app: &ArViewer) -> SessionController {
    app.session.clone()
}

fn capture_from_state(app: &ArViewer) -> CaptureOrchestrator {
    app.capture.clone()
}

pub async fn request_start(app: &ArViewer) -> Result<StartOutcome, String> {
    let session = session_from_state(app);
    session.request_start().await.map_err(|e| e.to_string())
}

pub async fn session_state(app: &ArViewer) -> Result<SessionState, String> {
    let session = session_from_state(app);
    Ok(session.snapshot().await)
}

/// Returns the new muted flag.
pub async fn toggle_mute(app: &ArViewer) -> Result<bool, String> {
    app.audio.toggle_mute().await.map_err(|e| e.to_string())
}

pub async fn audio_state(app: &ArViewer) -> Result<AudioSnapshot, String> {
    Ok(app.audio.snapshot().await)
}

pub async fn set_page_visible(app: &ArViewer, visible: bool) -> Result<(), String> {
    app.set_page_visible(visible).await;
    Ok(())
}

pub async fn take_screenshot(app: &ArViewer) -> Result<Artifact, String> {
    let capture = capture_from_state(app);
    capture.take_screenshot().await.map_err(|e| e.to_string())
}

pub async fn toggle_recording(app: &ArViewer) -> Result<RecordingToggle, String> {
    let capture = capture_from_state(app);
    capture.toggle_recording().await.map_err(|e| e.to_string())
}

pub async fn stop_recording(app: &ArViewer) -> Result<Option<CaptureJob>, String> {
    let capture = capture_from_state(app);
    capture.stop_recording().await.map_err(|e| e.to_string())
}

pub async fn capture_state(app: &ArViewer) -> Result<CaptureSnapshot, String> {
    let capture = capture_from_state(app);
    Ok(capture.snapshot().await)
}

pub async fn gallery(app: &ArViewer) -> Result<Vec<GalleryItem>, String> {
    Ok(app.gallery.items().await)
}
