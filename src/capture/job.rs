use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureMode {
    Screenshot,
    Video,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
    /// Records the live rendering stream into a media file.
    Real,
    /// Only runs the elapsed-time display; produces nothing.
    Simulated,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureState {
    Idle,
    Capturing,
    Running,
    Stopping,
    Stopped,
}

/// What ended a recording.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StopTrigger {
    User,
    TimeLimit,
    SessionEnded,
    Teardown,
}

impl StopTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopTrigger::User => "user",
            StopTrigger::TimeLimit => "time-limit",
            StopTrigger::SessionEnded => "session-ended",
            StopTrigger::Teardown => "teardown",
        }
    }
}

/// A finished capture ready for download or sharing.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(skip)]
    pub data: Arc<Vec<u8>>,
    pub mime_type: String,
    pub filename: String,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("mime_type", &self.mime_type)
            .field("filename", &self.filename)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

impl Artifact {
    pub fn new(data: Vec<u8>, encoding: &str, mode: CaptureMode, created_at: DateTime<Utc>) -> Self {
        let mime_type = mime_essence(encoding).to_string();
        let filename = artifact_filename(mode, &mime_type, created_at);
        Self {
            size_bytes: data.len(),
            data: Arc::new(data),
            mime_type,
            filename,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureJob {
    pub id: String,
    pub mode: CaptureMode,
    pub backend: BackendKind,
    pub state: CaptureState,
    pub elapsed_seconds: u64,
    pub max_duration_seconds: u64,
    pub encoding: Option<String>,
    pub started_at: DateTime<Utc>,
    pub stop_trigger: Option<StopTrigger>,
    pub artifact: Option<Artifact>,
}

impl CaptureJob {
    pub fn video(
        backend: BackendKind,
        encoding: Option<String>,
        max_duration_seconds: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            mode: CaptureMode::Video,
            backend,
            state: CaptureState::Running,
            elapsed_seconds: 0,
            max_duration_seconds,
            encoding,
            started_at: now,
            stop_trigger: None,
            artifact: None,
        }
    }

    pub fn screenshot(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            mode: CaptureMode::Screenshot,
            backend: BackendKind::Real,
            state: CaptureState::Capturing,
            elapsed_seconds: 0,
            max_duration_seconds: 0,
            encoding: Some("image/png".to_string()),
            started_at: now,
            stop_trigger: None,
            artifact: None,
        }
    }

    /// Advances the display by one tick. Returns `true` once the limit is hit.
    pub fn advance_tick(&mut self) -> bool {
        self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
        self.limit_reached()
    }

    pub fn limit_reached(&self) -> bool {
        self.elapsed_seconds >= self.max_duration_seconds
    }

    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }

    /// `Running -> Stopping`. Any other state is left alone.
    pub fn begin_stopping(&mut self, trigger: StopTrigger) -> bool {
        if self.state != CaptureState::Running {
            return false;
        }
        self.state = CaptureState::Stopping;
        self.stop_trigger = Some(trigger);
        true
    }

    pub fn finish(&mut self, artifact: Option<Artifact>) {
        self.state = CaptureState::Stopped;
        self.artifact = artifact;
    }
}

/// `MM:SS`, minutes keep growing past an hour.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn mime_essence(encoding: &str) -> &str {
    encoding.split(';').next().unwrap_or(encoding).trim()
}

fn artifact_filename(mode: CaptureMode, mime_type: &str, at: DateTime<Utc>) -> String {
    let stem = match mode {
        CaptureMode::Screenshot => "ar-photo",
        CaptureMode::Video => "ar-video",
    };
    let extension = match mime_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "bin",
    };
    format!("{stem}-{}.{extension}", at.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn elapsed_display_is_minutes_and_seconds() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(59), "00:59");
        assert_eq!(format_elapsed(60), "01:00");
        assert_eq!(format_elapsed(600), "10:00");
        assert_eq!(format_elapsed(3_725), "62:05");
    }

    #[test]
    fn artifact_naming_follows_encoding() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 5, 7).unwrap();
        let video = Artifact::new(vec![1, 2, 3], "video/webm;codecs=vp9,opus", CaptureMode::Video, at);
        assert_eq!(video.mime_type, "video/webm");
        assert_eq!(video.filename, "ar-video-20260314-090507.webm");
        assert_eq!(video.size_bytes, 3);

        let photo = Artifact::new(vec![0], "image/png", CaptureMode::Screenshot, at);
        assert_eq!(photo.filename, "ar-photo-20260314-090507.png");

        let odd = Artifact::new(vec![], "video/x-matroska", CaptureMode::Video, at);
        assert!(odd.filename.ends_with(".bin"));
    }

    #[test]
    fn stopping_only_from_running() {
        let mut job = CaptureJob::video(BackendKind::Simulated, None, 2, Utc::now());
        assert!(!job.advance_tick());
        assert!(job.advance_tick());
        assert_eq!(job.elapsed_display(), "00:02");

        assert!(job.begin_stopping(StopTrigger::TimeLimit));
        assert!(!job.begin_stopping(StopTrigger::User));
        assert_eq!(job.stop_trigger, Some(StopTrigger::TimeLimit));

        job.finish(None);
        assert_eq!(job.state, CaptureState::Stopped);
    }
}
