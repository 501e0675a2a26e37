//! Boundary to the rendering surface and the media handles a real recording
//! holds. Streams and audio graphs are always held through a
//! [`ResourceGuard`], so every exit path gives them back.

use async_trait::async_trait;

use crate::error::CaptureError;
use crate::resource::{Release, ResourceGuard, ResourceKind, ResourceLedger};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// An audio track produced by an [`AudioGraph`] for mixing into a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub id: String,
}

/// One rendered frame as tightly packed RGBA8.
#[derive(Debug, Clone)]
pub struct StillFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// The live rendering surface. Every probe is independent: a surface may
/// stream frames but lack a recorder, or extract stills but not while a
/// recorder holds the frames.
#[async_trait]
pub trait CaptureSurface: Send + Sync {
    fn can_stream_frames(&self) -> bool;
    fn has_recorder(&self) -> bool;
    fn can_extract_still(&self) -> bool;
    fn still_during_recording(&self) -> bool;
    fn is_encoding_supported(&self, encoding: &str) -> bool;

    fn open_stream(&self) -> Result<Box<dyn FrameStream>, String>;
    fn create_recorder(
        &self,
        stream: &dyn FrameStream,
        encoding: &str,
    ) -> Result<Box<dyn MediaRecorder>, String>;
    /// Routes the ambient track into a capturable audio output.
    fn build_audio_graph(&self, source_ref: &str) -> Result<Box<dyn AudioGraph>, String>;

    async fn extract_still(&self) -> Result<StillFrame, String>;
}

pub trait FrameStream: Send {
    fn add_audio_track(&mut self, track: AudioTrack) -> Result<(), String>;
    /// Stops every track of the stream.
    fn stop(&mut self);
}

#[async_trait]
pub trait MediaRecorder: Send {
    fn start(&mut self) -> Result<(), String>;
    /// Stops the recorder and returns the assembled media. Empty output means
    /// nothing was captured.
    async fn finish(&mut self) -> Result<Vec<u8>, String>;
}

pub trait AudioGraph: Send {
    fn output_track(&self) -> AudioTrack;
    fn close(&mut self);
}

impl Release for Box<dyn FrameStream> {
    fn release(&mut self) {
        self.stop();
    }
}

impl Release for Box<dyn AudioGraph> {
    fn release(&mut self) {
        self.close();
    }
}

pub type StreamGuard = ResourceGuard<Box<dyn FrameStream>>;
pub type AudioGraphGuard = ResourceGuard<Box<dyn AudioGraph>>;

/// Everything a running Real recording owns.
pub struct RealSession {
    encoding: String,
    recorder: Box<dyn MediaRecorder>,
    audio_graph: Option<AudioGraphGuard>,
    stream: StreamGuard,
}

impl RealSession {
    /// Opens the stream, mixes in the ambient track when there is one and
    /// starts the recorder. Anything acquired before a failure is released
    /// on the way out.
    pub fn start(
        surface: &dyn CaptureSurface,
        ledger: &ResourceLedger,
        encoding: &str,
        audio_source: Option<&str>,
    ) -> Result<Self, CaptureError> {
        let stream = surface
            .open_stream()
            .map_err(CaptureError::BackendUnavailable)?;
        let mut stream = ResourceGuard::acquire(ledger, ResourceKind::Stream, stream);

        let audio_graph = match audio_source {
            Some(source) => mix_audio(surface, ledger, &mut stream, source),
            None => None,
        };

        let handle = stream
            .get()
            .ok_or_else(|| CaptureError::BackendUnavailable("frame stream released".into()))?;
        let mut recorder = surface
            .create_recorder(&**handle, encoding)
            .map_err(CaptureError::BackendUnavailable)?;
        recorder.start().map_err(CaptureError::BackendUnavailable)?;

        log_info!(
            "real recording started ({}, audio: {})",
            encoding,
            audio_graph.is_some()
        );

        Ok(Self {
            encoding: encoding.to_string(),
            recorder,
            audio_graph,
            stream,
        })
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn has_audio(&self) -> bool {
        self.audio_graph.is_some()
    }

    /// Finalises the recorder, then releases the audio graph and the stream
    /// whether or not finalisation succeeded.
    pub async fn finish(mut self) -> Result<Vec<u8>, CaptureError> {
        let result = self.recorder.finish().await;
        if let Some(graph) = self.audio_graph.as_mut() {
            graph.release();
        }
        self.stream.release();
        result.map_err(CaptureError::Recorder)
    }
}

/// Failure here only costs the soundtrack; the recording continues video-only.
fn mix_audio(
    surface: &dyn CaptureSurface,
    ledger: &ResourceLedger,
    stream: &mut StreamGuard,
    source: &str,
) -> Option<AudioGraphGuard> {
    let graph = match surface.build_audio_graph(source) {
        Ok(graph) => ResourceGuard::acquire(ledger, ResourceKind::AudioGraph, graph),
        Err(err) => {
            log_warn!("audio mixing unavailable, recording video only: {}", err);
            return None;
        }
    };

    let track = graph.get().map(|g| g.output_track())?;
    let added = match stream.get_mut() {
        Some(handle) => handle.add_audio_track(track),
        None => Err("frame stream released".to_string()),
    };

    match added {
        Ok(()) => Some(graph),
        Err(err) => {
            log_warn!("could not attach audio track, recording video only: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSurface;

    #[tokio::test]
    async fn finish_releases_stream_and_graph() {
        let ledger = ResourceLedger::new();
        let surface = FakeSurface::builder().supported(&["video/webm"]).build();

        let session =
            RealSession::start(&surface, &ledger, "video/webm", Some("audio/ambient.mp3"))
                .expect("session");
        assert!(session.has_audio());
        assert_eq!(surface.counters().audio_tracks_added, 1);
        assert_eq!(surface.counters().recorders_started, 1);
        assert_eq!(ledger.outstanding(ResourceKind::Stream), 1);
        assert_eq!(ledger.outstanding(ResourceKind::AudioGraph), 1);

        let data = session.finish().await.expect("media");
        assert!(!data.is_empty());
        assert!(ledger.snapshot().is_empty());
        assert_eq!(surface.counters().streams_stopped, 1);
        assert_eq!(surface.counters().graphs_closed, 1);
    }

    #[tokio::test]
    async fn audio_graph_failure_degrades_to_video_only() {
        let ledger = ResourceLedger::new();
        let surface = FakeSurface::builder()
            .supported(&["video/webm"])
            .fail_audio_graph(true)
            .build();

        let session =
            RealSession::start(&surface, &ledger, "video/webm", Some("audio/ambient.mp3"))
                .expect("session");
        assert!(!session.has_audio());
        assert_eq!(ledger.outstanding(ResourceKind::AudioGraph), 0);

        session.finish().await.expect("media");
        assert!(ledger.snapshot().is_empty());
    }

    #[tokio::test]
    async fn recorder_construction_failure_releases_everything() {
        let ledger = ResourceLedger::new();
        let surface = FakeSurface::builder()
            .supported(&["video/webm"])
            .fail_recorder(true)
            .build();

        let result = RealSession::start(&surface, &ledger, "video/webm", Some("audio/ambient.mp3"));
        assert!(matches!(result, Err(CaptureError::BackendUnavailable(_))));
        assert!(ledger.snapshot().is_empty());

        let counters = surface.counters();
        assert_eq!(counters.streams_opened, counters.streams_stopped);
        assert_eq!(counters.graphs_built, counters.graphs_closed);
    }
}
