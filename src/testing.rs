//! Doubles for the viewer, the audio element and the capture surface. Each
//! one counts calls so tests can assert what happened and that every
//! acquired handle was given back.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    audio::AudioPlayer,
    capture::{AudioGraph, AudioTrack, CaptureSurface, FrameStream, MediaRecorder, StillFrame},
    error::AudioError,
    session::Viewer,
};

/// Lets every ready task run. With a paused clock the runtime only advances
/// once all tasks are idle, so this returns after pending work has settled.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub struct FakeViewer {
    reject_with: Option<String>,
    calls: AtomicUsize,
}

impl FakeViewer {
    pub fn accepting() -> Self {
        Self {
            reject_with: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            reject_with: Some(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn activation_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Viewer for FakeViewer {
    async fn activate_session(&self) -> Result<(), String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reject_with {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }
}

pub struct FakePlayer {
    blocked: Option<String>,
    plays: AtomicUsize,
    pauses: AtomicUsize,
    rewinds: AtomicUsize,
    muted: AtomicBool,
}

impl FakePlayer {
    pub fn new() -> Self {
        Self {
            blocked: None,
            plays: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            rewinds: AtomicUsize::new(0),
            muted: AtomicBool::new(false),
        }
    }

    /// Every `play` attempt is refused with `reason`.
    pub fn blocked(reason: &str) -> Self {
        Self {
            blocked: Some(reason.to_string()),
            ..Self::new()
        }
    }

    pub fn play_calls(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn pause_calls(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn rewind_calls(&self) -> usize {
        self.rewinds.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    async fn play(&self) -> Result<(), AudioError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        match &self.blocked {
            Some(reason) => Err(AudioError::PlaybackBlocked(reason.clone())),
            None => Ok(()),
        }
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn rewind(&self) {
        self.rewinds.fetch_add(1, Ordering::SeqCst);
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceCounters {
    pub streams_opened: usize,
    pub streams_stopped: usize,
    pub graphs_built: usize,
    pub graphs_closed: usize,
    pub recorders_started: usize,
    pub recorders_finished: usize,
    pub audio_tracks_added: usize,
}

#[derive(Clone)]
struct SurfaceFlags {
    stream: bool,
    recorder: bool,
    still: bool,
    still_during_recording: bool,
    supported: Vec<String>,
    fail_recorder: bool,
    fail_audio_graph: bool,
    fail_finish: bool,
    empty_output: bool,
}

/// A capture surface whose capabilities are set per test. Clones share
/// their counters.
#[derive(Clone)]
pub struct FakeSurface {
    flags: SurfaceFlags,
    counters: Arc<Mutex<SurfaceCounters>>,
}

pub struct FakeSurfaceBuilder {
    flags: SurfaceFlags,
}

impl FakeSurfaceBuilder {
    pub fn stream(mut self, yes: bool) -> Self {
        self.flags.stream = yes;
        self
    }

    pub fn recorder(mut self, yes: bool) -> Self {
        self.flags.recorder = yes;
        self
    }

    pub fn still(mut self, yes: bool) -> Self {
        self.flags.still = yes;
        self
    }

    pub fn still_during_recording(mut self, yes: bool) -> Self {
        self.flags.still_during_recording = yes;
        self
    }

    pub fn supported(mut self, encodings: &[&str]) -> Self {
        self.flags.supported = encodings.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn fail_recorder(mut self, yes: bool) -> Self {
        self.flags.fail_recorder = yes;
        self
    }

    pub fn fail_audio_graph(mut self, yes: bool) -> Self {
        self.flags.fail_audio_graph = yes;
        self
    }

    pub fn fail_finish(mut self, yes: bool) -> Self {
        self.flags.fail_finish = yes;
        self
    }

    pub fn empty_output(mut self, yes: bool) -> Self {
        self.flags.empty_output = yes;
        self
    }

    pub fn build(self) -> FakeSurface {
        FakeSurface {
            flags: self.flags,
            counters: Arc::new(Mutex::new(SurfaceCounters::default())),
        }
    }
}

impl FakeSurface {
    /// Everything present, nothing failing, no encodings supported.
    pub fn builder() -> FakeSurfaceBuilder {
        FakeSurfaceBuilder {
            flags: SurfaceFlags {
                stream: true,
                recorder: true,
                still: true,
                still_during_recording: false,
                supported: Vec::new(),
                fail_recorder: false,
                fail_audio_graph: false,
                fail_finish: false,
                empty_output: false,
            },
        }
    }

    pub fn counters(&self) -> SurfaceCounters {
        *self.counters.lock().unwrap()
    }

    fn bump(&self, f: impl FnOnce(&mut SurfaceCounters)) {
        f(&mut self.counters.lock().unwrap());
    }
}

#[async_trait]
impl CaptureSurface for FakeSurface {
    fn can_stream_frames(&self) -> bool {
        self.flags.stream
    }

    fn has_recorder(&self) -> bool {
        self.flags.recorder
    }

    fn can_extract_still(&self) -> bool {
        self.flags.still
    }

    fn still_during_recording(&self) -> bool {
        self.flags.still_during_recording
    }

    fn is_encoding_supported(&self, encoding: &str) -> bool {
        self.flags.supported.iter().any(|e| e == encoding)
    }

    fn open_stream(&self) -> Result<Box<dyn FrameStream>, String> {
        if !self.flags.stream {
            return Err("stream capture unsupported".into());
        }
        self.bump(|c| c.streams_opened += 1);
        Ok(Box::new(FakeStream {
            surface: self.clone(),
        }))
    }

    fn create_recorder(
        &self,
        _stream: &dyn FrameStream,
        encoding: &str,
    ) -> Result<Box<dyn MediaRecorder>, String> {
        if self.flags.fail_recorder {
            return Err(format!("recorder rejected {encoding}"));
        }
        Ok(Box::new(FakeRecorder {
            surface: self.clone(),
        }))
    }

    fn build_audio_graph(&self, source_ref: &str) -> Result<Box<dyn AudioGraph>, String> {
        if self.flags.fail_audio_graph {
            return Err(format!("cannot route {source_ref}"));
        }
        self.bump(|c| c.graphs_built += 1);
        Ok(Box::new(FakeGraph {
            surface: self.clone(),
        }))
    }

    async fn extract_still(&self) -> Result<StillFrame, String> {
        if !self.flags.still {
            return Err("no still extraction".into());
        }
        Ok(StillFrame {
            width: 2,
            height: 2,
            rgba: vec![128; 16],
        })
    }
}

struct FakeStream {
    surface: FakeSurface,
}

impl FrameStream for FakeStream {
    fn add_audio_track(&mut self, track: AudioTrack) -> Result<(), String> {
        if track.id.is_empty() {
            return Err("track has no id".into());
        }
        self.surface.bump(|c| c.audio_tracks_added += 1);
        Ok(())
    }

    fn stop(&mut self) {
        self.surface.bump(|c| c.streams_stopped += 1);
    }
}

struct FakeRecorder {
    surface: FakeSurface,
}

#[async_trait]
impl MediaRecorder for FakeRecorder {
    fn start(&mut self) -> Result<(), String> {
        self.surface.bump(|c| c.recorders_started += 1);
        Ok(())
    }

    async fn finish(&mut self) -> Result<Vec<u8>, String> {
        self.surface.bump(|c| c.recorders_finished += 1);
        if self.surface.flags.fail_finish {
            return Err("recorder stopped with an error".into());
        }
        if self.surface.flags.empty_output {
            return Ok(Vec::new());
        }
        Ok(b"fake-media".to_vec())
    }
}

struct FakeGraph {
    surface: FakeSurface,
}

impl AudioGraph for FakeGraph {
    fn output_track(&self) -> AudioTrack {
        AudioTrack {
            id: "ambient-mix".into(),
        }
    }

    fn close(&mut self) {
        self.surface.bump(|c| c.graphs_closed += 1);
    }
}
