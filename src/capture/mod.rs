pub mod backend;
pub mod capability;
pub mod gallery;
pub mod job;
pub mod orchestrator;
pub mod screenshot;

pub use backend::{AudioGraph, AudioTrack, CaptureSurface, FrameStream, MediaRecorder, StillFrame};
pub use capability::{plan_backend, BackendPlan, CapabilityProfile};
pub use gallery::{ArtifactGallery, GalleryItem};
pub use job::{
    format_elapsed, Artifact, BackendKind, CaptureJob, CaptureMode, CaptureState, StopTrigger,
};
pub use orchestrator::{CaptureOrchestrator, CaptureSnapshot, RecordingToggle};
