pub mod audio;
pub mod capture;
pub mod commands;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod resource;
pub mod scene;
pub mod session;
pub mod settings;
mod utils;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use log::warn;
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};

use audio::{AudioPlayer, AudioSyncController};
use capture::{ArtifactGallery, CaptureOrchestrator, CaptureSurface};
use config::RuntimeConfig;
use event_bus::{AppEvent, EventBus};
use resource::{ResourceLedger, ResourceSnapshot};
use scene::SceneSettings;
use session::{SessionController, Viewer, ViewerEvent};
use settings::SettingsStore;

pub use utils::init_logging;

/// Host-provided boundaries the engine drives.
pub struct Collaborators {
    pub viewer: Arc<dyn Viewer>,
    pub surface: Arc<dyn CaptureSurface>,
    /// `None` when the host has no audio element.
    pub player: Option<Arc<dyn AudioPlayer>>,
}

/// One viewing of one scene: the session, its audio and its captures wired
/// together over a shared event bus.
pub struct ArViewer {
    pub(crate) session: SessionController,
    pub(crate) audio: AudioSyncController,
    pub(crate) capture: CaptureOrchestrator,
    pub(crate) gallery: ArtifactGallery,
    bus: Arc<EventBus>,
    ledger: ResourceLedger,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ArViewer {
    /// Must be called inside a tokio runtime. `scene_base` is where the
    /// scene's relative asset URLs resolve from.
    pub fn new(
        config: RuntimeConfig,
        scene: &SceneSettings,
        scene_base: &str,
        settings: Arc<SettingsStore>,
        collaborators: Collaborators,
        viewer_events: mpsc::UnboundedReceiver<ViewerEvent>,
    ) -> Self {
        let Collaborators {
            viewer,
            surface,
            player,
        } = collaborators;

        let bus = Arc::new(EventBus::new(config.event_capacity));
        let ledger = ResourceLedger::new();

        let session = SessionController::new(viewer, bus.clone(), ledger.clone(), &config.session);

        let audio_config = scene.audio_config(scene_base, settings.audio_muted());
        let audio_source = match (&audio_config, &player) {
            (Some(config), Some(_)) => Some(config.source_ref.clone()),
            _ => None,
        };
        let audio = AudioSyncController::new(
            audio_config,
            player,
            settings,
            bus.clone(),
            session.watch_status(),
            ledger.clone(),
        );

        let capture = CaptureOrchestrator::new(
            surface,
            scene.capture_policy(&config.capture),
            audio_source,
            bus.clone(),
            session.watch_status(),
            ledger.clone(),
        )
        .with_debug(config.debug);

        let gallery = ArtifactGallery::new(config.gallery_limit);

        // Listeners subscribe before the viewer pump starts so none of them
        // misses the first lifecycle event.
        let tasks = vec![
            audio.spawn_session_listener(bus.subscribe()),
            capture.spawn_session_listener(bus.subscribe()),
            gallery.spawn_collector(bus.subscribe()),
            session.attach_viewer_events(viewer_events),
        ];

        log::info!("AR viewer ready ({} listeners)", bus.subscriber_count());

        Self {
            session,
            audio,
            capture,
            gallery,
            bus,
            ledger,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn audio(&self) -> &AudioSyncController {
        &self.audio
    }

    pub fn capture(&self) -> &CaptureOrchestrator {
        &self.capture
    }

    pub fn gallery(&self) -> &ArtifactGallery {
        &self.gallery
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.bus.subscribe()
    }

    /// Timers, streams and audio graphs currently held.
    pub fn resources(&self) -> ResourceSnapshot {
        self.ledger.snapshot()
    }

    pub async fn set_page_visible(&self, visible: bool) {
        self.audio.set_page_visible(visible).await;
    }

    /// Page teardown: stops any recording, silences audio, unsubscribes
    /// every listener and waits for their tasks to exit.
    pub async fn shutdown(&self) {
        if let Err(err) = self.capture.shutdown().await {
            warn!("recording finalisation failed during teardown: {}", err);
        }
        self.audio.shutdown().await;
        self.session.shutdown().await;
        self.gallery.shutdown();

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(err) = task.await {
                warn!("listener task ended abnormally: {}", err);
            }
        }
    }
}
