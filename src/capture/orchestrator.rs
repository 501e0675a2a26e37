use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::CapturePolicy,
    error::CaptureError,
    event_bus::{AppEvent, EventBus},
    resource::{spawn_timer, ResourceLedger, TimerGuard},
    session::SessionStatus,
};

use super::{
    backend::{CaptureSurface, RealSession},
    capability::{plan_backend, BackendPlan, CapabilityProfile},
    job::{Artifact, BackendKind, CaptureJob, CaptureMode, CaptureState, StopTrigger},
    screenshot::{encode_png, PNG_MIME},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

struct ActiveRecording {
    job: CaptureJob,
    /// `None` for the Simulated backend, and once a stop has taken it.
    backend: Option<RealSession>,
    ticker: Option<TimerGuard>,
}

#[derive(Default)]
struct CaptureSlot {
    active: Option<ActiveRecording>,
    last_recording: Option<CaptureJob>,
    screenshot_in_flight: bool,
}

/// Handed from the locked transition to the unlocked finalisation.
struct PendingStop {
    job_id: String,
    trigger: StopTrigger,
    backend: Option<RealSession>,
}

impl CaptureSlot {
    /// `Running -> Stopping`: cancels the ticker and takes the backend out so
    /// it can be finalised without holding the lock.
    fn begin_stop(&mut self, trigger: StopTrigger) -> Option<PendingStop> {
        let active = self.active.as_mut()?;
        if !active.job.begin_stopping(trigger) {
            return None;
        }
        if let Some(mut ticker) = active.ticker.take() {
            ticker.release();
        }
        Some(PendingStop {
            job_id: active.job.id.clone(),
            trigger,
            backend: active.backend.take(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    pub state: CaptureState,
    pub recording: Option<CaptureJob>,
    pub last_recording: Option<CaptureJob>,
    pub screenshot_in_flight: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", content = "job", rename_all = "camelCase")]
pub enum RecordingToggle {
    Started(CaptureJob),
    /// `None` when a stop was already under way.
    Stopped(Option<CaptureJob>),
}

/// Arbitrates screenshots and recordings against the session and the
/// surface's capabilities. At most one recording exists at a time.
#[derive(Clone)]
pub struct CaptureOrchestrator {
    slot: Arc<Mutex<CaptureSlot>>,
    surface: Arc<dyn CaptureSurface>,
    policy: Arc<CapturePolicy>,
    audio_source: Option<String>,
    bus: Arc<EventBus>,
    session_status: watch::Receiver<SessionStatus>,
    ledger: ResourceLedger,
    heartbeat_every_ticks: u64,
    shutdown: CancellationToken,
}

impl CaptureOrchestrator {
    pub fn new(
        surface: Arc<dyn CaptureSurface>,
        policy: CapturePolicy,
        audio_source: Option<String>,
        bus: Arc<EventBus>,
        session_status: watch::Receiver<SessionStatus>,
        ledger: ResourceLedger,
    ) -> Self {
        Self {
            slot: Arc::new(Mutex::new(CaptureSlot::default())),
            surface,
            policy: Arc::new(policy),
            audio_source,
            bus,
            session_status,
            ledger,
            heartbeat_every_ticks: 10,
            shutdown: CancellationToken::new(),
        }
    }

    /// Debug mode logs a heartbeat on every tick instead of every tenth.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.heartbeat_every_ticks = if debug { 1 } else { 10 };
        self
    }

    pub async fn snapshot(&self) -> CaptureSnapshot {
        let slot = self.slot.lock().await;
        let recording = slot.active.as_ref().map(|active| active.job.clone());
        let state = match (&recording, slot.screenshot_in_flight) {
            (Some(job), _) => job.state,
            (None, true) => CaptureState::Capturing,
            (None, false) => CaptureState::Idle,
        };
        CaptureSnapshot {
            state,
            recording,
            last_recording: slot.last_recording.clone(),
            screenshot_in_flight: slot.screenshot_in_flight,
        }
    }

    pub fn probe(&self) -> CapabilityProfile {
        CapabilityProfile::probe(self.surface.as_ref(), &self.policy.encoding_preferences)
    }

    fn require_active_session(&self) -> Result<(), CaptureError> {
        if *self.session_status.borrow() == SessionStatus::Active {
            Ok(())
        } else {
            Err(CaptureError::SessionInactive)
        }
    }

    pub async fn start_recording(&self) -> Result<CaptureJob, CaptureError> {
        let mut slot = self.slot.lock().await;
        self.require_active_session()?;
        if slot.active.is_some() {
            return Err(CaptureError::Busy);
        }

        let profile = self.probe();
        let backend = match plan_backend(&profile) {
            BackendPlan::Real { encoding } => match RealSession::start(
                self.surface.as_ref(),
                &self.ledger,
                &encoding,
                self.audio_source.as_deref(),
            ) {
                Ok(session) => Some(session),
                Err(err) => {
                    warn!("real capture failed, using simulated recording: {}", err);
                    None
                }
            },
            BackendPlan::Simulated { reason } => {
                log_info!("simulated recording: {}", reason);
                None
            }
        };

        let kind = if backend.is_some() {
            BackendKind::Real
        } else {
            BackendKind::Simulated
        };
        let encoding = backend.as_ref().map(|b| b.encoding().to_string());
        let job = CaptureJob::video(
            kind,
            encoding.clone(),
            self.policy.max_duration_seconds,
            Utc::now(),
        );
        let ticker = self.spawn_ticker(job.id.clone());

        slot.active = Some(ActiveRecording {
            job: job.clone(),
            backend,
            ticker: Some(ticker),
        });
        drop(slot);

        info!("recording {} started ({:?})", job.id, kind);
        self.bus.publish(AppEvent::CaptureBackendSelected {
            job_id: job.id.clone(),
            backend: kind,
            encoding,
        });
        self.publish_state(&job.id, CaptureMode::Video, CaptureState::Running);
        self.bus.publish(AppEvent::RecordingTick {
            job_id: job.id.clone(),
            elapsed_seconds: 0,
            display: job.elapsed_display(),
        });

        Ok(job)
    }

    /// User stop. Returns the stopped job, or `None` if nothing was running
    /// or a stop was already under way.
    pub async fn stop_recording(&self) -> Result<Option<CaptureJob>, CaptureError> {
        self.stop_with(StopTrigger::User).await
    }

    pub async fn toggle_recording(&self) -> Result<RecordingToggle, CaptureError> {
        let recording = self.slot.lock().await.active.is_some();
        if recording {
            self.stop_recording().await.map(RecordingToggle::Stopped)
        } else {
            self.start_recording().await.map(RecordingToggle::Started)
        }
    }

    pub async fn take_screenshot(&self) -> Result<Artifact, CaptureError> {
        let profile = self.probe();
        {
            let mut slot = self.slot.lock().await;
            self.require_active_session()?;
            if !profile.can_extract_still {
                return Err(CaptureError::BackendUnavailable(
                    "still frame extraction not supported".into(),
                ));
            }
            if slot.screenshot_in_flight {
                return Err(CaptureError::Busy);
            }
            let recorder_running = slot
                .active
                .as_ref()
                .map(|active| active.backend.is_some())
                .unwrap_or(false);
            if recorder_running && !profile.still_during_recording {
                return Err(CaptureError::Busy);
            }
            slot.screenshot_in_flight = true;
        }

        let mut job = CaptureJob::screenshot(Utc::now());
        self.publish_state(&job.id, CaptureMode::Screenshot, CaptureState::Capturing);

        let result = match self.surface.extract_still().await {
            Ok(frame) => encode_png(frame),
            Err(err) => Err(CaptureError::BackendUnavailable(err)),
        };
        self.slot.lock().await.screenshot_in_flight = false;

        let artifact = result.map(|png| {
            Artifact::new(png, PNG_MIME, CaptureMode::Screenshot, job.started_at)
        });
        job.finish(artifact.as_ref().ok().cloned());
        self.publish_state(&job.id, CaptureMode::Screenshot, CaptureState::Stopped);

        match artifact {
            Ok(artifact) => {
                info!("screenshot {} captured ({} bytes)", artifact.filename, artifact.size_bytes);
                self.bus.publish(AppEvent::ArtifactReady {
                    job_id: job.id,
                    mode: CaptureMode::Screenshot,
                    artifact: artifact.clone(),
                });
                Ok(artifact)
            }
            Err(err) => {
                warn!("screenshot failed: {}", err);
                Err(err)
            }
        }
    }

    /// Forces a stop whenever the session ends or fails.
    pub fn spawn_session_listener(
        &self,
        mut events: broadcast::Receiver<AppEvent>,
    ) -> JoinHandle<()> {
        let orchestrator = self.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) if event.ends_session() => orchestrator.stop_for_session_end().await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("capture listener lagged; {} events skipped", skipped);
                        // A skipped end event still shows in the status channel.
                        if *orchestrator.session_status.borrow() != SessionStatus::Active {
                            orchestrator.stop_for_session_end().await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Unsubscribes and stops any recording. Used on page teardown.
    pub async fn shutdown(&self) -> Result<Option<CaptureJob>, CaptureError> {
        self.shutdown.cancel();
        self.stop_with(StopTrigger::Teardown).await
    }

    async fn stop_for_session_end(&self) {
        if let Err(err) = self.stop_with(StopTrigger::SessionEnded).await {
            warn!("recording stop on session end failed: {}", err);
        }
    }

    async fn stop_with(&self, trigger: StopTrigger) -> Result<Option<CaptureJob>, CaptureError> {
        let pending = self.slot.lock().await.begin_stop(trigger);
        match pending {
            Some(pending) => self.complete_stop(pending).await,
            None => Ok(None),
        }
    }

    /// Finalises outside the lock, then clears the slot. Cleanup and the
    /// `Stopped` transition happen even when the recorder fails; the error is
    /// returned afterwards.
    async fn complete_stop(&self, pending: PendingStop) -> Result<Option<CaptureJob>, CaptureError> {
        let PendingStop {
            job_id,
            trigger,
            backend,
        } = pending;
        self.publish_state(&job_id, CaptureMode::Video, CaptureState::Stopping);

        let (artifact, outcome) = match backend {
            Some(session) => {
                let encoding = session.encoding().to_string();
                match session.finish().await {
                    Ok(data) if data.is_empty() => {
                        log_warn!("recorder produced no data; no artifact");
                        (None, Ok(()))
                    }
                    Ok(data) => (
                        Some(Artifact::new(data, &encoding, CaptureMode::Video, Utc::now())),
                        Ok(()),
                    ),
                    Err(err) => (None, Err(err)),
                }
            }
            None => (None, Ok(())),
        };

        let finished = {
            let mut slot = self.slot.lock().await;
            let matches = slot
                .active
                .as_ref()
                .map(|active| active.job.id == job_id)
                .unwrap_or(false);
            let finished = if matches {
                slot.active.take().map(|mut active| {
                    active.job.finish(artifact.clone());
                    active.job
                })
            } else {
                None
            };
            if let Some(job) = finished.as_ref() {
                slot.last_recording = Some(job.clone());
            }
            finished
        };

        info!(
            "recording {} stopped ({}, artifact: {})",
            job_id,
            trigger.as_str(),
            artifact.is_some()
        );
        self.publish_state(&job_id, CaptureMode::Video, CaptureState::Stopped);
        self.bus.publish(AppEvent::RecordingStopped {
            job_id: job_id.clone(),
            trigger,
            has_artifact: artifact.is_some(),
        });
        if let Some(artifact) = artifact {
            self.bus.publish(AppEvent::ArtifactReady {
                job_id,
                mode: CaptureMode::Video,
                artifact,
            });
        }

        outcome.map(|()| finished)
    }

    fn spawn_ticker(&self, job_id: String) -> TimerGuard {
        let orchestrator = self.clone();
        let period = self.policy.tick_interval();
        spawn_timer(&self.ledger, move |token| async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {
                        if orchestrator.on_tick(&job_id, &token).await {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// One display tick. Returns `true` when the ticker should exit.
    async fn on_tick(&self, job_id: &str, token: &CancellationToken) -> bool {
        let (elapsed, display, pending) = {
            let mut slot = self.slot.lock().await;
            if token.is_cancelled() {
                return true;
            }
            let Some(active) = slot.active.as_mut() else {
                return true;
            };
            if active.job.id != job_id || active.job.state != CaptureState::Running {
                return true;
            }

            let limit_reached = active.job.advance_tick();
            let elapsed = active.job.elapsed_seconds;
            let display = active.job.elapsed_display();
            let pending = if limit_reached {
                slot.begin_stop(StopTrigger::TimeLimit)
            } else {
                None
            };
            (elapsed, display, pending)
        };

        if elapsed % self.heartbeat_every_ticks == 0 {
            info!("recording {} heartbeat at {}", job_id, display);
        } else {
            log_debug!("recording {} at {}", job_id, display);
        }
        self.bus.publish(AppEvent::RecordingTick {
            job_id: job_id.to_string(),
            elapsed_seconds: elapsed,
            display,
        });

        match pending {
            Some(pending) => {
                if let Err(err) = self.complete_stop(pending).await {
                    warn!("recording auto-stop failed: {}", err);
                }
                true
            }
            None => false,
        }
    }

    fn publish_state(&self, job_id: &str, mode: CaptureMode, state: CaptureState) {
        self.bus.publish(AppEvent::CaptureStateChanged {
            job_id: job_id.to_string(),
            mode,
            state,
        });
    }
}
