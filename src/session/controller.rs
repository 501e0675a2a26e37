use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::SessionPolicy,
    error::SessionError,
    event_bus::{AppEvent, EventBus},
    resource::{spawn_timer, ResourceLedger, TimerGuard},
};

use super::{SessionState, SessionStatus, Viewer, ViewerEvent};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StartOutcome {
    /// Activation was handed to the viewer; wait for `SessionStarted`.
    Requested,
    /// A session is already starting or live; nothing was sent to the viewer.
    AlreadyInProgress,
}

/// Owns the session lifecycle. Everything else only observes it, through the
/// event bus or the status watch channel.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    viewer: Arc<dyn Viewer>,
    bus: Arc<EventBus>,
    status_tx: Arc<watch::Sender<SessionStatus>>,
    ledger: ResourceLedger,
    start_timeout: Duration,
    start_timer: Arc<Mutex<Option<(u64, TimerGuard)>>>,
    shutdown: CancellationToken,
}

impl SessionController {
    pub fn new(
        viewer: Arc<dyn Viewer>,
        bus: Arc<EventBus>,
        ledger: ResourceLedger,
        policy: &SessionPolicy,
    ) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            viewer,
            bus,
            status_tx: Arc::new(status_tx),
            ledger,
            start_timeout: policy.start_timeout(),
            start_timer: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    /// Read-only view of the status for other components.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub async fn request_start(&self) -> Result<StartOutcome, SessionError> {
        let generation = {
            let mut state = self.state.lock().await;
            match state.begin_start() {
                Some(generation) => {
                    self.set_status(SessionStatus::Starting);
                    generation
                }
                None => {
                    log_debug!("start ignored while {}", state.status.as_str());
                    return Ok(StartOutcome::AlreadyInProgress);
                }
            }
        };

        self.arm_start_timeout(generation).await;

        log_info!("requesting AR session activation");
        match self.viewer.activate_session().await {
            Ok(()) => Ok(StartOutcome::Requested),
            Err(reason) => {
                warn!("AR activation failed: {}", reason);
                let recorded = self.fail(&reason).await;
                Err(SessionError::ActivationFailed(recorded.unwrap_or(reason)))
            }
        }
    }

    pub async fn handle_viewer_event(&self, event: ViewerEvent) {
        match event {
            ViewerEvent::SessionStarted => self.on_started().await,
            ViewerEvent::SessionEnded => self.on_ended().await,
            ViewerEvent::SessionError(reason) => {
                self.fail(&reason).await;
            }
        }
    }

    /// Forwards viewer events in arrival order until the channel closes or
    /// the controller shuts down.
    pub fn attach_viewer_events(
        &self,
        mut events: mpsc::UnboundedReceiver<ViewerEvent>,
    ) -> JoinHandle<()> {
        let controller = self.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => controller.handle_viewer_event(event).await,
                        None => break,
                    },
                }
            }
            log_debug!("viewer event pump stopped");
        })
    }

    /// Stops the event pump and any pending start timeout.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.disarm_start_timeout().await;
    }

    async fn on_started(&self) {
        let session_id = {
            let mut state = self.state.lock().await;
            let Some(session_id) = state.activate(Uuid::new_v4().to_string(), Utc::now()) else {
                log_debug!("duplicate session start ignored");
                return;
            };
            self.set_status(SessionStatus::Active);
            session_id
        };
        self.disarm_start_timeout().await;

        info!("AR session {} started", session_id);
        self.bus.publish(AppEvent::SessionStarted { session_id });
    }

    async fn on_ended(&self) {
        let session_id = {
            let mut state = self.state.lock().await;
            let Some(session_id) = state.end() else {
                return;
            };
            self.set_status(SessionStatus::Idle);
            session_id
        };
        self.disarm_start_timeout().await;

        info!("AR session {} ended", session_id);
        self.bus.publish(AppEvent::SessionEnded { session_id });
    }

    /// `Starting|Active -> Failed -> Idle`. Returns the recorded reason if the
    /// transition happened.
    async fn fail(&self, reason: &str) -> Option<String> {
        let failed = {
            let mut state = self.state.lock().await;
            let failed = state.fail(reason)?;
            self.set_status(SessionStatus::Failed);
            failed
        };
        self.disarm_start_timeout().await;

        warn!(
            "AR session failed (was active: {}): {}",
            failed.was_active, failed.reason
        );
        self.bus.publish(AppEvent::SessionFailed {
            session_id: failed.session_id.clone(),
            reason: failed.reason.clone(),
        });

        {
            let mut state = self.state.lock().await;
            state.reset_after_failure();
            if state.status == SessionStatus::Idle {
                self.set_status(SessionStatus::Idle);
            }
        }
        Some(failed.reason)
    }

    async fn arm_start_timeout(&self, generation: u64) {
        let controller = self.clone();
        let timeout = self.start_timeout;
        let guard = spawn_timer(&self.ledger, move |token| async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    controller.release_start_control(generation, &token).await;
                }
            }
        });

        let mut slot = self.start_timer.lock().await;
        if let Some((_, mut previous)) = slot.replace((generation, guard)) {
            previous.release();
        }
    }

    async fn disarm_start_timeout(&self) {
        if let Some((_, mut guard)) = self.start_timer.lock().await.take() {
            guard.release();
        }
    }

    async fn release_start_control(&self, generation: u64, token: &CancellationToken) {
        let released = {
            let mut state = self.state.lock().await;
            !token.is_cancelled() && state.release_start_control(generation)
        };

        {
            let mut slot = self.start_timer.lock().await;
            if matches!(slot.as_ref(), Some((armed, _)) if *armed == generation) {
                if let Some((_, mut guard)) = slot.take() {
                    guard.release();
                }
            }
        }

        if released {
            log_info!(
                "no lifecycle event within {:?}; releasing start control",
                self.start_timeout
            );
            self.bus.publish(AppEvent::StartControlReleased);
        }
    }

    fn set_status(&self, status: SessionStatus) {
        self.status_tx.send_replace(status);
        self.bus.publish(AppEvent::SessionStatusChanged { status });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use crate::testing::{settle, FakeViewer};

    fn controller(viewer: Arc<FakeViewer>) -> (SessionController, Arc<EventBus>, ResourceLedger) {
        let bus = Arc::new(EventBus::new(64));
        let ledger = ResourceLedger::new();
        let controller =
            SessionController::new(viewer, bus.clone(), ledger.clone(), &SessionPolicy::default());
        (controller, bus, ledger)
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_start_reaches_viewer_once() {
        let viewer = Arc::new(FakeViewer::accepting());
        let (controller, _bus, _ledger) = controller(viewer.clone());

        assert_eq!(
            controller.request_start().await.unwrap(),
            StartOutcome::Requested
        );
        for _ in 0..3 {
            assert_eq!(
                controller.request_start().await.unwrap(),
                StartOutcome::AlreadyInProgress
            );
        }

        controller
            .handle_viewer_event(ViewerEvent::SessionStarted)
            .await;
        assert_eq!(controller.status(), SessionStatus::Active);
        assert_eq!(
            controller.request_start().await.unwrap(),
            StartOutcome::AlreadyInProgress
        );

        assert_eq!(viewer.activation_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn activation_error_fails_then_resets_to_idle() {
        let viewer = Arc::new(FakeViewer::rejecting("WebXR not supported"));
        let (controller, bus, ledger) = controller(viewer);
        let mut events = bus.subscribe();

        let err = controller.request_start().await.unwrap_err();
        assert_eq!(
            err,
            SessionError::ActivationFailed("WebXR not supported".into())
        );
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert_eq!(ledger.outstanding(ResourceKind::Timer), 0);

        let mut statuses = Vec::new();
        let mut failed_reason = None;
        while let Ok(event) = events.try_recv() {
            match event {
                AppEvent::SessionStatusChanged { status } => statuses.push(status),
                AppEvent::SessionFailed { reason, .. } => failed_reason = Some(reason),
                _ => {}
            }
        }
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Starting,
                SessionStatus::Failed,
                SessionStatus::Idle
            ]
        );
        assert_eq!(failed_reason.as_deref(), Some("WebXR not supported"));

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.failure_reason.as_deref(), Some("WebXR not supported"));
    }

    #[tokio::test(start_paused = true)]
    async fn start_timeout_releases_control_without_changing_status() {
        let viewer = Arc::new(FakeViewer::accepting());
        let (controller, bus, ledger) = controller(viewer);
        let mut events = bus.subscribe();

        controller.request_start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(controller.snapshot().await.start_pending);

        tokio::time::sleep(Duration::from_millis(200)).await;
        settle().await;
        let snapshot = controller.snapshot().await;
        assert!(!snapshot.start_pending);
        assert_eq!(snapshot.status, SessionStatus::Starting);
        assert_eq!(ledger.outstanding(ResourceKind::Timer), 0);

        let mut released = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, AppEvent::StartControlReleased) {
                released = true;
            }
        }
        assert!(released);

        // The slow native path may still deliver the session.
        controller
            .handle_viewer_event(ViewerEvent::SessionStarted)
            .await;
        assert_eq!(controller.status(), SessionStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_event_disarms_start_timeout() {
        let viewer = Arc::new(FakeViewer::accepting());
        let (controller, bus, ledger) = controller(viewer);

        controller.request_start().await.unwrap();
        controller
            .handle_viewer_event(ViewerEvent::SessionStarted)
            .await;
        assert_eq!(ledger.outstanding(ResourceKind::Timer), 0);

        let mut events = bus.subscribe();
        tokio::time::sleep(Duration::from_secs(10)).await;
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, AppEvent::StartControlReleased));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn viewer_events_are_rebroadcast_in_order() {
        let viewer = Arc::new(FakeViewer::accepting());
        let (controller, bus, _ledger) = controller(viewer);
        let mut events = bus.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = controller.attach_viewer_events(rx);

        tx.send(ViewerEvent::SessionStarted).unwrap();
        tx.send(ViewerEvent::SessionEnded).unwrap();
        tx.send(ViewerEvent::SessionStarted).unwrap();
        tx.send(ViewerEvent::error("tracking lost")).unwrap();
        settle().await;

        let mut lifecycle = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                AppEvent::SessionStarted { .. } => lifecycle.push("started".to_string()),
                AppEvent::SessionEnded { .. } => lifecycle.push("ended".to_string()),
                AppEvent::SessionFailed { reason, .. } => lifecycle.push(format!("failed:{reason}")),
                _ => {}
            }
        }
        assert_eq!(
            lifecycle,
            vec!["started", "ended", "started", "failed:tracking lost"]
        );
        assert_eq!(controller.status(), SessionStatus::Idle);

        controller.shutdown().await;
        settle().await;
        assert!(pump.is_finished());
    }
}
