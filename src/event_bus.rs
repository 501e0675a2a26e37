//! Publish/subscribe between the session, audio and capture components.
//!
//! Every component publishes onto one broadcast channel; subscribers take a
//! receiver at construction time and drop it (or cancel their pump task) at
//! teardown. Events reach each receiver in publish order.

use tokio::sync::broadcast;

use crate::capture::{Artifact, BackendKind, CaptureMode, CaptureState, StopTrigger};
use crate::session::SessionStatus;

#[derive(Debug, Clone)]
pub enum AppEvent {
    // --- session ---
    SessionStatusChanged {
        status: SessionStatus,
    },

    SessionStarted {
        session_id: String,
    },

    SessionEnded {
        session_id: String,
    },

    SessionFailed {
        session_id: Option<String>,
        reason: String,
    },

    /// The start control may be re-enabled even though no lifecycle event arrived.
    StartControlReleased,

    // --- audio ---
    AudioPlaybackStarted,

    AudioPlaybackStopped,

    AudioPlaybackBlocked {
        reason: String,
    },

    AudioMuteChanged {
        muted: bool,
    },

    // --- capture ---
    CaptureBackendSelected {
        job_id: String,
        backend: BackendKind,
        encoding: Option<String>,
    },

    CaptureStateChanged {
        job_id: String,
        mode: CaptureMode,
        state: CaptureState,
    },

    RecordingTick {
        job_id: String,
        elapsed_seconds: u64,
        display: String,
    },

    RecordingStopped {
        job_id: String,
        trigger: StopTrigger,
        has_artifact: bool,
    },

    ArtifactReady {
        job_id: String,
        mode: CaptureMode,
        artifact: Artifact,
    },
}

impl AppEvent {
    /// True for the events that end a session's lifetime, whichever way it ended.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            AppEvent::SessionEnded { .. } | AppEvent::SessionFailed { .. }
        )
    }
}

pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishing with no subscribers is fine; the event is simply dropped.
    pub fn publish(&self, event: AppEvent) {
        match self.sender.send(event) {
            Ok(receivers) => log::trace!("event published to {} receivers", receivers),
            Err(_) => log::trace!("event published with no receivers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_publish_order() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(AppEvent::SessionStarted {
            session_id: "a".into(),
        });
        bus.publish(AppEvent::SessionEnded {
            session_id: "a".into(),
        });

        for receiver in [&mut first, &mut second] {
            match receiver.recv().await {
                Ok(AppEvent::SessionStarted { session_id }) => assert_eq!(session_id, "a"),
                other => panic!("unexpected event: {other:?}"),
            }
            let ended = receiver.recv().await.expect("second event");
            assert!(ended.ends_session());
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(AppEvent::StartControlReleased);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
