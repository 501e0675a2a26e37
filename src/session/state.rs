use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::viewer::DEFAULT_FAILURE_REASON;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Starting,
    Active,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Starting => "Starting",
            SessionStatus::Active => "Active",
            SessionStatus::Failed => "Failed",
        }
    }
}

/// What a failure transition left behind, for the events that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSession {
    pub session_id: Option<String>,
    pub reason: String,
    pub was_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub failure_reason: Option<String>,
    /// Busy flag for the start control. Cleared by any lifecycle event or by
    /// the start timeout, independently of `status`.
    pub start_pending: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// Bumped on every accepted start so a stale timeout cannot clear a newer
    /// request's busy flag.
    #[serde(skip)]
    pub start_generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a start request only from `Idle`. Returns the request's generation.
    pub fn begin_start(&mut self) -> Option<u64> {
        if self.status != SessionStatus::Idle {
            return None;
        }
        self.start_generation = self.start_generation.wrapping_add(1);
        self.status = SessionStatus::Starting;
        self.failure_reason = None;
        self.start_pending = true;
        Some(self.start_generation)
    }

    /// Moves to `Active`. A native path may start a session we never asked
    /// for, so `Idle` is accepted as well as `Starting`.
    pub fn activate(&mut self, session_id: String, now: DateTime<Utc>) -> Option<String> {
        match self.status {
            SessionStatus::Idle | SessionStatus::Starting => {
                self.status = SessionStatus::Active;
                self.session_id = Some(session_id.clone());
                self.started_at = Some(now);
                self.failure_reason = None;
                self.start_pending = false;
                Some(session_id)
            }
            SessionStatus::Active | SessionStatus::Failed => None,
        }
    }

    /// Ends the current session. Returns its id when something actually ended.
    pub fn end(&mut self) -> Option<String> {
        match self.status {
            SessionStatus::Active | SessionStatus::Starting => {
                let session_id = self.session_id.take();
                self.reset();
                Some(session_id.unwrap_or_default())
            }
            SessionStatus::Idle | SessionStatus::Failed => None,
        }
    }

    pub fn fail(&mut self, reason: &str) -> Option<FailedSession> {
        let was_active = match self.status {
            SessionStatus::Starting => false,
            SessionStatus::Active => true,
            SessionStatus::Idle | SessionStatus::Failed => return None,
        };
        let reason = if reason.trim().is_empty() {
            DEFAULT_FAILURE_REASON.to_string()
        } else {
            reason.to_string()
        };
        self.status = SessionStatus::Failed;
        self.failure_reason = Some(reason.clone());
        self.start_pending = false;
        Some(FailedSession {
            session_id: self.session_id.clone(),
            reason,
            was_active,
        })
    }

    /// Completes the `Failed -> Idle` hop. The failure reason stays readable.
    pub fn reset_after_failure(&mut self) {
        if self.status == SessionStatus::Failed {
            let reason = self.failure_reason.take();
            self.reset();
            self.failure_reason = reason;
        }
    }

    /// Clears the busy flag for the given request if nothing else has.
    pub fn release_start_control(&mut self, generation: u64) -> bool {
        if self.start_pending && self.start_generation == generation {
            self.start_pending = false;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        let generation = self.start_generation;
        *self = Self::default();
        self.start_generation = generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_accepted_only_from_idle() {
        let mut state = SessionState::new();
        let generation = state.begin_start().expect("first start accepted");
        assert_eq!(state.status, SessionStatus::Starting);
        assert!(state.start_pending);

        assert!(state.begin_start().is_none());
        state.activate("s1".into(), Utc::now());
        assert!(state.begin_start().is_none());
        assert_eq!(state.start_generation, generation);
    }

    #[test]
    fn failure_from_starting_resets_to_idle_keeping_reason() {
        let mut state = SessionState::new();
        state.begin_start();

        let failed = state.fail("").expect("failure applies while starting");
        assert_eq!(failed.reason, DEFAULT_FAILURE_REASON);
        assert!(!failed.was_active);
        assert_eq!(state.status, SessionStatus::Failed);

        state.reset_after_failure();
        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.failure_reason.as_deref(), Some(DEFAULT_FAILURE_REASON));
        assert!(state.begin_start().is_some());
    }

    #[test]
    fn stale_timeout_does_not_clear_newer_request() {
        let mut state = SessionState::new();
        let first = state.begin_start().unwrap();
        state.fail("denied");
        state.reset_after_failure();

        let second = state.begin_start().unwrap();
        assert_ne!(first, second);
        assert!(!state.release_start_control(first));
        assert!(state.start_pending);
        assert!(state.release_start_control(second));
        assert_eq!(state.status, SessionStatus::Starting);
    }

    #[test]
    fn end_is_ignored_when_idle() {
        let mut state = SessionState::new();
        assert!(state.end().is_none());

        state.activate("native".into(), Utc::now());
        assert_eq!(state.end().as_deref(), Some("native"));
        assert_eq!(state.status, SessionStatus::Idle);
        assert!(state.session_id.is_none());
    }
}
