//! Scoped acquisition for everything the engine must give back: timers,
//! frame streams and audio routing graphs.
//!
//! A [`ResourceGuard`] owns one resource from the moment it is acquired. The
//! paired release runs exactly once, either explicitly through
//! [`ResourceGuard::release`] or implicitly when the guard is dropped on an
//! early return. Releasing twice is a no-op.

use std::future::Future;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Timer,
    Stream,
    AudioGraph,
}

/// Something with a single teardown action.
pub trait Release {
    fn release(&mut self);
}

#[derive(Default)]
struct LedgerCounts {
    timers: AtomicUsize,
    streams: AtomicUsize,
    audio_graphs: AtomicUsize,
}

/// Counts resources currently held through guards. Cheap to clone; all
/// clones share the same counters.
#[derive(Clone, Default)]
pub struct ResourceLedger {
    counts: Arc<LedgerCounts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub timers: usize,
    pub streams: usize,
    pub audio_graphs: usize,
}

impl ResourceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.timers == 0 && self.streams == 0 && self.audio_graphs == 0
    }
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, kind: ResourceKind) -> &AtomicUsize {
        match kind {
            ResourceKind::Timer => &self.counts.timers,
            ResourceKind::Stream => &self.counts.streams,
            ResourceKind::AudioGraph => &self.counts.audio_graphs,
        }
    }

    fn record_acquire(&self, kind: ResourceKind) {
        self.counter(kind).fetch_add(1, Ordering::SeqCst);
    }

    fn record_release(&self, kind: ResourceKind) {
        let _ = self
            .counter(kind)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn outstanding(&self, kind: ResourceKind) -> usize {
        self.counter(kind).load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            timers: self.outstanding(ResourceKind::Timer),
            streams: self.outstanding(ResourceKind::Stream),
            audio_graphs: self.outstanding(ResourceKind::AudioGraph),
        }
    }
}

pub struct ResourceGuard<R: Release> {
    kind: ResourceKind,
    ledger: ResourceLedger,
    resource: Option<R>,
}

impl<R: Release> ResourceGuard<R> {
    pub fn acquire(ledger: &ResourceLedger, kind: ResourceKind, resource: R) -> Self {
        ledger.record_acquire(kind);
        Self {
            kind,
            ledger: ledger.clone(),
            resource: Some(resource),
        }
    }

    pub fn get(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut R> {
        self.resource.as_mut()
    }

    pub fn is_released(&self) -> bool {
        self.resource.is_none()
    }

    /// Runs the release action. Returns `false` if it had already run.
    pub fn release(&mut self) -> bool {
        match self.resource.take() {
            Some(mut resource) => {
                resource.release();
                self.ledger.record_release(self.kind);
                true
            }
            None => false,
        }
    }
}

impl<R: Release> Drop for ResourceGuard<R> {
    fn drop(&mut self) {
        self.release();
    }
}

/// The token that stops a spawned timer task.
///
/// Release only cancels the token; the task itself is detached. The task observes it at its next await
/// point and re-checks it under its owner's lock before any side effect, so a
/// timer may safely release its own guard from inside its fire path.
pub struct ScheduledTask {
    token: CancellationToken,
}

impl Release for ScheduledTask {
    fn release(&mut self) {
        self.token.cancel();
    }
}

pub type TimerGuard = ResourceGuard<ScheduledTask>;

/// Spawns `task` with a fresh cancellation token and hands back its guard.
pub fn spawn_timer<F, Fut>(ledger: &ResourceLedger, task: F) -> TimerGuard
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    tokio::spawn(task(token.clone()));
    ResourceGuard::acquire(ledger, ResourceKind::Timer, ScheduledTask { token })
}
