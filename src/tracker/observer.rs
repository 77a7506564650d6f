use reconflow_common::{Phase, ProgressSnapshot};

use crate::errors::TrackingError;

/// Final outcome of a tracked session: the terminal snapshot, or why
/// tracking ended without one.
pub type TrackingResult = Result<ProgressSnapshot, TrackingError>;

/// Receives progress for one tracked phase.
///
/// `on_snapshot` is called in increasing `poll_seq` order. `on_complete` is
/// called exactly once when the session reaches a terminal state or tracking
/// is lost; it is not called when tracking is cancelled locally.
pub trait ProgressObserver: Send + Sync {
    fn on_snapshot(&self, snapshot: &ProgressSnapshot);

    fn on_complete(&self, phase: Phase, outcome: &TrackingResult);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_snapshot(&self, _snapshot: &ProgressSnapshot) {}

    fn on_complete(&self, _phase: Phase, _outcome: &TrackingResult) {}
}
