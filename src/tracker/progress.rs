use reconflow_common::Phase;
use std::sync::Arc;
use std::time::Duration;

use super::observer::{ProgressObserver, TrackingResult};
use super::scheduler::{Scheduler, TrackEventKind, TrackTicket, TrackerEvent};
use crate::errors::OrchestratorError;

struct Track {
    session_id: String,
    generation: u64,
    highest_seq: u64,
    observer: Arc<dyn ProgressObserver>,
}

/// A tracked session that reached its end.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOutcome {
    pub phase: Phase,
    pub session_id: String,
    pub result: TrackingResult,
}

/// Tracks at most one session per phase.
pub struct ProgressTracker {
    scheduler: Box<dyn Scheduler>,
    interval: Duration,
    tracks: [Option<Track>; 4],
    next_generation: u64,
}

impl ProgressTracker {
    pub fn new(scheduler: Box<dyn Scheduler>, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
            tracks: Default::default(),
            next_generation: 1,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin tracking `session_id` for `phase`, replacing any current track.
    pub fn start_tracking(
        &mut self,
        phase: Phase,
        session_id: impl Into<String>,
        observer: Arc<dyn ProgressObserver>,
    ) -> TrackTicket {
        self.stop_tracking(phase);

        let ticket = TrackTicket {
            phase,
            session_id: session_id.into(),
            generation: self.next_generation,
        };
        self.next_generation += 1;

        tracing::info!(%phase, session_id = %ticket.session_id, "Tracking session");
        self.tracks[phase.index()] = Some(Track {
            session_id: ticket.session_id.clone(),
            generation: ticket.generation,
            highest_seq: 0,
            observer,
        });
        self.scheduler.start(ticket.clone(), self.interval);
        ticket
    }

    /// Stop tracking `phase`. Returns whether a track was active.
    pub fn stop_tracking(&mut self, phase: Phase) -> bool {
        match self.tracks[phase.index()].take() {
            Some(track) => {
                tracing::debug!(%phase, session_id = %track.session_id, "Tracking stopped");
                self.scheduler.stop(phase);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for phase in Phase::ALL {
            self.stop_tracking(phase);
        }
    }

    pub fn is_tracking(&self, phase: Phase) -> bool {
        self.tracks[phase.index()].is_some()
    }

    /// Session currently tracked for `phase`.
    pub fn tracked_session(&self, phase: Phase) -> Option<&str> {
        self.tracks[phase.index()]
            .as_ref()
            .map(|track| track.session_id.as_str())
    }

    /// Apply one scheduler event.
    ///
    /// Events from replaced runs and snapshots at or below the highest
    /// `poll_seq` already seen are discarded. Returns the outcome when the
    /// event ended the track.
    pub fn handle(&mut self, event: TrackerEvent) -> Option<TrackOutcome> {
        let phase = event.phase;
        let track = self.tracks[phase.index()].as_mut()?;
        if track.generation != event.generation || track.session_id != event.session_id {
            tracing::debug!(
                %phase,
                session_id = %event.session_id,
                generation = event.generation,
                "Discarding event from a replaced run",
            );
            return None;
        }

        let result = match event.kind {
            TrackEventKind::Snapshot(snapshot) => {
                if snapshot.poll_seq <= track.highest_seq {
                    tracing::debug!(
                        %phase,
                        poll_seq = snapshot.poll_seq,
                        highest = track.highest_seq,
                        "Discarding out-of-order snapshot",
                    );
                    return None;
                }
                track.highest_seq = snapshot.poll_seq;
                track.observer.on_snapshot(&snapshot);
                if !snapshot.complete {
                    return None;
                }
                match &snapshot.error {
                    Some(message) => Err(OrchestratorError::JobFailure {
                        phase,
                        message: message.clone(),
                    }),
                    None => Ok(snapshot),
                }
            }
            TrackEventKind::Lost(error) => Err(error),
        };

        let track = self.tracks[phase.index()].take()?;
        self.scheduler.stop(phase);
        track.observer.on_complete(phase, &result);
        Some(TrackOutcome {
            phase,
            session_id: track.session_id,
            result,
        })
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.scheduler.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProgressReport;
    use crate::tracker::ManualScheduler;
    use reconflow_common::ProgressSnapshot;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seqs: Mutex<Vec<u64>>,
        completions: Mutex<Vec<TrackingResult>>,
    }

    impl ProgressObserver for Recorder {
        fn on_snapshot(&self, snapshot: &ProgressSnapshot) {
            self.seqs.lock().unwrap().push(snapshot.poll_seq);
        }

        fn on_complete(&self, _phase: Phase, outcome: &TrackingResult) {
            self.completions.lock().unwrap().push(outcome.clone());
        }
    }

    fn setup() -> (
        ProgressTracker,
        crate::tracker::ManualHandle,
        tokio::sync::mpsc::UnboundedReceiver<TrackerEvent>,
    ) {
        let (scheduler, rx) = ManualScheduler::new();
        let handle = scheduler.handle();
        (
            ProgressTracker::new(Box::new(scheduler), Duration::from_millis(1000)),
            handle,
            rx,
        )
    }

    fn drain(
        tracker: &mut ProgressTracker,
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<TrackerEvent>,
    ) -> Vec<TrackOutcome> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| tracker.handle(event))
            .collect()
    }

    #[test]
    fn test_out_of_order_snapshots_are_discarded() {
        let (mut tracker, handle, mut rx) = setup();
        let recorder = Arc::new(Recorder::default());
        tracker.start_tracking(Phase::FeatureExtraction, "s1", recorder.clone());

        let phase = Phase::FeatureExtraction;
        handle.push_report(phase, 1, ProgressReport::running(1, 10));
        handle.push_report(phase, 3, ProgressReport::running(3, 10));
        handle.push_report(phase, 2, ProgressReport::running(2, 10));
        handle.push_report(phase, 3, ProgressReport::running(3, 10));
        handle.push_report(phase, 4, ProgressReport::running(4, 10));

        assert!(drain(&mut tracker, &mut rx).is_empty());
        assert_eq!(*recorder.seqs.lock().unwrap(), vec![1, 3, 4]);
    }

    #[test]
    fn test_terminal_snapshot_completes_once() {
        let (mut tracker, handle, mut rx) = setup();
        let recorder = Arc::new(Recorder::default());
        tracker.start_tracking(Phase::FrameExtraction, "s1", recorder.clone());
        let ticket = handle.active(Phase::FrameExtraction).unwrap();

        handle.push_next(Phase::FrameExtraction, ProgressReport::finished());
        // A duplicate terminal event for the same run arrives late.
        handle.push(TrackerEvent::snapshot(
            &ticket,
            ProgressReport::finished().normalize(Phase::FrameExtraction, 2),
        ));

        let outcomes = drain(&mut tracker, &mut rx);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.as_ref().is_ok_and(|s| s.percent == 100.0));
        assert_eq!(recorder.completions.lock().unwrap().len(), 1);
        assert!(!tracker.is_tracking(Phase::FrameExtraction));
        assert_eq!(handle.stop_count(Phase::FrameExtraction), 1);
    }

    #[test]
    fn test_error_snapshot_is_job_failure() {
        let (mut tracker, handle, mut rx) = setup();
        tracker.start_tracking(Phase::DenseReconstruction, "d1", Arc::new(Recorder::default()));
        handle.push_next(
            Phase::DenseReconstruction,
            ProgressReport::failed("CUDA out of memory"),
        );

        let outcomes = drain(&mut tracker, &mut rx);
        assert_eq!(
            outcomes[0].result,
            Err(OrchestratorError::JobFailure {
                phase: Phase::DenseReconstruction,
                message: "CUDA out of memory".into(),
            })
        );
    }

    #[test]
    fn test_lost_tracking_is_delivered_to_observer() {
        let (mut tracker, handle, mut rx) = setup();
        let recorder = Arc::new(Recorder::default());
        tracker.start_tracking(Phase::SparseReconstruction, "sp", recorder.clone());
        handle.push_lost(
            Phase::SparseReconstruction,
            OrchestratorError::SessionNotFound {
                session_id: "sp".into(),
            },
        );

        let outcomes = drain(&mut tracker, &mut rx);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].session_id, "sp");
        assert!(matches!(
            recorder.completions.lock().unwrap()[0],
            Err(OrchestratorError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_restart_ignores_events_from_replaced_run() {
        let (mut tracker, handle, mut rx) = setup();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());

        let old = tracker.start_tracking(Phase::FrameExtraction, "old", first.clone());
        tracker.start_tracking(Phase::FrameExtraction, "new", second.clone());
        handle.push(TrackerEvent::snapshot(
            &old,
            ProgressReport::finished().normalize(Phase::FrameExtraction, 1),
        ));
        handle.push_next(Phase::FrameExtraction, ProgressReport::running(1, 2));

        assert!(drain(&mut tracker, &mut rx).is_empty());
        assert!(first.seqs.lock().unwrap().is_empty());
        assert_eq!(*second.seqs.lock().unwrap(), vec![1]);
        assert_eq!(tracker.tracked_session(Phase::FrameExtraction), Some("new"));
    }

    #[test]
    fn test_stop_tracking_is_idempotent() {
        let (mut tracker, handle, _rx) = setup();
        tracker.start_tracking(Phase::FrameExtraction, "s1", Arc::new(Recorder::default()));
        assert!(tracker.stop_tracking(Phase::FrameExtraction));
        assert!(!tracker.stop_tracking(Phase::FrameExtraction));
        assert_eq!(handle.stop_count(Phase::FrameExtraction), 1);
    }
}
