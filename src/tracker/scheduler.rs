use reconflow_common::{Phase, ProgressSnapshot};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineApi, ProgressReport};
use crate::errors::{EngineError, OrchestratorError};

/// Identifies one tracking run of a session.
///
/// `generation` changes every time tracking (re)starts, so events emitted by
/// a replaced or cancelled run can be told apart from the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTicket {
    pub phase: Phase,
    pub session_id: String,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackEventKind {
    /// A normalized progress observation.
    Snapshot(ProgressSnapshot),
    /// Tracking cannot continue: transport failure or unknown session.
    Lost(OrchestratorError),
}

/// A scheduler output, addressed to the run that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerEvent {
    pub phase: Phase,
    pub session_id: String,
    pub generation: u64,
    pub kind: TrackEventKind,
}

impl TrackerEvent {
    pub fn snapshot(ticket: &TrackTicket, snapshot: ProgressSnapshot) -> Self {
        Self::new(ticket, TrackEventKind::Snapshot(snapshot))
    }

    pub fn lost(ticket: &TrackTicket, error: OrchestratorError) -> Self {
        Self::new(ticket, TrackEventKind::Lost(error))
    }

    fn new(ticket: &TrackTicket, kind: TrackEventKind) -> Self {
        Self {
            phase: ticket.phase,
            session_id: ticket.session_id.clone(),
            generation: ticket.generation,
            kind,
        }
    }

    /// Whether this event ends the run that produced it.
    pub fn is_terminal(&self) -> bool {
        match &self.kind {
            TrackEventKind::Snapshot(snapshot) => snapshot.complete,
            TrackEventKind::Lost(_) => true,
        }
    }
}

/// Source of progress events for tracked sessions.
///
/// The orchestration logic depends only on this trait, so a push-based
/// source can replace polling without touching anything else.
pub trait Scheduler: Send {
    /// Begin producing events for `ticket`, replacing any run for the same phase.
    fn start(&mut self, ticket: TrackTicket, interval: Duration);

    /// Stop producing events for `phase`. Stopping an idle phase is a no-op.
    fn stop(&mut self, phase: Phase);

    fn stop_all(&mut self) {
        for phase in Phase::ALL {
            self.stop(phase);
        }
    }
}

struct PollTask {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Polls the engine's progress endpoint, one tokio task per phase.
///
/// The next poll is scheduled only after the previous fetch settled, plus
/// the interval. Each run numbers its fetches starting at 1.
pub struct PollingScheduler {
    api: Arc<dyn EngineApi>,
    events: mpsc::UnboundedSender<TrackerEvent>,
    tasks: [Option<PollTask>; 4],
}

impl PollingScheduler {
    /// Create a scheduler and the receiving end of its event channel.
    pub fn new(api: Arc<dyn EngineApi>) -> (Self, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                api,
                events,
                tasks: Default::default(),
            },
            rx,
        )
    }

    /// Whether a poll task for `phase` is still alive.
    pub fn is_polling(&self, phase: Phase) -> bool {
        self.tasks[phase.index()]
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }
}

impl Scheduler for PollingScheduler {
    fn start(&mut self, ticket: TrackTicket, interval: Duration) {
        self.stop(ticket.phase);

        let cancel = CancellationToken::new();
        let idx = ticket.phase.index();
        tracing::debug!(
            phase = %ticket.phase,
            session_id = %ticket.session_id,
            interval_ms = interval.as_millis() as u64,
            "Starting progress poll",
        );
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.api),
            ticket,
            interval,
            self.events.clone(),
            cancel.clone(),
        ));
        self.tasks[idx] = Some(PollTask { cancel, handle });
    }

    fn stop(&mut self, phase: Phase) {
        if let Some(task) = self.tasks[phase.index()].take() {
            tracing::debug!(%phase, "Stopping progress poll");
            task.cancel.cancel();
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn poll_loop(
    api: Arc<dyn EngineApi>,
    ticket: TrackTicket,
    interval: Duration,
    events: mpsc::UnboundedSender<TrackerEvent>,
    cancel: CancellationToken,
) {
    let mut poll_seq = 0u64;
    loop {
        poll_seq += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = api.progress(&ticket.session_id, ticket.phase) => result,
        };

        let event = match result {
            Ok(report) => TrackerEvent::snapshot(&ticket, report.normalize(ticket.phase, poll_seq)),
            Err(EngineError::SessionNotFound(session_id)) => {
                TrackerEvent::lost(&ticket, OrchestratorError::SessionNotFound { session_id })
            }
            Err(e) => {
                tracing::warn!(
                    phase = %ticket.phase,
                    session_id = %ticket.session_id,
                    poll_seq,
                    error = %e,
                    "Progress poll failed",
                );
                TrackerEvent::lost(&ticket, OrchestratorError::transport("progress poll", &e))
            }
        };

        let terminal = event.is_terminal();
        if cancel.is_cancelled() || events.send(event).is_err() || terminal {
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[derive(Default)]
struct ManualState {
    active: [Option<TrackTicket>; 4],
    started: Vec<TrackTicket>,
    stopped: Vec<Phase>,
    next_seq: [u64; 4],
}

/// Scheduler whose events are pushed from outside.
///
/// It records start and stop requests and hands out a [`ManualHandle`] for
/// injecting events, which is the shape a streaming progress source takes.
pub struct ManualScheduler {
    handle: ManualHandle,
}

/// Shared view of a [`ManualScheduler`], usable after the scheduler has been
/// moved into an orchestrator.
#[derive(Clone)]
pub struct ManualHandle {
    state: Arc<Mutex<ManualState>>,
    events: mpsc::UnboundedSender<TrackerEvent>,
}

impl ManualScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let handle = ManualHandle {
            state: Arc::new(Mutex::new(ManualState::default())),
            events,
        };
        (Self { handle }, rx)
    }

    pub fn handle(&self) -> ManualHandle {
        self.handle.clone()
    }
}

impl Scheduler for ManualScheduler {
    fn start(&mut self, ticket: TrackTicket, _interval: Duration) {
        let mut state = self.handle.lock();
        let idx = ticket.phase.index();
        state.next_seq[idx] = 0;
        state.started.push(ticket.clone());
        state.active[idx] = Some(ticket);
    }

    fn stop(&mut self, phase: Phase) {
        let mut state = self.handle.lock();
        if state.active[phase.index()].take().is_some() {
            state.stopped.push(phase);
        }
    }
}

impl ManualHandle {
    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The run currently active for `phase`.
    pub fn active(&self, phase: Phase) -> Option<TrackTicket> {
        self.lock().active[phase.index()].clone()
    }

    /// Every run started so far, oldest first.
    pub fn started(&self) -> Vec<TrackTicket> {
        self.lock().started.clone()
    }

    /// How many active runs of `phase` were stopped.
    pub fn stop_count(&self, phase: Phase) -> usize {
        self.lock().stopped.iter().filter(|p| **p == phase).count()
    }

    /// Deliver `report` to the active run of `phase` with an explicit
    /// sequence number. Returns false when `phase` has no active run.
    pub fn push_report(&self, phase: Phase, poll_seq: u64, report: ProgressReport) -> bool {
        let Some(ticket) = self.active(phase) else {
            return false;
        };
        {
            let mut state = self.lock();
            let next = &mut state.next_seq[phase.index()];
            *next = (*next).max(poll_seq);
        }
        self.push(TrackerEvent::snapshot(&ticket, report.normalize(phase, poll_seq)))
    }

    /// Deliver `report` with the next sequence number of the active run.
    pub fn push_next(&self, phase: Phase, report: ProgressReport) -> bool {
        let seq = self.lock().next_seq[phase.index()] + 1;
        self.push_report(phase, seq, report)
    }

    /// Report the active run of `phase` as lost.
    pub fn push_lost(&self, phase: Phase, error: OrchestratorError) -> bool {
        match self.active(phase) {
            Some(ticket) => self.push(TrackerEvent::lost(&ticket, error)),
            None => false,
        }
    }

    /// Deliver an arbitrary event, including ones for stale runs.
    pub fn push(&self, event: TrackerEvent) -> bool {
        self.events.send(event).is_ok()
    }
}
