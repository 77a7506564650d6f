use reconflow_common::{Phase, PhaseStatus, Session};
use serde::Serialize;
use std::fmt;

use crate::errors::OrchestratorError;

/// A session currently bound to a running phase, plus the status the phase
/// had before the run started (restored if the run ends ambiguously).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveSession {
    pub session: Session,
    pub prior: PhaseStatus,
    /// Completed successors demoted when the run started.
    pub demoted: Vec<Phase>,
}

/// Per-phase completion state owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WorkflowState {
    statuses: [PhaseStatus; 4],
    sessions: [Option<LiveSession>; 4],
}

impl WorkflowState {
    /// Create an empty state: every phase NotStarted, no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of a phase.
    pub fn status(&self, phase: Phase) -> &PhaseStatus {
        &self.statuses[phase.index()]
    }

    /// All phases with their status, in dependency order.
    pub fn statuses(&self) -> impl Iterator<Item = (Phase, &PhaseStatus)> {
        Phase::ALL.into_iter().zip(self.statuses.iter())
    }

    /// The live session of a phase, if it is running.
    pub fn session(&self, phase: Phase) -> Option<&Session> {
        self.sessions[phase.index()].as_ref().map(|live| &live.session)
    }

    /// All live sessions, in dependency order.
    pub fn live_sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter().flatten().map(|live| &live.session)
    }

    /// Whether the phase has a live session. Reconciliation never touches
    /// such phases.
    pub fn has_live_session(&self, phase: Phase) -> bool {
        self.sessions[phase.index()].is_some()
    }

    /// Number of completed phases.
    pub fn completed_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.is_completed()).count()
    }

    /// Check whether `phase` may start.
    ///
    /// Accepted iff every earlier phase is Completed, `phase` itself is not
    /// Running and no later phase has a live session.
    pub fn can_start(&self, phase: Phase) -> Result<(), OrchestratorError> {
        if let Some(missing) = phase
            .predecessors()
            .iter()
            .copied()
            .find(|p| !self.status(*p).is_completed())
        {
            return Err(OrchestratorError::PrecededPhaseIncomplete { phase, missing });
        }
        if self.status(phase).is_running() {
            return Err(OrchestratorError::AlreadyRunning { phase });
        }
        if let Some(running) = phase
            .successors()
            .iter()
            .copied()
            .find(|p| self.has_live_session(*p))
        {
            return Err(OrchestratorError::DownstreamRunning { phase, running });
        }
        Ok(())
    }

    /// Bind a session to a phase and mark it Running.
    pub fn mark_running(&mut self, phase: Phase, session: Session) {
        let idx = phase.index();
        let (prior, mut demoted) = match self.sessions[idx].take() {
            // Replacing a live session keeps the state from before the first run.
            Some(live) => (live.prior, live.demoted),
            None => (self.statuses[idx].clone(), Vec::new()),
        };
        self.statuses[idx] = PhaseStatus::Running;
        demoted.extend(self.demote_successors(phase));
        self.sessions[idx] = Some(LiveSession {
            session,
            prior,
            demoted,
        });
    }

    /// Mark a phase Completed and drop its session.
    pub fn mark_completed(&mut self, phase: Phase) {
        let idx = phase.index();
        self.sessions[idx] = None;
        self.statuses[idx] = PhaseStatus::Completed;
        self.promote_predecessors(phase);
    }

    /// Mark a phase Failed and drop its session.
    pub fn mark_failed(&mut self, phase: Phase, error: impl Into<String>) {
        let idx = phase.index();
        self.sessions[idx] = None;
        self.statuses[idx] = PhaseStatus::Failed {
            error: error.into(),
        };
        self.demote_successors(phase);
    }

    /// Drop the live session of a phase whose tracking ended without a
    /// verdict, restoring the status it had before the run. If that status
    /// is Completed, successors demoted by the run are completed again.
    ///
    /// Returns the released session, or `None` if the phase had none.
    pub fn release(&mut self, phase: Phase) -> Option<Session> {
        let idx = phase.index();
        let live = self.sessions[idx].take()?;
        let restored = match live.prior {
            PhaseStatus::Completed if !self.predecessors_completed(phase) => {
                PhaseStatus::NotStarted
            }
            PhaseStatus::Running => PhaseStatus::NotStarted,
            other => other,
        };
        let completed = restored.is_completed();
        self.statuses[idx] = restored;
        if completed {
            for next in live.demoted {
                let n = next.index();
                if self.statuses[n] == PhaseStatus::NotStarted && self.sessions[n].is_none() {
                    tracing::debug!(phase = %next, upstream = %phase, "Restoring demoted phase");
                    self.statuses[n] = PhaseStatus::Completed;
                }
            }
        }
        Some(live.session)
    }

    /// Clear all four statuses and purge every live session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Set a status observed from external ground truth. Phases with a live
    /// session are left alone.
    pub(crate) fn apply_observed(&mut self, phase: Phase, status: PhaseStatus) -> bool {
        if self.has_live_session(phase) {
            return false;
        }
        let idx = phase.index();
        if self.statuses[idx] == status {
            return false;
        }
        self.statuses[idx] = status;
        true
    }

    fn predecessors_completed(&self, phase: Phase) -> bool {
        phase
            .predecessors()
            .iter()
            .all(|p| self.status(*p).is_completed())
    }

    fn demote_successors(&mut self, phase: Phase) -> Vec<Phase> {
        let mut demoted = Vec::new();
        for next in phase.successors() {
            let idx = next.index();
            if self.statuses[idx].is_completed() {
                tracing::debug!(phase = %next, upstream = %phase, "Demoting completed phase");
                self.statuses[idx] = PhaseStatus::NotStarted;
                demoted.push(*next);
            }
        }
        demoted
    }

    fn promote_predecessors(&mut self, phase: Phase) {
        for prev in phase.predecessors() {
            let idx = prev.index();
            if !self.statuses[idx].is_completed() && self.sessions[idx].is_none() {
                tracing::debug!(phase = %prev, downstream = %phase, "Promoting phase to completed");
                self.statuses[idx] = PhaseStatus::Completed;
            }
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (phase, status) in self.statuses() {
            write!(f, "{:<24} {}", phase.label(), status)?;
            if let Some(session) = self.session(phase) {
                write!(f, " (session {})", session.session_id)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
