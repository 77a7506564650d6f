use reconflow_common::{Phase, Session};
use std::sync::Arc;

use super::Orchestrator;
use crate::errors::{EngineError, OrchestratorError};
use crate::reconcile::ReconcileReport;
use crate::tracker::{ProgressObserver, TrackingResult};

/// What happened to the session persisted by a previous run.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// Nothing was persisted.
    NoSession,
    /// The job finished while the client was away.
    Finalized {
        phase: Phase,
        session_id: String,
        result: TrackingResult,
    },
    /// The engine no longer knows the session.
    Discarded { phase: Phase, session_id: String },
    /// The job is still running and tracking resumed.
    Resumed { phase: Phase, session_id: String },
    /// The engine could not be asked; the entry is kept for next time.
    Deferred {
        phase: Phase,
        session_id: String,
        error: OrchestratorError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartupReport {
    pub resume: ResumeOutcome,
    pub reconcile: ReconcileReport,
}

impl Orchestrator {
    /// Resume or discard the persisted session, then reconcile.
    ///
    /// Reconciliation runs whatever the resume step found. A resumed phase
    /// has a live session and is therefore left alone by it.
    pub async fn startup(
        &mut self,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<StartupReport, OrchestratorError> {
        let resume = self.resume(observer).await?;
        let reconcile = self.reconcile().await;
        Ok(StartupReport { resume, reconcile })
    }

    /// Check the persisted session with a single progress query.
    pub async fn resume(
        &mut self,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<ResumeOutcome, OrchestratorError> {
        let Some(persisted) = self.persistence.load()? else {
            return Ok(ResumeOutcome::NoSession);
        };
        let phase = persisted.phase;
        let session_id = persisted.session_id;

        match self.api.progress(&session_id, phase).await {
            Ok(report) => {
                let snapshot = report.normalize(phase, 1);
                if !snapshot.complete {
                    let mut session = Session::new(session_id.clone(), phase);
                    if let Some(started_at) = snapshot.started_at {
                        session.started_at = started_at;
                    }
                    self.state.mark_running(phase, session);
                    self.tracker
                        .start_tracking(phase, session_id.clone(), observer);
                    tracing::info!(%phase, session_id = %session_id, percent = snapshot.percent, "Resumed tracking");
                    return Ok(ResumeOutcome::Resumed { phase, session_id });
                }

                let result = match &snapshot.error {
                    Some(message) => {
                        self.state.mark_failed(phase, message.clone());
                        Err(OrchestratorError::JobFailure {
                            phase,
                            message: message.clone(),
                        })
                    }
                    None => {
                        self.state.mark_completed(phase);
                        Ok(snapshot.clone())
                    }
                };
                observer.on_snapshot(&snapshot);
                observer.on_complete(phase, &result);
                self.persistence.clear_if(&session_id)?;
                tracing::info!(%phase, session_id = %session_id, success = result.is_ok(), "Finalized session from previous run");
                Ok(ResumeOutcome::Finalized {
                    phase,
                    session_id,
                    result,
                })
            }
            Err(EngineError::SessionNotFound(_)) => {
                self.persistence.clear_if(&session_id)?;
                tracing::warn!(%phase, session_id = %session_id, "Persisted session unknown to engine, discarded");
                Ok(ResumeOutcome::Discarded { phase, session_id })
            }
            Err(e) => {
                let error = OrchestratorError::transport("resume session", &e);
                tracing::warn!(%phase, session_id = %session_id, error = %error, "Could not check persisted session, keeping it");
                Ok(ResumeOutcome::Deferred {
                    phase,
                    session_id,
                    error,
                })
            }
        }
    }
}
