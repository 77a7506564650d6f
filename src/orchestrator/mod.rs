//! The orchestrator: one owner for workflow state, tracking, persistence,
//! reconciliation and model selection.
//!
//! Control flow:
//! - `start_phase` validates against the state machine, asks the engine to
//!   start the job, then tracks and persists the new session.
//! - Scheduler events arrive on a channel; `process_event` applies them and
//!   is the only place tracking changes phase statuses.
//! - `startup` resumes or discards a persisted session, then reconciles.
//!
//! All methods take `&mut self` and are meant to run on one task.

mod startup;

pub use startup::{ResumeOutcome, StartupReport};

use reconflow_common::{Phase, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::engine::{EngineApi, PhaseParams, ResetReport, StartStatus};
use crate::errors::OrchestratorError;
use crate::ranking::{ModelRanker, RankedModel, RankingThresholds, SelectionChange};
use crate::reconcile::{ReconcileReport, StateReconciler};
use crate::session::{SessionPersistence, SessionStore};
use crate::tracker::{
    PollingScheduler, ProgressObserver, ProgressTracker, Scheduler, TrackOutcome, TrackerEvent,
};
use crate::workflow::WorkflowState;

/// Parameter carrying the selected model into dense reconstruction.
pub const MODEL_ID_PARAM: &str = "model_id";

/// Tunables that do not belong to the engine client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    pub ranking: RankingThresholds,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            ranking: RankingThresholds::default(),
        }
    }
}

pub struct Orchestrator {
    api: Arc<dyn EngineApi>,
    state: WorkflowState,
    tracker: ProgressTracker,
    events: mpsc::UnboundedReceiver<TrackerEvent>,
    persistence: SessionPersistence,
    ranker: ModelRanker,
}

impl Orchestrator {
    /// Create an orchestrator that polls the engine for progress.
    pub fn new(
        api: Arc<dyn EngineApi>,
        store: Box<dyn SessionStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (scheduler, events) = PollingScheduler::new(Arc::clone(&api));
        Self::with_scheduler(api, store, settings, Box::new(scheduler), events)
    }

    /// Create an orchestrator fed by an arbitrary scheduler. `events` must be
    /// the receiving end of that scheduler's channel.
    pub fn with_scheduler(
        api: Arc<dyn EngineApi>,
        store: Box<dyn SessionStore>,
        settings: OrchestratorSettings,
        scheduler: Box<dyn Scheduler>,
        events: mpsc::UnboundedReceiver<TrackerEvent>,
    ) -> Self {
        Self {
            api,
            state: WorkflowState::new(),
            tracker: ProgressTracker::new(scheduler, settings.poll_interval),
            events,
            persistence: SessionPersistence::new(store),
            ranker: ModelRanker::new(settings.ranking),
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn ranker(&self) -> &ModelRanker {
        &self.ranker
    }

    pub fn is_tracking(&self, phase: Phase) -> bool {
        self.tracker.is_tracking(phase)
    }

    /// Whether any phase is being tracked.
    pub fn has_active_tracking(&self) -> bool {
        Phase::ALL.iter().any(|p| self.tracker.is_tracking(*p))
    }

    /// Start `phase` on the engine and begin tracking it.
    ///
    /// Dependency and model checks run before any start request is sent.
    /// For dense reconstruction the selected model is passed as `model_id`;
    /// an explicit `model_id` parameter is treated as a selection.
    pub async fn start_phase(
        &mut self,
        phase: Phase,
        mut params: PhaseParams,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<Session, OrchestratorError> {
        self.state.can_start(phase)?;

        if phase == Phase::DenseReconstruction {
            if self.ranker.model_count() == 0 {
                self.analyze_models().await?;
            }
            if let Some(requested) = params.get(MODEL_ID_PARAM).and_then(|v| v.as_str()) {
                let requested = requested.to_string();
                self.select_model(&requested).await?;
            }
            if let Some(model_id) = self.ranker.dense_input()? {
                params.insert(MODEL_ID_PARAM, model_id);
            }
        }

        let response = self
            .api
            .start_phase(phase, &params)
            .await
            .map_err(|e| OrchestratorError::transport(format!("start {}", phase), &e))?;

        let session_id = match (response.status, response.session_id) {
            (StartStatus::Success, Some(id)) if !id.trim().is_empty() => id,
            (StartStatus::Success, _) => {
                return Err(OrchestratorError::StartRejected {
                    phase,
                    message: "engine returned no session id".to_string(),
                });
            }
            (StartStatus::Error, _) => {
                return Err(OrchestratorError::StartRejected {
                    phase,
                    message: response
                        .error
                        .unwrap_or_else(|| "unspecified error".to_string()),
                });
            }
        };

        let session = Session::new(session_id.clone(), phase);
        self.state.mark_running(phase, session.clone());
        if phase == Phase::SparseReconstruction {
            // New sparse output replaces every known model.
            self.ranker.clear();
        }
        self.tracker.start_tracking(phase, session_id.clone(), observer);
        if let Err(e) = self.persistence.record(&session_id, phase) {
            tracing::warn!(%phase, session_id = %session_id, error = %e, "Failed to persist session");
        }

        tracing::info!(%phase, session_id = %session_id, "Phase started");
        Ok(session)
    }

    /// Stop tracking `phase` locally and restore its previous status.
    ///
    /// The remote job is not touched. Cancelling an idle phase is a no-op.
    pub fn cancel(&mut self, phase: Phase) -> Result<Option<Session>, OrchestratorError> {
        self.tracker.stop_tracking(phase);
        let released = self.state.release(phase);
        if let Some(session) = &released {
            self.persistence.clear_if(&session.session_id)?;
            tracing::info!(%phase, session_id = %session.session_id, "Tracking cancelled");
        }
        Ok(released)
    }

    /// Wait for the next scheduler event. Returns `None` once nothing is
    /// being tracked.
    pub async fn next_event(&mut self) -> Option<TrackerEvent> {
        if !self.has_active_tracking() {
            return None;
        }
        self.events.recv().await
    }

    /// Apply one scheduler event. Returns the outcome when it ended a track.
    pub fn process_event(&mut self, event: TrackerEvent) -> Option<TrackOutcome> {
        let outcome = self.tracker.handle(event)?;
        let phase = outcome.phase;

        let owns_phase = self
            .state
            .session(phase)
            .is_some_and(|s| s.session_id == outcome.session_id);
        if owns_phase {
            match &outcome.result {
                Ok(_) => {
                    self.state.mark_completed(phase);
                    if phase == Phase::SparseReconstruction {
                        self.ranker.clear();
                    }
                    tracing::info!(%phase, session_id = %outcome.session_id, "Phase completed");
                }
                Err(OrchestratorError::JobFailure { message, .. }) => {
                    self.state.mark_failed(phase, message.clone());
                    tracing::error!(%phase, session_id = %outcome.session_id, error = %message, "Phase failed");
                }
                Err(err) => {
                    self.state.release(phase);
                    tracing::warn!(
                        %phase,
                        session_id = %outcome.session_id,
                        error = %err,
                        "Lost track of session, leaving status to reconciliation",
                    );
                }
            }
        }

        if let Err(e) = self.persistence.clear_if(&outcome.session_id) {
            tracing::warn!(%phase, error = %e, "Failed to clear persisted session");
        }
        Some(outcome)
    }

    /// Apply every event already queued, without waiting.
    pub fn drain_pending(&mut self) -> Vec<TrackOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            outcomes.extend(self.process_event(event));
        }
        outcomes
    }

    /// Process events until nothing is tracked any more.
    pub async fn run_until_idle(&mut self) -> Vec<TrackOutcome> {
        let mut outcomes = Vec::new();
        while let Some(event) = self.next_event().await {
            outcomes.extend(self.process_event(event));
        }
        outcomes
    }

    /// Correct local statuses against the engine's artifacts.
    pub async fn reconcile(&mut self) -> ReconcileReport {
        StateReconciler::new(self.api.as_ref())
            .reconcile(&mut self.state)
            .await
    }

    /// Fetch and rank the models of the current sparse output.
    ///
    /// When nothing valid is selected, the best model is selected, remotely
    /// as well. A failed remote selection is logged and leaves the choice
    /// open.
    pub async fn analyze_models(&mut self) -> Result<Vec<RankedModel>, OrchestratorError> {
        let analysis = self
            .api
            .analyze_models()
            .await
            .map_err(|e| OrchestratorError::transport("analyze models", &e))?;

        let best = self.ranker.load(analysis.models);
        if let (Some(ours), Some(theirs)) = (&best, &analysis.best_model_id)
            && ours != theirs
        {
            tracing::debug!(ours = %ours, engine = %theirs, "Engine suggests a different best model");
        }

        if self.ranker.selected().is_none()
            && let Some(best) = best
        {
            if let Err(e) = self.select_model(&best).await {
                tracing::warn!(model_id = %best, error = %e, "Automatic model selection failed");
            }
        }
        Ok(self.ranker.ranked().to_vec())
    }

    /// Select the input model for dense reconstruction.
    ///
    /// Re-selecting the current model makes no engine call.
    pub async fn select_model(&mut self, model_id: &str) -> Result<(), OrchestratorError> {
        if self.ranker.model_count() == 0 {
            let analysis = self
                .api
                .analyze_models()
                .await
                .map_err(|e| OrchestratorError::transport("analyze models", &e))?;
            self.ranker.load(analysis.models);
        }

        let previous = self.ranker.selected().map(str::to_string);
        if self.ranker.select(model_id)? == SelectionChange::Unchanged {
            return Ok(());
        }

        if let Err(e) = self.api.select_model(model_id).await {
            // Keep local and remote selection in agreement.
            self.ranker.restore_selection(previous);
            return Err(OrchestratorError::transport("select model", &e));
        }
        tracing::info!(model_id, "Model selected");
        Ok(())
    }

    /// Delete every artifact on the engine and clear all local state.
    ///
    /// Local state is only cleared once the engine confirmed the reset.
    pub async fn reset_project(&mut self) -> Result<ResetReport, OrchestratorError> {
        let report = self
            .api
            .reset_project()
            .await
            .map_err(|e| OrchestratorError::transport("reset project", &e))?;

        self.tracker.stop_all();
        self.persistence.clear()?;
        self.state.reset();
        self.ranker.clear();
        tracing::info!(deleted = report.deleted_artifacts.len(), "Project reset");
        Ok(report)
    }
}
