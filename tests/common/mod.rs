//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use reconflow::engine::{
    EngineApi, ModelAnalysis, PhaseParams, ProgressReport, ResetReport, StartResponse,
};
use reconflow::errors::EngineError;
use reconflow::session::MemorySessionStore;
use reconflow::tracker::{ManualHandle, ManualScheduler, ProgressObserver, TrackingResult};
use reconflow::{Orchestrator, OrchestratorSettings};
use reconflow_common::{Artifact, Phase, ProbeResult, ProgressSnapshot, ReconstructionModel};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory engine with scripted answers.
///
/// Starts are accepted with generated session ids unless a response was
/// queued. Progress polls consume the queued replies and report the session
/// as unknown once the queue is empty.
#[derive(Default)]
pub struct FakeEngine {
    start_replies: Mutex<VecDeque<Result<StartResponse, EngineError>>>,
    progress_replies: Mutex<VecDeque<Result<ProgressReport, EngineError>>>,
    artifacts: Mutex<HashMap<Artifact, ProbeResult>>,
    failing_probes: Mutex<HashSet<Artifact>>,
    models: Mutex<Vec<ReconstructionModel>>,
    select_fails: AtomicBool,
    starts: Mutex<Vec<(Phase, PhaseParams)>>,
    selections: Mutex<Vec<String>>,
    probe_count: AtomicUsize,
    progress_count: AtomicUsize,
    reset_count: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Engine whose artifacts prove the first `count` phases ran.
    pub fn completed_through(count: usize) -> Arc<Self> {
        let engine = Self::new();
        for phase in &Phase::ALL[..count] {
            engine.set_artifact(phase.artifact(), ProbeResult::counted(10));
        }
        engine
    }

    pub fn set_artifact(&self, artifact: Artifact, probe: ProbeResult) {
        self.artifacts.lock().unwrap().insert(artifact, probe);
    }

    pub fn remove_artifact(&self, artifact: Artifact) {
        self.artifacts.lock().unwrap().remove(&artifact);
    }

    pub fn fail_probe(&self, artifact: Artifact) {
        self.failing_probes.lock().unwrap().insert(artifact);
    }

    pub fn set_models(&self, models: Vec<ReconstructionModel>) {
        *self.models.lock().unwrap() = models;
    }

    pub fn set_select_fails(&self, fails: bool) {
        self.select_fails.store(fails, Ordering::SeqCst);
    }

    pub fn queue_start(&self, reply: Result<StartResponse, EngineError>) {
        self.start_replies.lock().unwrap().push_back(reply);
    }

    pub fn queue_progress(&self, reply: Result<ProgressReport, EngineError>) {
        self.progress_replies.lock().unwrap().push_back(reply);
    }

    pub fn starts(&self) -> Vec<(Phase, PhaseParams)> {
        self.starts.lock().unwrap().clone()
    }

    pub fn selections(&self) -> Vec<String> {
        self.selections.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }

    pub fn progress_count(&self) -> usize {
        self.progress_count.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> usize {
        self.reset_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineApi for FakeEngine {
    async fn start_phase(
        &self,
        phase: Phase,
        params: &PhaseParams,
    ) -> Result<StartResponse, EngineError> {
        let n = {
            let mut starts = self.starts.lock().unwrap();
            starts.push((phase, params.clone()));
            starts.len()
        };
        match self.start_replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Ok(StartResponse::accepted(format!("{}-{}", phase.as_str(), n))),
        }
    }

    async fn progress(&self, session_id: &str, _phase: Phase) -> Result<ProgressReport, EngineError> {
        self.progress_count.fetch_add(1, Ordering::SeqCst);
        self.progress_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::SessionNotFound(session_id.to_string())))
    }

    async fn probe(&self, artifact: Artifact) -> Result<ProbeResult, EngineError> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        if self.failing_probes.lock().unwrap().contains(&artifact) {
            return Err(EngineError::Api {
                status: 500,
                body: "storage unavailable".to_string(),
            });
        }
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .get(&artifact)
            .copied()
            .unwrap_or_else(ProbeResult::absent))
    }

    async fn analyze_models(&self) -> Result<ModelAnalysis, EngineError> {
        Ok(ModelAnalysis {
            models: self.models.lock().unwrap().clone(),
            best_model_id: None,
        })
    }

    async fn select_model(&self, model_id: &str) -> Result<(), EngineError> {
        if self.select_fails.load(Ordering::SeqCst) {
            return Err(EngineError::Api {
                status: 503,
                body: "busy".to_string(),
            });
        }
        self.selections.lock().unwrap().push(model_id.to_string());
        Ok(())
    }

    async fn reset_project(&self) -> Result<ResetReport, EngineError> {
        self.reset_count.fetch_add(1, Ordering::SeqCst);
        let mut artifacts = self.artifacts.lock().unwrap();
        let mut deleted: Vec<String> = artifacts.keys().map(|a| a.as_str().to_string()).collect();
        deleted.sort();
        artifacts.clear();
        self.models.lock().unwrap().clear();
        Ok(ResetReport {
            status: "success".to_string(),
            deleted_artifacts: deleted,
        })
    }
}

/// What a [`RecordingObserver`] saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Snapshot { phase: Phase, poll_seq: u64, percent: f64 },
    Complete { phase: Phase, success: bool },
}

#[derive(Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Seen>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn poll_seqs(&self) -> Vec<u64> {
        self.seen()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Snapshot { poll_seq, .. } => Some(poll_seq),
                Seen::Complete { .. } => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<(Phase, bool)> {
        self.seen()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Complete { phase, success } => Some((phase, success)),
                Seen::Snapshot { .. } => None,
            })
            .collect()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_snapshot(&self, snapshot: &ProgressSnapshot) {
        self.seen.lock().unwrap().push(Seen::Snapshot {
            phase: snapshot.phase,
            poll_seq: snapshot.poll_seq,
            percent: snapshot.percent,
        });
    }

    fn on_complete(&self, phase: Phase, outcome: &TrackingResult) {
        self.seen.lock().unwrap().push(Seen::Complete {
            phase,
            success: outcome.is_ok(),
        });
    }
}

/// An orchestrator wired to a [`FakeEngine`], a manual scheduler and an
/// in-memory session store.
pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub store: MemorySessionStore,
    pub handle: ManualHandle,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(engine: Arc<FakeEngine>) -> Self {
        Self::with_store(engine, MemorySessionStore::new())
    }

    /// Build a harness over an existing store, as a restarted process would.
    pub fn with_store(engine: Arc<FakeEngine>, store: MemorySessionStore) -> Self {
        let (scheduler, events) = ManualScheduler::new();
        let handle = scheduler.handle();
        let orchestrator = Orchestrator::with_scheduler(
            engine.clone(),
            Box::new(store.clone()),
            OrchestratorSettings::default(),
            Box::new(scheduler),
            events,
        );
        Self {
            engine,
            store,
            handle,
            orchestrator,
        }
    }
}

pub fn model(id: &str, registered: u64, total: u64, error: f64) -> ReconstructionModel {
    ReconstructionModel {
        model_id: id.to_string(),
        registered_images: registered,
        total_images: total,
        point_count: registered * 100,
        mean_reprojection_error: error,
        mean_track_length: 4.0,
        observation_count: registered * 400,
    }
}

pub fn complete_report() -> ProgressReport {
    ProgressReport {
        percent: Some(100.0),
        complete: true,
        ..ProgressReport::default()
    }
}
