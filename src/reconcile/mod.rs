//! Reconciliation of local phase statuses against the engine's artifacts.
//!
//! Artifacts are the ground truth for what finished. Reconciliation probes
//! them, read-only, and corrects local statuses that drifted:
//!
//! 1. The final artifact (dense output) is probed first. If it exists, every
//!    phase is complete and nothing else is probed.
//! 2. Otherwise artifacts are probed in dependency order until the first
//!    missing one. Later phases are implied absent and not probed.
//!
//! A failed probe is not evidence of absence: the phase and everything after
//! it stay as they are. Phases with a live session are never touched.

use reconflow_common::{Artifact, Phase, PhaseStatus, ProbeResult};
use std::fmt;

use crate::engine::EngineApi;
use crate::errors::OrchestratorError;
use crate::workflow::WorkflowState;

/// What reconciliation learned about one phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// The phase's artifact was probed and exists.
    Present(ProbeResult),
    /// A later artifact exists, so this one must have been produced.
    ImpliedPresent,
    /// The artifact was probed and is missing or empty.
    Absent,
    /// An earlier artifact is missing, so this one cannot be valid.
    ImpliedAbsent,
    /// The probe failed, here or for an earlier phase.
    Unknown(OrchestratorError),
}

impl Observation {
    pub fn is_present(&self) -> bool {
        matches!(self, Observation::Present(_) | Observation::ImpliedPresent)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Observation::Absent | Observation::ImpliedAbsent)
    }

    fn from_probe(artifact: Artifact, result: Result<ProbeResult, crate::errors::EngineError>) -> Self {
        match result {
            Ok(probe) if probe.exists() => Observation::Present(probe),
            Ok(_) => Observation::Absent,
            Err(e) => Observation::Unknown(OrchestratorError::ReconciliationAmbiguous {
                artifact,
                message: e.to_string(),
            }),
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Present(probe) => match probe.count {
                Some(count) => write!(f, "present ({})", count),
                None => write!(f, "present"),
            },
            Observation::ImpliedPresent => write!(f, "present (implied)"),
            Observation::Absent => write!(f, "absent"),
            Observation::ImpliedAbsent => write!(f, "absent (implied)"),
            Observation::Unknown(err) => write!(f, "unknown: {}", err),
        }
    }
}

/// A status change made by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseChange {
    pub phase: Phase,
    pub from: PhaseStatus,
    pub to: PhaseStatus,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// One observation per phase, in dependency order.
    pub observations: Vec<(Phase, Observation)>,
    pub changes: Vec<PhaseChange>,
    /// Phases left alone because a session is live.
    pub skipped_live: Vec<Phase>,
    /// Number of probe requests issued.
    pub probes: usize,
}

impl ReconcileReport {
    pub fn observation(&self, phase: Phase) -> Option<&Observation> {
        self.observations
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, obs)| obs)
    }

    /// Probe failures encountered during the pass.
    pub fn ambiguous(&self) -> impl Iterator<Item = &OrchestratorError> {
        self.observations.iter().filter_map(|(_, obs)| match obs {
            Observation::Unknown(err @ OrchestratorError::ReconciliationAmbiguous { .. }) => Some(err),
            _ => None,
        })
    }

    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Probes artifacts and applies what it finds to a [`WorkflowState`].
pub struct StateReconciler<'a> {
    api: &'a dyn EngineApi,
}

impl<'a> StateReconciler<'a> {
    pub fn new(api: &'a dyn EngineApi) -> Self {
        Self { api }
    }

    /// Probe artifacts without touching any state.
    ///
    /// Returns the per-phase observations and the number of probes issued.
    pub async fn observe(&self) -> (Vec<(Phase, Observation)>, usize) {
        let final_artifact = Artifact::DenseOutput;
        let final_probe = Observation::from_probe(final_artifact, self.api.probe(final_artifact).await);
        let mut probes = 1;

        if final_probe.is_present() {
            let mut observations: Vec<_> = Phase::ALL[..3]
                .iter()
                .map(|p| (*p, Observation::ImpliedPresent))
                .collect();
            observations.push((Phase::DenseReconstruction, final_probe));
            return (observations, probes);
        }

        let mut observations = Vec::with_capacity(Phase::ALL.len());
        // Set once an earlier phase turned out absent or unknown.
        let mut cut: Option<Observation> = None;
        for phase in &Phase::ALL[..3] {
            let observation = match &cut {
                Some(Observation::Unknown(err)) => Observation::Unknown(err.clone()),
                Some(_) => Observation::ImpliedAbsent,
                None => {
                    probes += 1;
                    let artifact = phase.artifact();
                    Observation::from_probe(artifact, self.api.probe(artifact).await)
                }
            };
            if cut.is_none() && !observation.is_present() {
                cut = Some(observation.clone());
            }
            observations.push((*phase, observation));
        }

        let dense = match cut {
            Some(Observation::Unknown(err)) => Observation::Unknown(err),
            Some(_) => Observation::ImpliedAbsent,
            None => final_probe,
        };
        observations.push((Phase::DenseReconstruction, dense));
        (observations, probes)
    }

    /// Observe and apply. Running it twice against unchanged artifacts leaves
    /// the state unchanged the second time.
    pub async fn reconcile(&self, state: &mut WorkflowState) -> ReconcileReport {
        let (observations, probes) = self.observe().await;
        let mut report = apply(state, observations);
        report.probes = probes;

        for err in report.ambiguous() {
            tracing::warn!(error = %err, "Reconciliation left a phase unresolved");
        }
        for change in &report.changes {
            tracing::info!(
                phase = %change.phase,
                from = %change.from,
                to = %change.to,
                "Reconciled phase status",
            );
        }
        report
    }
}

/// Apply observations to `state`.
///
/// Present phases become Completed only while every earlier phase is
/// Completed; absent phases lose a Completed status but keep Failed and
/// NotStarted; unknown phases are left alone.
pub fn apply(state: &mut WorkflowState, observations: Vec<(Phase, Observation)>) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let mut chain_complete = true;

    for (phase, observation) in &observations {
        let phase = *phase;
        if state.has_live_session(phase) {
            report.skipped_live.push(phase);
            chain_complete = false;
            continue;
        }

        let current = state.status(phase).clone();
        let target = match observation {
            obs if obs.is_present() && chain_complete => Some(PhaseStatus::Completed),
            obs if obs.is_absent() && current.is_completed() => Some(PhaseStatus::NotStarted),
            _ => None,
        };
        if let Some(to) = target
            && state.apply_observed(phase, to.clone())
        {
            report.changes.push(PhaseChange {
                phase,
                from: current,
                to,
            });
        }
        chain_complete = chain_complete && state.status(phase).is_completed();
    }

    report.observations = observations;
    report
}
