//! Client seam for the external reconstruction engine.
//!
//! The orchestrator only ever talks to the engine through [`EngineApi`], so
//! tests can substitute a scripted engine and alternative transports can be
//! dropped in without touching orchestration logic. [`HttpEngine`] is the
//! real implementation over the engine's HTTP+JSON API.

mod http;
mod types;

use async_trait::async_trait;
use reconflow_common::{Artifact, Phase, ProbeResult};
use std::time::Duration;

use crate::errors::EngineError;

pub use http::HttpEngine;
pub use types::{ModelAnalysis, PhaseParams, ProgressReport, ResetReport, StartResponse, StartStatus};

/// Operations the orchestrator needs from the reconstruction engine.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Ask the engine to start a phase job.
    async fn start_phase(
        &self,
        phase: Phase,
        params: &PhaseParams,
    ) -> Result<StartResponse, EngineError>;

    /// Query progress of a session. `phase` selects the timeout bound.
    async fn progress(&self, session_id: &str, phase: Phase) -> Result<ProgressReport, EngineError>;

    /// Read-only existence/count check of a phase artifact.
    async fn probe(&self, artifact: Artifact) -> Result<ProbeResult, EngineError>;

    /// Statistics of every reconstruction produced by sparse reconstruction.
    async fn analyze_models(&self) -> Result<ModelAnalysis, EngineError>;

    /// Make `model_id` the input of dense reconstruction.
    async fn select_model(&self, model_id: &str) -> Result<(), EngineError>;

    /// Delete every phase artifact of the project.
    async fn reset_project(&self) -> Result<ResetReport, EngineError>;
}

/// Per-operation request deadlines.
///
/// Quick status and probe calls get a short bound; start and poll calls for
/// long phases must survive jobs that run for hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub probe: Duration,
    pub start: Duration,
    pub long_running: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(10),
            start: Duration::from_secs(60),
            long_running: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl TimeoutPolicy {
    /// Deadline for probes, model analysis, selection and reset.
    pub fn for_probe(&self) -> Duration {
        self.probe
    }

    /// Deadline for starting or polling `phase`.
    pub fn for_phase(&self, phase: Phase) -> Duration {
        if phase.is_long_running() {
            self.long_running
        } else {
            self.start
        }
    }
}
