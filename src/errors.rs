//! Typed error hierarchy for the reconflow orchestrator.
//!
//! Two top-level enums cover the two layers:
//! - `OrchestratorError`: validation and tracking failures surfaced to callers
//! - `EngineError`: transport-level failures talking to the reconstruction engine

use reconflow_common::{Artifact, Phase};
use thiserror::Error;

/// Errors surfaced by the orchestrator.
///
/// Variants carry owned strings rather than sources so that a single error
/// can be handed to a progress observer and also returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("Cannot start {phase}: preceding phase {missing} is not completed")]
    PrecededPhaseIncomplete { phase: Phase, missing: Phase },

    #[error("Phase {phase} is already running")]
    AlreadyRunning { phase: Phase },

    #[error("Cannot start {phase}: later phase {running} is still running")]
    DownstreamRunning { phase: Phase, running: Phase },

    #[error("Multiple reconstruction models exist; select one before dense reconstruction")]
    ModelSelectionRequired,

    #[error("Unknown reconstruction model '{model_id}'")]
    UnknownModel { model_id: String },

    #[error("Transport error during {operation}: {message}")]
    TransportError { operation: String, message: String },

    #[error("Session {session_id} is unknown to the engine")]
    SessionNotFound { session_id: String },

    #[error("Phase {phase} failed: {message}")]
    JobFailure { phase: Phase, message: String },

    #[error("Engine rejected start of {phase}: {message}")]
    StartRejected { phase: Phase, message: String },

    #[error("Probe of {artifact} failed: {message}")]
    ReconciliationAmbiguous { artifact: Artifact, message: String },

    #[error("Session store error: {0}")]
    Persistence(String),
}

impl OrchestratorError {
    /// Wrap an engine failure that happened during `operation`.
    pub fn transport(operation: impl Into<String>, err: &EngineError) -> Self {
        OrchestratorError::TransportError {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Local validation failures never reach the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrchestratorError::PrecededPhaseIncomplete { .. }
                | OrchestratorError::AlreadyRunning { .. }
                | OrchestratorError::DownstreamRunning { .. }
                | OrchestratorError::ModelSelectionRequired
                | OrchestratorError::UnknownModel { .. }
        )
    }

    /// Failures whose truth is unknown and left to the next reconciliation.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            OrchestratorError::TransportError { .. }
                | OrchestratorError::SessionNotFound { .. }
                | OrchestratorError::ReconciliationAmbiguous { .. }
        )
    }
}

/// Error delivered to a progress observer when tracking ends without success.
pub type TrackingError = OrchestratorError;

/// Errors from the reconstruction engine client.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The HTTP request itself failed (connect, DNS, TLS, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The per-operation deadline elapsed.
    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The engine does not know the session (expired or garbage collected).
    #[error("Session {0} not found")]
    SessionNotFound(String),

    /// The engine answered with a non-2xx status.
    #[error("Engine API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("Failed to decode engine response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EngineError::Decode(err.to_string())
        } else {
            EngineError::Request(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preceded_phase_incomplete_names_both_phases() {
        let err = OrchestratorError::PrecededPhaseIncomplete {
            phase: Phase::FeatureExtraction,
            missing: Phase::FrameExtraction,
        };
        let msg = err.to_string();
        assert!(msg.contains("feature_extraction"));
        assert!(msg.contains("frame_extraction"));
        assert!(err.is_validation());
        assert!(!err.is_ambiguous());
    }

    #[test]
    fn downstream_running_is_validation() {
        let err = OrchestratorError::DownstreamRunning {
            phase: Phase::FrameExtraction,
            running: Phase::FeatureExtraction,
        };
        assert!(err.to_string().contains("feature_extraction"));
        assert!(err.is_validation());
    }

    #[test]
    fn transport_error_wraps_engine_error() {
        let engine = EngineError::Timeout { seconds: 10 };
        let err = OrchestratorError::transport("progress poll", &engine);
        match &err {
            OrchestratorError::TransportError { operation, message } => {
                assert_eq!(operation, "progress poll");
                assert!(message.contains("10s"));
            }
            _ => panic!("Expected TransportError"),
        }
        assert!(err.is_ambiguous());
    }

    #[test]
    fn job_failure_is_neither_validation_nor_ambiguous() {
        let err = OrchestratorError::JobFailure {
            phase: Phase::DenseReconstruction,
            message: "CUDA out of memory".into(),
        };
        assert!(!err.is_validation());
        assert!(!err.is_ambiguous());
        assert!(err.to_string().contains("CUDA out of memory"));
    }

    #[test]
    fn engine_api_error_carries_status() {
        let err = EngineError::Api {
            status: 503,
            body: "busy".into(),
        };
        match &err {
            EngineError::Api { status, .. } => assert_eq!(*status, 503),
            _ => panic!("Expected Api"),
        }
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&OrchestratorError::ModelSelectionRequired);
        assert_std_error(&EngineError::SessionNotFound("s1".into()));
    }
}
