//! Pipeline phases, their status, and the sessions bound to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::artifact::Artifact;

/// One ordered stage of the reconstruction pipeline.
///
/// The derived `Ord` follows declaration order, which is the dependency
/// order: a phase may only start once every phase before it has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    FrameExtraction,
    FeatureExtraction,
    SparseReconstruction,
    DenseReconstruction,
}

impl Phase {
    /// All phases in dependency order.
    pub const ALL: [Phase; 4] = [
        Phase::FrameExtraction,
        Phase::FeatureExtraction,
        Phase::SparseReconstruction,
        Phase::DenseReconstruction,
    ];

    /// Position of this phase in the pipeline (0-based).
    pub fn index(self) -> usize {
        match self {
            Phase::FrameExtraction => 0,
            Phase::FeatureExtraction => 1,
            Phase::SparseReconstruction => 2,
            Phase::DenseReconstruction => 3,
        }
    }

    /// Phases that must be completed before this one may start.
    pub fn predecessors(self) -> &'static [Phase] {
        &Self::ALL[..self.index()]
    }

    /// Phases that depend on this one, nearest first.
    pub fn successors(self) -> &'static [Phase] {
        &Self::ALL[self.index() + 1..]
    }

    /// Wire name, as used in URLs and the persisted session store.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::FrameExtraction => "frame_extraction",
            Phase::FeatureExtraction => "feature_extraction",
            Phase::SparseReconstruction => "sparse_reconstruction",
            Phase::DenseReconstruction => "dense_reconstruction",
        }
    }

    /// Human-readable name.
    pub fn label(self) -> &'static str {
        match self {
            Phase::FrameExtraction => "Frame extraction",
            Phase::FeatureExtraction => "Feature extraction",
            Phase::SparseReconstruction => "Sparse reconstruction",
            Phase::DenseReconstruction => "Dense reconstruction",
        }
    }

    /// The externally-owned artifact whose presence proves this phase ran.
    pub fn artifact(self) -> Artifact {
        match self {
            Phase::FrameExtraction => Artifact::ExtractedFrames,
            Phase::FeatureExtraction => Artifact::FeatureDatabase,
            Phase::SparseReconstruction => Artifact::SparseModels,
            Phase::DenseReconstruction => Artifact::DenseOutput,
        }
    }

    /// Jobs for these phases routinely run for hours.
    pub fn is_long_running(self) -> bool {
        matches!(
            self,
            Phase::SparseReconstruction | Phase::DenseReconstruction
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a phase name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Invalid phase '{0}'. Valid values: frame_extraction (frames), feature_extraction (features), sparse_reconstruction (sparse), dense_reconstruction (dense)"
)]
pub struct ParsePhaseError(pub String);

impl FromStr for Phase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "frame_extraction" | "frames" => Ok(Phase::FrameExtraction),
            "feature_extraction" | "features" => Ok(Phase::FeatureExtraction),
            "sparse_reconstruction" | "sparse" => Ok(Phase::SparseReconstruction),
            "dense_reconstruction" | "dense" => Ok(Phase::DenseReconstruction),
            _ => Err(ParsePhaseError(s.to_string())),
        }
    }
}

/// Completion state of a single phase.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PhaseStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed { error: String },
}

impl PhaseStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::NotStarted => write!(f, "not started"),
            PhaseStatus::Running => write!(f, "running"),
            PhaseStatus::Completed => write!(f, "completed"),
            PhaseStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// A single externally-executing job bound to one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, phase: Phase) -> Self {
        Self {
            session_id: session_id.into(),
            phase,
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_matches_dependency_chain() {
        assert!(Phase::FrameExtraction < Phase::FeatureExtraction);
        assert!(Phase::SparseReconstruction < Phase::DenseReconstruction);
        assert_eq!(
            Phase::SparseReconstruction.predecessors(),
            &[Phase::FrameExtraction, Phase::FeatureExtraction]
        );
        assert!(Phase::FrameExtraction.predecessors().is_empty());
        assert!(Phase::DenseReconstruction.successors().is_empty());
        assert_eq!(
            Phase::FeatureExtraction.successors(),
            &[Phase::SparseReconstruction, Phase::DenseReconstruction]
        );
    }

    #[test]
    fn test_phase_parse_accepts_aliases() {
        assert_eq!("dense".parse::<Phase>().unwrap(), Phase::DenseReconstruction);
        assert_eq!(
            "Feature-Extraction".parse::<Phase>().unwrap(),
            Phase::FeatureExtraction
        );
        assert_eq!(
            Phase::SparseReconstruction.as_str().parse::<Phase>().unwrap(),
            Phase::SparseReconstruction
        );
        let err = "meshing".parse::<Phase>().unwrap_err();
        assert!(err.to_string().contains("meshing"));
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let json = serde_json::to_string(&Phase::DenseReconstruction).unwrap();
        assert_eq!(json, "\"dense_reconstruction\"");
    }

    #[test]
    fn test_long_running_phases() {
        assert!(!Phase::FrameExtraction.is_long_running());
        assert!(Phase::DenseReconstruction.is_long_running());
    }

    #[test]
    fn test_status_display() {
        let failed = PhaseStatus::Failed {
            error: "out of memory".into(),
        };
        assert_eq!(failed.to_string(), "failed: out of memory");
        assert!(failed.is_failed());
        assert_eq!(PhaseStatus::default(), PhaseStatus::NotStarted);
    }
}
