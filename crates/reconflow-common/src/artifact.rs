//! Externally-owned phase outputs that serve as ground truth for completion.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::phase::Phase;

/// The output a phase leaves behind on the engine side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    /// Frames extracted from the source video.
    ExtractedFrames,
    /// The feature/match database.
    FeatureDatabase,
    /// At least one completed sparse reconstruction model.
    SparseModels,
    /// The fused dense point cloud (final pipeline output).
    DenseOutput,
}

impl Artifact {
    pub fn as_str(self) -> &'static str {
        match self {
            Artifact::ExtractedFrames => "extracted_frames",
            Artifact::FeatureDatabase => "feature_database",
            Artifact::SparseModels => "sparse_models",
            Artifact::DenseOutput => "dense_output",
        }
    }

    /// The phase that produces this artifact.
    pub fn phase(self) -> Phase {
        match self {
            Artifact::ExtractedFrames => Phase::FrameExtraction,
            Artifact::FeatureDatabase => Phase::FeatureExtraction,
            Artifact::SparseModels => Phase::SparseReconstruction,
            Artifact::DenseOutput => Phase::DenseReconstruction,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a read-only artifact probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProbeResult {
    pub present: bool,
    /// Item count for countable artifacts (frames, models).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl ProbeResult {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present() -> Self {
        Self {
            present: true,
            count: None,
        }
    }

    pub fn counted(count: u64) -> Self {
        Self {
            present: count > 0,
            count: Some(count),
        }
    }

    /// An artifact counts as existing only if it is present and, when
    /// countable, non-empty. An empty frames directory is not a finished
    /// extraction.
    pub fn exists(&self) -> bool {
        self.present && self.count.is_none_or(|c| c > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_phase_mapping_is_bijective() {
        for phase in Phase::ALL {
            assert_eq!(phase.artifact().phase(), phase);
        }
    }

    #[test]
    fn test_probe_exists_requires_nonzero_count() {
        assert!(ProbeResult::counted(606).exists());
        assert!(!ProbeResult::counted(0).exists());
        assert!(ProbeResult::present().exists());
        assert!(!ProbeResult::absent().exists());

        let inconsistent = ProbeResult {
            present: true,
            count: Some(0),
        };
        assert!(!inconsistent.exists());
    }

    #[test]
    fn test_probe_result_deserializes_without_count() {
        let probe: ProbeResult = serde_json::from_str(r#"{"present":true}"#).unwrap();
        assert!(probe.exists());
        assert_eq!(probe.count, None);
    }
}
