//! Candidate reconstruction models produced by sparse reconstruction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistics of one reconstruction produced by the engine.
///
/// A single sparse run may yield several disconnected reconstructions; each
/// is one `ReconstructionModel`. Field names follow the engine's camelCase
/// JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructionModel {
    pub model_id: String,
    pub registered_images: u64,
    pub total_images: u64,
    #[serde(default)]
    pub point_count: u64,
    pub mean_reprojection_error: f64,
    #[serde(default)]
    pub mean_track_length: f64,
    #[serde(default)]
    pub observation_count: u64,
}

impl ReconstructionModel {
    /// Fraction of input images registered into this model, in `[0, 1]`.
    pub fn registration_ratio(&self) -> f64 {
        if self.total_images == 0 {
            return 0.0;
        }
        (self.registered_images as f64 / self.total_images as f64).min(1.0)
    }
}

/// Coarse ranking bucket derived from a model's accuracy and coverage.
///
/// Ordered worst to best, so `Excellent` compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityClass {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl fmt::Display for QualityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityClass::Poor => write!(f, "poor"),
            QualityClass::Fair => write!(f, "fair"),
            QualityClass::Good => write!(f, "good"),
            QualityClass::Excellent => write!(f, "excellent"),
        }
    }
}
