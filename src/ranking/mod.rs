//! Ranking and selection of competing sparse reconstructions.
//!
//! One sparse run can split into several disconnected models. Each is
//! bucketed into a [`QualityClass`], ranked deterministically, and exactly
//! one is selected as the input of dense reconstruction.

use reconflow_common::{QualityClass, ReconstructionModel};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::errors::OrchestratorError;

/// Minimums a model must meet for one quality class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassThreshold {
    /// Minimum registered/total image ratio.
    pub min_registration_ratio: f64,
    /// Maximum mean reprojection error in pixels.
    pub max_reprojection_error: f64,
    /// Minimum mean track length.
    #[serde(default)]
    pub min_track_length: f64,
}

impl ClassThreshold {
    fn admits(&self, model: &ReconstructionModel) -> bool {
        model.registration_ratio() >= self.min_registration_ratio
            && model.mean_reprojection_error <= self.max_reprojection_error
            && model.mean_track_length >= self.min_track_length
    }
}

/// Quality class boundaries, `[ranking]` in `reconflow.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingThresholds {
    #[serde(default = "default_excellent")]
    pub excellent: ClassThreshold,
    #[serde(default = "default_good")]
    pub good: ClassThreshold,
    #[serde(default = "default_fair")]
    pub fair: ClassThreshold,
}

fn default_excellent() -> ClassThreshold {
    ClassThreshold {
        min_registration_ratio: 0.90,
        max_reprojection_error: 1.0,
        min_track_length: 3.0,
    }
}

fn default_good() -> ClassThreshold {
    ClassThreshold {
        min_registration_ratio: 0.75,
        max_reprojection_error: 1.5,
        min_track_length: 2.5,
    }
}

fn default_fair() -> ClassThreshold {
    ClassThreshold {
        min_registration_ratio: 0.50,
        max_reprojection_error: 2.0,
        min_track_length: 0.0,
    }
}

impl Default for RankingThresholds {
    fn default() -> Self {
        Self {
            excellent: default_excellent(),
            good: default_good(),
            fair: default_fair(),
        }
    }
}

impl RankingThresholds {
    /// Bucket a model. A model without any input images is always Poor.
    pub fn classify(&self, model: &ReconstructionModel) -> QualityClass {
        if model.total_images == 0 || !model.mean_reprojection_error.is_finite() {
            return QualityClass::Poor;
        }
        if self.excellent.admits(model) {
            QualityClass::Excellent
        } else if self.good.admits(model) {
            QualityClass::Good
        } else if self.fair.admits(model) {
            QualityClass::Fair
        } else {
            QualityClass::Poor
        }
    }
}

/// A model with its computed class.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedModel {
    pub model: ReconstructionModel,
    pub class: QualityClass,
}

impl RankedModel {
    pub fn model_id(&self) -> &str {
        &self.model.model_id
    }
}

/// Best first: class, then point count, then observation count, then
/// model id ascending so that ties still order totally.
fn rank_order(a: &RankedModel, b: &RankedModel) -> Ordering {
    b.class
        .cmp(&a.class)
        .then_with(|| b.model.point_count.cmp(&a.model.point_count))
        .then_with(|| b.model.observation_count.cmp(&a.model.observation_count))
        .then_with(|| a.model.model_id.cmp(&b.model.model_id))
}

/// Whether `select` needs to reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChange {
    /// The model was already selected.
    Unchanged,
    Changed,
}

/// Holds the ranked models of the current sparse output and the selection.
#[derive(Debug, Clone, Default)]
pub struct ModelRanker {
    thresholds: RankingThresholds,
    ranked: Vec<RankedModel>,
    selected: Option<String>,
}

impl ModelRanker {
    pub fn new(thresholds: RankingThresholds) -> Self {
        Self {
            thresholds,
            ranked: Vec::new(),
            selected: None,
        }
    }

    pub fn classify(&self, model: &ReconstructionModel) -> QualityClass {
        self.thresholds.classify(model)
    }

    /// Rank `models`, best first. Returns the ranked list and the best id.
    pub fn rank(&self, models: Vec<ReconstructionModel>) -> (Vec<RankedModel>, Option<String>) {
        let mut ranked: Vec<RankedModel> = models
            .into_iter()
            .map(|model| RankedModel {
                class: self.thresholds.classify(&model),
                model,
            })
            .collect();
        ranked.sort_by(rank_order);
        let best = ranked.first().map(|r| r.model.model_id.clone());
        (ranked, best)
    }

    /// Replace the known models with a fresh analysis.
    ///
    /// A selection that no longer names a known model is dropped. Returns
    /// the best model id.
    pub fn load(&mut self, models: Vec<ReconstructionModel>) -> Option<String> {
        let (ranked, best) = self.rank(models);
        self.ranked = ranked;
        if let Some(selected) = &self.selected
            && !self.contains(selected)
        {
            tracing::info!(model_id = %selected, "Dropping selection of vanished model");
            self.selected = None;
        }
        best
    }

    pub fn ranked(&self) -> &[RankedModel] {
        &self.ranked
    }

    pub fn model_count(&self) -> usize {
        self.ranked.len()
    }

    pub fn best(&self) -> Option<&RankedModel> {
        self.ranked.first()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.ranked.iter().any(|r| r.model_id() == model_id)
    }

    /// Validate and record a selection.
    pub fn select(&mut self, model_id: &str) -> Result<SelectionChange, OrchestratorError> {
        if !self.contains(model_id) {
            return Err(OrchestratorError::UnknownModel {
                model_id: model_id.to_string(),
            });
        }
        if self.selected.as_deref() == Some(model_id) {
            return Ok(SelectionChange::Unchanged);
        }
        self.selected = Some(model_id.to_string());
        Ok(SelectionChange::Changed)
    }

    /// Model dense reconstruction should run on.
    ///
    /// With a single model there is nothing to choose. With several, an
    /// explicit selection is required.
    pub fn dense_input(&self) -> Result<Option<&str>, OrchestratorError> {
        match (self.selected(), self.ranked.as_slice()) {
            (Some(selected), _) => Ok(Some(selected)),
            (None, []) => Ok(None),
            (None, [only]) => Ok(Some(only.model_id())),
            (None, _) => Err(OrchestratorError::ModelSelectionRequired),
        }
    }

    /// Put back a previously held selection, dropping it if the model is no
    /// longer known.
    pub fn restore_selection(&mut self, selection: Option<String>) {
        self.selected = selection.filter(|id| self.contains(id));
    }

    /// Forget all models and the selection.
    pub fn clear(&mut self) {
        self.ranked.clear();
        self.selected = None;
    }
}
