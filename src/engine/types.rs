//! Wire types exchanged with the reconstruction engine.

use chrono::{DateTime, TimeZone, Utc};
use reconflow_common::{Phase, ProgressSnapshot, ReconstructionModel};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Free-form job parameters forwarded to `startPhase`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseParams(Map<String, Value>);

impl PhaseParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse `key=value` pairs. Values that parse as JSON scalars (numbers,
    /// booleans) keep their type; everything else is a string.
    pub fn from_pairs<I, S>(pairs: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Invalid parameter '{}': expected key=value", pair))?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("Invalid parameter '{}': empty key", pair);
            }
            let value = match serde_json::from_str::<Value>(raw) {
                Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
                _ => Value::String(raw.to_string()),
            };
            params.insert(key, value);
        }
        Ok(params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartStatus {
    Success,
    Error,
}

/// Response of `startPhase`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub status: StartStatus,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StartResponse {
    pub fn accepted(session_id: impl Into<String>) -> Self {
        Self {
            status: StartStatus::Success,
            session_id: Some(session_id.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            status: StartStatus::Error,
            session_id: None,
            error: Some(error.into()),
        }
    }
}

/// Raw response of the progress endpoint, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    #[serde(default)]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "deserialize_start_time")]
    pub start_time: Option<DateTime<Utc>>,
}

impl ProgressReport {
    pub fn running(current: u64, total: u64) -> Self {
        Self {
            current: Some(current),
            total: Some(total),
            ..Self::default()
        }
    }

    pub fn finished() -> Self {
        Self {
            percent: Some(100.0),
            complete: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            complete: true,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Normalize into a snapshot for the tracked `phase`.
    ///
    /// - missing percent is derived from `current / total`
    /// - percent is clamped into `[0, 100]`
    /// - an error makes the snapshot terminal
    /// - a successful terminal snapshot reports 100%
    pub fn normalize(self, phase: Phase, poll_seq: u64) -> ProgressSnapshot {
        let current = self.current.unwrap_or(0);
        let total = self.total.unwrap_or(0);
        let error = self.error.filter(|e| !e.trim().is_empty());
        let complete = self.complete || error.is_some();

        let mut percent = match self.percent.filter(|p| p.is_finite()) {
            Some(p) => p,
            None if total > 0 => current as f64 / total as f64 * 100.0,
            None => 0.0,
        }
        .clamp(0.0, 100.0);
        if complete && error.is_none() {
            percent = 100.0;
        }

        if let Some(reported) = self.phase
            && reported != phase
        {
            tracing::warn!(%phase, %reported, "Progress report names a different phase");
        }

        ProgressSnapshot {
            phase,
            current,
            total,
            percent,
            complete,
            error,
            poll_seq,
            started_at: self.start_time,
        }
    }
}

/// Accepts either epoch seconds (integer or fractional) or an RFC 3339 string.
fn deserialize_start_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Epoch(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Epoch(secs)) if secs.is_finite() && secs >= 0.0 => {
            let millis = (secs * 1000.0).round() as i64;
            Utc.timestamp_millis_opt(millis).single()
        }
        Some(Raw::Epoch(_)) => None,
        Some(Raw::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

/// Response of `analyzeModels`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAnalysis {
    #[serde(default)]
    pub models: Vec<ReconstructionModel>,
    #[serde(default)]
    pub best_model_id: Option<String>,
}

/// Response of `resetProject`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetReport {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub deleted_artifacts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_derives_percent_from_counts() {
        let snapshot = ProgressReport::running(150, 600).normalize(Phase::FrameExtraction, 3);
        assert_eq!(snapshot.percent, 25.0);
        assert_eq!(snapshot.poll_seq, 3);
        assert!(!snapshot.complete);
    }

    #[test]
    fn test_normalize_clamps_percent() {
        let report = ProgressReport {
            percent: Some(140.0),
            ..ProgressReport::default()
        };
        assert_eq!(report.normalize(Phase::FrameExtraction, 1).percent, 100.0);

        let report = ProgressReport {
            percent: Some(-5.0),
            ..ProgressReport::default()
        };
        assert_eq!(report.normalize(Phase::FrameExtraction, 1).percent, 0.0);

        let report = ProgressReport {
            percent: Some(f64::NAN),
            current: Some(1),
            total: Some(4),
            ..ProgressReport::default()
        };
        assert_eq!(report.normalize(Phase::FrameExtraction, 1).percent, 25.0);
    }

    #[test]
    fn test_normalize_error_is_terminal() {
        let report = ProgressReport {
            percent: Some(40.0),
            error: Some("sift failed".into()),
            ..ProgressReport::default()
        };
        let snapshot = report.normalize(Phase::FeatureExtraction, 2);
        assert!(snapshot.complete);
        assert!(snapshot.is_failure());
        assert_eq!(snapshot.percent, 40.0);
    }

    #[test]
    fn test_normalize_blank_error_is_ignored() {
        let report = ProgressReport {
            percent: Some(10.0),
            error: Some("  ".into()),
            ..ProgressReport::default()
        };
        let snapshot = report.normalize(Phase::FeatureExtraction, 2);
        assert!(!snapshot.complete);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn test_normalize_success_reports_full_percent() {
        let report = ProgressReport {
            current: Some(10),
            total: Some(12),
            complete: true,
            ..ProgressReport::default()
        };
        assert_eq!(report.normalize(Phase::FrameExtraction, 9).percent, 100.0);
    }

    #[test]
    fn test_progress_report_parses_engine_json() {
        let json = r#"{"phase":"sparse_reconstruction","current":12,"total":40,"percent":30,"complete":false,"startTime":1700000000.5}"#;
        let report: ProgressReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.phase, Some(Phase::SparseReconstruction));
        assert_eq!(report.percent, Some(30.0));
        assert_eq!(
            report.start_time.unwrap().timestamp_millis(),
            1_700_000_000_500
        );
    }

    #[test]
    fn test_progress_report_parses_rfc3339_start() {
        let json = r#"{"complete":true,"startTime":"2024-05-01T10:00:00Z"}"#;
        let report: ProgressReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.start_time.unwrap().to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_progress_report_tolerates_null_and_garbage_start() {
        let report: ProgressReport = serde_json::from_str(r#"{"startTime":null}"#).unwrap();
        assert!(report.start_time.is_none());
        let report: ProgressReport =
            serde_json::from_str(r#"{"startTime":"yesterday"}"#).unwrap();
        assert!(report.start_time.is_none());
    }

    #[test]
    fn test_start_response_parses() {
        let ok: StartResponse =
            serde_json::from_str(r#"{"status":"success","sessionId":"abc"}"#).unwrap();
        assert_eq!(ok, StartResponse::accepted("abc"));
        let err: StartResponse =
            serde_json::from_str(r#"{"status":"error","error":"no video"}"#).unwrap();
        assert_eq!(err, StartResponse::rejected("no video"));
    }

    #[test]
    fn test_params_from_pairs_keeps_scalar_types() {
        let params = PhaseParams::from_pairs(["fps=2", "video=clip.mp4", "gpu=true"]).unwrap();
        assert_eq!(params.get("fps"), Some(&Value::from(2)));
        assert_eq!(params.get("video"), Some(&Value::from("clip.mp4")));
        assert_eq!(params.get("gpu"), Some(&Value::from(true)));
    }

    #[test]
    fn test_params_from_pairs_rejects_malformed() {
        assert!(PhaseParams::from_pairs(["novalue"]).is_err());
        assert!(PhaseParams::from_pairs(["=3"]).is_err());
    }

    #[test]
    fn test_model_analysis_parses() {
        let json = r#"{"models":[{"modelId":"0","registeredImages":580,"totalImages":606,"meanReprojectionError":0.8}],"bestModelId":"0"}"#;
        let analysis: ModelAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.models.len(), 1);
        assert_eq!(analysis.best_model_id.as_deref(), Some("0"));
    }
}
