//! Configuration file for reconflow.
//!
//! Settings are read from `.reconflow/reconflow.toml` and layered
//! file → environment → CLI, later layers winning.
//!
//! # Configuration File Format
//!
//! ```toml
//! [engine]
//! base_url = "http://localhost:5000"
//! project = "garden-scan"
//!
//! [tracking]
//! interval_ms = 1000
//!
//! [timeouts]
//! probe_secs = 10
//! start_secs = 60
//! long_running_secs = 21600
//!
//! [ranking.excellent]
//! min_registration_ratio = 0.9
//! max_reprojection_error = 1.0
//! min_track_length = 3.0
//! ```
//!
//! Environment: `RECONFLOW_ENGINE_URL`, `RECONFLOW_PROJECT` (also read from
//! a `.env` file).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::engine::TimeoutPolicy;
use crate::orchestrator::OrchestratorSettings;
use crate::ranking::RankingThresholds;

pub const CONFIG_FILE_NAME: &str = "reconflow.toml";
pub const ENGINE_URL_ENV: &str = "RECONFLOW_ENGINE_URL";
pub const PROJECT_ENV: &str = "RECONFLOW_PROJECT";

/// Where the engine lives and which project it works on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Project reference sent with every request. Defaults to the project
    /// directory name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSection {
    /// Delay between the end of one progress poll and the next.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutsSection {
    /// Probes, model analysis, selection, reset.
    #[serde(default = "default_probe_secs")]
    pub probe_secs: u64,
    /// Starting and polling short phases.
    #[serde(default = "default_start_secs")]
    pub start_secs: u64,
    /// Starting and polling sparse and dense reconstruction.
    #[serde(default = "default_long_running_secs")]
    pub long_running_secs: u64,
}

fn default_probe_secs() -> u64 {
    10
}

fn default_start_secs() -> u64 {
    60
}

fn default_long_running_secs() -> u64 {
    6 * 60 * 60
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            probe_secs: default_probe_secs(),
            start_secs: default_start_secs(),
            long_running_secs: default_long_running_secs(),
        }
    }
}

/// The complete reconflow.toml structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReconflowToml {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub tracking: TrackingSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub ranking: RankingThresholds,
}

impl ReconflowToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse reconflow.toml")
    }

    /// Load `.reconflow/reconflow.toml`, or defaults if it does not exist.
    pub fn load_or_default(reconflow_dir: &Path) -> Result<Self> {
        let config_path = reconflow_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize reconflow.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `RECONFLOW_ENGINE_URL` and `RECONFLOW_PROJECT` over file values.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENGINE_URL_ENV)
            && !url.trim().is_empty()
        {
            self.engine.base_url = url;
        }
        if let Ok(project) = std::env::var(PROJECT_ENV)
            && !project.trim().is_empty()
        {
            self.engine.project = Some(project);
        }
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            probe: Duration::from_secs(self.timeouts.probe_secs),
            start: Duration::from_secs(self.timeouts.start_secs),
            long_running: Duration::from_secs(self.timeouts.long_running_secs),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            poll_interval: Duration::from_millis(self.tracking.interval_ms),
            ranking: self.ranking,
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.engine.base_url.starts_with("http://")
            && !self.engine.base_url.starts_with("https://")
        {
            warnings.push(format!(
                "engine.base_url '{}' should start with http:// or https://",
                self.engine.base_url
            ));
        }
        if self.tracking.interval_ms < 100 {
            warnings.push(format!(
                "tracking.interval_ms = {} polls the engine very aggressively",
                self.tracking.interval_ms
            ));
        }
        if self.timeouts.long_running_secs < self.timeouts.start_secs {
            warnings.push(
                "timeouts.long_running_secs is shorter than timeouts.start_secs".to_string(),
            );
        }
        for (name, threshold) in [
            ("excellent", &self.ranking.excellent),
            ("good", &self.ranking.good),
            ("fair", &self.ranking.fair),
        ] {
            if !(0.0..=1.0).contains(&threshold.min_registration_ratio) {
                warnings.push(format!(
                    "ranking.{}.min_registration_ratio must be within [0, 1]",
                    name
                ));
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_parse_empty_uses_defaults() {
        let toml = ReconflowToml::parse("").unwrap();
        assert_eq!(toml, ReconflowToml::default());
        assert_eq!(toml.engine.base_url, "http://localhost:5000");
        assert_eq!(toml.tracking.interval_ms, 1000);
        assert_eq!(toml.timeout_policy(), TimeoutPolicy::default());
    }

    #[test]
    fn test_parse_sections() {
        let content = r#"
[engine]
base_url = "http://gpu-box:8080"
project = "garden"

[tracking]
interval_ms = 2500

[timeouts]
long_running_secs = 3600

[ranking.good]
min_registration_ratio = 0.8
max_reprojection_error = 1.2
"#;
        let toml = ReconflowToml::parse(content).unwrap();
        assert_eq!(toml.engine.project.as_deref(), Some("garden"));
        assert_eq!(
            toml.orchestrator_settings().poll_interval,
            Duration::from_millis(2500)
        );
        let policy = toml.timeout_policy();
        assert_eq!(policy.long_running, Duration::from_secs(3600));
        assert_eq!(policy.probe, Duration::from_secs(10));
        assert_eq!(toml.ranking.good.min_registration_ratio, 0.8);
        assert_eq!(toml.ranking.good.min_track_length, 0.0);
    }

    #[test]
    fn test_parse_invalid_toml_fails() {
        assert!(ReconflowToml::parse("[engine\nbase_url=").is_err());
    }

    #[test]
    fn test_save_and_load_round_trip_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut toml = ReconflowToml::default();
        toml.engine.project = Some("bridge".into());
        toml.save(&path).unwrap();

        let loaded = ReconflowToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.engine.project.as_deref(), Some("bridge"));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let loaded = ReconflowToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, ReconflowToml::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let _guard = ENV_MUTEX.lock().unwrap();

        let saved_url = std::env::var(ENGINE_URL_ENV).ok();
        let saved_project = std::env::var(PROJECT_ENV).ok();
        unsafe {
            std::env::set_var(ENGINE_URL_ENV, "http://env-engine:9000");
            std::env::remove_var(PROJECT_ENV);
        }

        let mut toml = ReconflowToml::parse("[engine]\nproject = \"from-file\"").unwrap();
        toml.apply_env();
        assert_eq!(toml.engine.base_url, "http://env-engine:9000");
        assert_eq!(toml.engine.project.as_deref(), Some("from-file"));

        unsafe {
            std::env::remove_var(ENGINE_URL_ENV);
            if let Some(val) = saved_url {
                std::env::set_var(ENGINE_URL_ENV, val);
            }
            if let Some(val) = saved_project {
                std::env::set_var(PROJECT_ENV, val);
            }
        }
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let content = r#"
[engine]
base_url = "localhost:5000"

[tracking]
interval_ms = 10
"#;
        let toml = ReconflowToml::parse(content).unwrap();
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 2);
        assert!(ReconflowToml::default().validate().is_empty());
    }
}
