use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::engine::TimeoutPolicy;
use crate::orchestrator::OrchestratorSettings;
use crate::reconflow_config::{CONFIG_FILE_NAME, ReconflowToml};

/// Name of the per-project state directory.
pub const RECONFLOW_DIR: &str = ".reconflow";

/// Overrides given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub engine_url: Option<String>,
    pub project: Option<String>,
    pub verbose: bool,
}

/// Runtime configuration for reconflow.
///
/// Resolves the `.reconflow/` paths of a project directory and merges
/// `reconflow.toml`, the environment and CLI overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub reconflow_dir: PathBuf,
    pub config_file: PathBuf,
    pub session_file: PathBuf,
    pub log_dir: PathBuf,
    pub engine_url: String,
    pub project: String,
    pub verbose: bool,
    toml: ReconflowToml,
}

impl Config {
    pub fn new(project_dir: PathBuf, overrides: CliOverrides) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let reconflow_dir = project_dir.join(RECONFLOW_DIR);

        let mut toml = ReconflowToml::load_or_default(&reconflow_dir)?;
        toml.apply_env();
        if let Some(url) = overrides.engine_url {
            toml.engine.base_url = url;
        }
        if let Some(project) = overrides.project {
            toml.engine.project = Some(project);
        }

        let engine_url = toml.engine.base_url.trim_end_matches('/').to_string();
        let project = toml
            .engine
            .project
            .clone()
            .unwrap_or_else(|| default_project_name(&project_dir));

        Ok(Self {
            config_file: reconflow_dir.join(CONFIG_FILE_NAME),
            session_file: reconflow_dir.join("session.json"),
            log_dir: reconflow_dir.join("logs"),
            reconflow_dir,
            project_dir,
            engine_url,
            project,
            verbose: overrides.verbose,
            toml,
        })
    }

    /// The merged file settings.
    pub fn toml(&self) -> &ReconflowToml {
        &self.toml
    }

    pub fn timeouts(&self) -> TimeoutPolicy {
        self.toml.timeout_policy()
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        self.toml.orchestrator_settings()
    }

    /// Whether `reconflow init` has been run here.
    pub fn is_initialized(&self) -> bool {
        self.reconflow_dir.is_dir()
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.reconflow_dir)
            .context("Failed to create .reconflow directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}

fn default_project_name(project_dir: &Path) -> String {
    project_dir
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("default")
        .to_string()
}
