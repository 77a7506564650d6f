//! Initialization of reconflow projects.
//!
//! `reconflow init` creates the `.reconflow/` directory:
//!
//! ```text
//! .reconflow/
//! ├── reconflow.toml   # Engine, tracking, timeout and ranking settings
//! ├── session.json     # Active session (created on first start)
//! └── logs/            # Daily rolling logs
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::RECONFLOW_DIR;
use crate::reconflow_config::{CONFIG_FILE_NAME, ReconflowToml};

/// Result of initializing a project.
#[derive(Debug)]
pub struct InitResult {
    pub reconflow_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
    /// Whether a default `reconflow.toml` was written
    pub wrote_config: bool,
}

/// Initialize a reconflow project in `project_dir`.
///
/// Existing files are never overwritten. `engine_url` and `project` seed the
/// generated config file.
pub fn init_project(
    project_dir: &Path,
    engine_url: Option<&str>,
    project: Option<&str>,
) -> Result<InitResult> {
    let reconflow_dir = project_dir.join(RECONFLOW_DIR);
    let created = !reconflow_dir.exists();

    std::fs::create_dir_all(&reconflow_dir)
        .with_context(|| format!("Failed to create directory: {}", reconflow_dir.display()))?;
    let log_dir = reconflow_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let config_file = reconflow_dir.join(CONFIG_FILE_NAME);
    let wrote_config = if config_file.exists() {
        false
    } else {
        let mut toml = ReconflowToml::default();
        if let Some(url) = engine_url {
            toml.engine.base_url = url.to_string();
        }
        toml.engine.project = project.map(str::to_string);
        toml.save(&config_file)?;
        true
    };

    Ok(InitResult {
        reconflow_dir,
        created,
        wrote_config,
    })
}

/// Check if a project is already initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(RECONFLOW_DIR).is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_project_creates_directory_structure() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path(), None, None).unwrap();

        assert!(result.created);
        assert!(result.wrote_config);
        assert_eq!(result.reconflow_dir, dir.path().join(".reconflow"));
        assert!(result.reconflow_dir.join("logs").is_dir());
        assert!(result.reconflow_dir.join("reconflow.toml").is_file());
        assert!(is_initialized(dir.path()));
    }

    #[test]
    fn test_init_project_seeds_config() {
        let dir = tempdir().unwrap();
        init_project(dir.path(), Some("http://gpu:7000"), Some("garden")).unwrap();

        let toml = ReconflowToml::load_or_default(&dir.path().join(".reconflow")).unwrap();
        assert_eq!(toml.engine.base_url, "http://gpu:7000");
        assert_eq!(toml.engine.project.as_deref(), Some("garden"));
    }

    #[test]
    fn test_init_project_is_idempotent_and_keeps_config() {
        let dir = tempdir().unwrap();
        init_project(dir.path(), None, Some("first")).unwrap();
        let again = init_project(dir.path(), None, Some("second")).unwrap();

        assert!(!again.created);
        assert!(!again.wrote_config);
        let toml = ReconflowToml::load_or_default(&again.reconflow_dir).unwrap();
        assert_eq!(toml.engine.project.as_deref(), Some("first"));
    }

    #[test]
    fn test_is_initialized_false_for_fresh_dir() {
        let dir = tempdir().unwrap();
        assert!(!is_initialized(dir.path()));
    }
}
