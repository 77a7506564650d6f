//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `phase`         | `Status`, `Start`, `Watch`, `Cancel`               |
//! | `project`       | `Init`, `Reconcile`, `Reset`                       |
//! | `models`        | `Models`, `Select`                                 |
//! | `config`        | `Config`                                           |

pub mod config;
pub mod models;
pub mod phase;
pub mod project;

pub use config::cmd_config;
pub use models::{cmd_models, cmd_select};
pub use phase::{cmd_cancel, cmd_start, cmd_status, cmd_watch};
pub use project::{cmd_init, cmd_reconcile, cmd_reset};

use anyhow::{Context, Result};
use reconflow::config::{CliOverrides, Config};
use reconflow::engine::HttpEngine;
use reconflow::session::FileSessionStore;
use reconflow::Orchestrator;
use std::path::Path;
use std::sync::Arc;

use crate::Cli;

pub(crate) fn load_config(project_dir: &Path, cli: &Cli) -> Result<Config> {
    Config::new(
        project_dir.to_path_buf(),
        CliOverrides {
            engine_url: cli.engine_url.clone(),
            project: cli.project.clone(),
            verbose: cli.verbose,
        },
    )
}

/// Build an orchestrator talking to the configured engine, with its session
/// store under `.reconflow/`.
pub(crate) fn open_orchestrator(project_dir: &Path, cli: &Cli) -> Result<(Config, Orchestrator)> {
    let config = load_config(project_dir, cli)?;
    if !config.is_initialized() {
        anyhow::bail!(
            "Project not initialized at {}. Run 'reconflow init' first.",
            config.project_dir.display()
        );
    }
    config
        .ensure_directories()
        .context("Failed to prepare .reconflow directory")?;

    let engine = HttpEngine::new(&config.engine_url, &config.project, config.timeouts());
    let store = FileSessionStore::new(&config.session_file);
    let orchestrator = Orchestrator::new(
        Arc::new(engine),
        Box::new(store),
        config.orchestrator_settings(),
    );
    tracing::debug!(engine = %config.engine_url, project = %config.project, "Orchestrator ready");
    Ok((config, orchestrator))
}
