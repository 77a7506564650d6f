//! Configuration view and validation commands: `reconflow config`.

use anyhow::{Context, Result};
use reconflow::reconflow_config::{CONFIG_FILE_NAME, ReconflowToml};
use std::path::Path;

use super::super::{Cli, ConfigCommands};
use super::load_config;

pub fn cmd_config(project_dir: &Path, cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config = load_config(project_dir, cli)?;
    let config_path = &config.config_file;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Reconflow Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found at {}", CONFIG_FILE_NAME, config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let toml = config.toml();
            println!("[engine]");
            println!("  base_url = \"{}\"", toml.engine.base_url);
            if let Some(project) = &toml.engine.project {
                println!("  project = \"{}\"", project);
            }
            println!();
            println!("[tracking]");
            println!("  interval_ms = {}", toml.tracking.interval_ms);
            println!();
            println!("[timeouts]");
            println!("  probe_secs = {}", toml.timeouts.probe_secs);
            println!("  start_secs = {}", toml.timeouts.start_secs);
            println!("  long_running_secs = {}", toml.timeouts.long_running_secs);
            println!();
            for (name, threshold) in [
                ("excellent", &toml.ranking.excellent),
                ("good", &toml.ranking.good),
                ("fair", &toml.ranking.fair),
            ] {
                println!("[ranking.{}]", name);
                println!(
                    "  min_registration_ratio = {}",
                    threshold.min_registration_ratio
                );
                println!(
                    "  max_reprojection_error = {}",
                    threshold.max_reprojection_error
                );
                println!("  min_track_length = {}", threshold.min_track_length);
                println!();
            }

            println!("Effective values (with env/CLI overrides):");
            println!("  engine_url = \"{}\"", config.engine_url);
            println!("  project = \"{}\"", config.project);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            if !config_path.exists() {
                println!("No {} found, defaults are valid.", CONFIG_FILE_NAME);
                return Ok(());
            }
            // Validate the file alone, without env/CLI overrides.
            let toml = ReconflowToml::load(config_path)?;
            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE_NAME, config_path.display());
                return Ok(());
            }
            config.ensure_directories()?;
            ReconflowToml::default()
                .save(config_path)
                .context("Failed to create default configuration")?;
            println!("Created {}", config_path.display());
        }
    }

    Ok(())
}
