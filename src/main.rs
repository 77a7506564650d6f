use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reconflow_common::Phase;
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "reconflow")]
#[command(version, about = "Orchestrator for remote 3D reconstruction pipelines")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Base URL of the reconstruction engine. Overrides reconflow.toml and RECONFLOW_ENGINE_URL.
    #[arg(long, global = true)]
    pub engine_url: Option<String>,

    /// Engine-side project name. Defaults to the project directory name.
    #[arg(long, global = true)]
    pub project: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a reconflow project in the current directory
    Init,
    /// Show the status of every phase, reconciled against the engine
    Status,
    /// Start a phase on the engine
    Start {
        /// frames, features, sparse or dense (full names also accepted)
        phase: Phase,

        /// Job parameter as key=value (repeatable)
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Return once the job is accepted instead of following its progress
        #[arg(long)]
        detach: bool,
    },
    /// Follow the session left running by a previous invocation
    Watch,
    /// Stop tracking a phase locally (the engine job keeps running)
    Cancel { phase: Phase },
    /// Probe engine artifacts and correct local phase statuses
    Reconcile,
    /// Analyze and rank the models of the current sparse reconstruction
    Models,
    /// Select the model used as input of dense reconstruction
    Select { model_id: String },
    /// Delete every artifact on the engine and clear local state
    Reset {
        #[arg(long)]
        force: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default reconflow.toml file
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let log_dir = project_dir.join(reconflow::config::RECONFLOW_DIR).join("logs");
    let _log_guard = reconflow::logging::init(cli.verbose, Some(&log_dir));

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir, &cli)?,
        Commands::Status => cmd::cmd_status(&project_dir, &cli).await?,
        Commands::Start {
            phase,
            params,
            detach,
        } => cmd::cmd_start(&project_dir, &cli, *phase, params, *detach).await?,
        Commands::Watch => cmd::cmd_watch(&project_dir, &cli).await?,
        Commands::Cancel { phase } => cmd::cmd_cancel(&project_dir, &cli, *phase).await?,
        Commands::Reconcile => cmd::cmd_reconcile(&project_dir, &cli).await?,
        Commands::Models => cmd::cmd_models(&project_dir, &cli).await?,
        Commands::Select { model_id } => cmd::cmd_select(&project_dir, &cli, model_id).await?,
        Commands::Reset { force } => cmd::cmd_reset(&project_dir, &cli, *force).await?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, &cli, command.clone())?,
    }

    Ok(())
}
