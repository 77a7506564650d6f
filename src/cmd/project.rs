//! Project-wide commands: `init`, `reconcile`, `reset`.

use anyhow::Result;
use console::style;
use reconflow::tracker::NoopObserver;
use reconflow::ui::icons::{PROBE, SPARKLE, WARN};
use std::path::Path;
use std::sync::Arc;

use super::open_orchestrator;
use super::phase::print_phases;
use crate::Cli;

pub fn cmd_init(project_dir: &Path, cli: &Cli) -> Result<()> {
    use reconflow::init::init_project;

    let result = init_project(project_dir, cli.engine_url.as_deref(), cli.project.as_deref())?;

    if result.created {
        println!(
            "{}Initialized reconflow project at {}",
            SPARKLE,
            result.reconflow_dir.display()
        );
    } else {
        println!(
            "Reconflow project already initialized at {}",
            result.reconflow_dir.display()
        );
    }
    if result.wrote_config {
        println!("  Created reconflow.toml");
    }
    println!();
    println!("Next steps:");
    println!("  1. Point engine.base_url in .reconflow/reconflow.toml at your engine");
    println!("  2. Run 'reconflow start frames' to begin the pipeline");
    Ok(())
}

pub async fn cmd_reconcile(project_dir: &Path, cli: &Cli) -> Result<()> {
    let (_config, mut orchestrator) = open_orchestrator(project_dir, cli)?;
    let report = orchestrator.startup(Arc::new(NoopObserver)).await?.reconcile;

    println!();
    println!("{}Artifacts ({} probes)", PROBE, report.probes);
    for (phase, observation) in &report.observations {
        println!("  {:<24} {}", phase.label(), observation);
    }
    for phase in &report.skipped_live {
        println!(
            "  {:<24} {}",
            phase.label(),
            style("skipped, session running").dim()
        );
    }
    println!();

    if report.is_unchanged() {
        println!("No status changes.");
    } else {
        for change in &report.changes {
            println!(
                "  {}: {} -> {}",
                change.phase.label(),
                change.from,
                style(&change.to).bold()
            );
        }
    }
    for err in report.ambiguous() {
        println!("{}{}", WARN, style(err).yellow());
    }
    println!();
    print_phases(&orchestrator);
    Ok(())
}

pub async fn cmd_reset(project_dir: &Path, cli: &Cli, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let (config, mut orchestrator) = open_orchestrator(project_dir, cli)?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt(format!(
                "This deletes every artifact of project '{}' on the engine. Are you sure?",
                config.project
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    let report = orchestrator.reset_project().await?;
    for artifact in &report.deleted_artifacts {
        println!("  deleted {}", artifact);
    }
    println!("Reset complete");
    Ok(())
}
