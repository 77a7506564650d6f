//! Phase lifecycle commands: `status`, `start`, `watch`, `cancel`.

use anyhow::Result;
use console::style;
use reconflow::engine::PhaseParams;
use reconflow::orchestrator::ResumeOutcome;
use reconflow::tracker::{NoopObserver, TrackOutcome};
use reconflow::ui::icons::{CHECK, CROSS, WARN};
use reconflow::ui::{ProgressUI, status_line};
use reconflow::{Orchestrator, OrchestratorError};
use reconflow_common::Phase;
use std::path::Path;
use std::sync::Arc;

use super::open_orchestrator;
use crate::Cli;

pub async fn cmd_status(project_dir: &Path, cli: &Cli) -> Result<()> {
    let (config, mut orchestrator) = open_orchestrator(project_dir, cli)?;
    let report = orchestrator.startup(Arc::new(NoopObserver)).await?;

    println!();
    println!("Reconstruction Status");
    println!("=====================");
    println!();
    println!("Project: {}", config.project);
    println!("Engine:  {}", config.engine_url);
    println!();

    print_phases(&orchestrator);
    println!();

    if let ResumeOutcome::Resumed { phase, .. } = &report.resume {
        println!("{} is still running. Run 'reconflow watch' to follow it.", phase.label());
    }
    for err in report.reconcile.ambiguous() {
        println!("{}{}", WARN, style(err).yellow());
    }
    println!(
        "Completed: {}/{}",
        orchestrator.state().completed_count(),
        Phase::ALL.len()
    );
    Ok(())
}

pub async fn cmd_start(
    project_dir: &Path,
    cli: &Cli,
    phase: Phase,
    params: &[String],
    detach: bool,
) -> Result<()> {
    let params = PhaseParams::from_pairs(params)?;
    let (_config, mut orchestrator) = open_orchestrator(project_dir, cli)?;
    let ui = Arc::new(ProgressUI::new(cli.verbose));

    let report = orchestrator.startup(ui.clone()).await?;
    report_resume(&report.resume);

    let session = match orchestrator.start_phase(phase, params, ui.clone()).await {
        Ok(session) => session,
        Err(OrchestratorError::ModelSelectionRequired) => {
            anyhow::bail!(
                "{} Run 'reconflow models' and 'reconflow select <model-id>' first.",
                OrchestratorError::ModelSelectionRequired
            );
        }
        Err(e) => return Err(e.into()),
    };
    ui.println(format!(
        "{}Started {} {}",
        CHECK,
        phase.label(),
        style(format!("(session {})", session.session_id)).dim()
    ));

    if detach {
        println!("Run 'reconflow watch' to follow progress.");
        return Ok(());
    }

    let outcomes = follow(&mut orchestrator, &ui).await;
    print_outcomes(&outcomes);
    Ok(())
}

pub async fn cmd_watch(project_dir: &Path, cli: &Cli) -> Result<()> {
    let (_config, mut orchestrator) = open_orchestrator(project_dir, cli)?;
    let ui = Arc::new(ProgressUI::new(cli.verbose));

    let report = orchestrator.startup(ui.clone()).await?;
    report_resume(&report.resume);

    if !orchestrator.has_active_tracking() {
        println!("No running session to watch.");
        return Ok(());
    }
    let outcomes = follow(&mut orchestrator, &ui).await;
    print_outcomes(&outcomes);
    Ok(())
}

pub async fn cmd_cancel(project_dir: &Path, cli: &Cli, phase: Phase) -> Result<()> {
    let (_config, mut orchestrator) = open_orchestrator(project_dir, cli)?;
    orchestrator.startup(Arc::new(NoopObserver)).await?;

    match orchestrator.cancel(phase)? {
        Some(session) => {
            println!(
                "Stopped tracking {} (session {}).",
                phase.label(),
                session.session_id
            );
            println!("The engine job itself was not stopped.");
        }
        None => println!("{} has no running session.", phase.label()),
    }
    Ok(())
}

/// Process tracking events until every track ended or the user interrupts.
///
/// On interrupt the persisted session is kept, so `watch` can pick it up.
async fn follow(orchestrator: &mut Orchestrator, ui: &ProgressUI) -> Vec<TrackOutcome> {
    let mut outcomes = Vec::new();
    loop {
        tokio::select! {
            event = orchestrator.next_event() => match event {
                Some(event) => outcomes.extend(orchestrator.process_event(event)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                ui.println(format!(
                    "{}Interrupted. The engine job keeps running; 'reconflow watch' resumes tracking.",
                    WARN
                ));
                break;
            }
        }
    }
    outcomes
}

fn report_resume(outcome: &ResumeOutcome) {
    match outcome {
        ResumeOutcome::NoSession | ResumeOutcome::Resumed { .. } => {}
        ResumeOutcome::Finalized {
            phase, result: Ok(_), ..
        } => println!("{}{} finished while reconflow was away.", CHECK, phase.label()),
        ResumeOutcome::Finalized {
            phase,
            result: Err(err),
            ..
        } => println!("{}{}: {}", CROSS, phase.label(), style(err).red()),
        ResumeOutcome::Discarded { phase, session_id } => println!(
            "{}Session {} of {} is unknown to the engine and was discarded.",
            WARN,
            session_id,
            phase.label()
        ),
        ResumeOutcome::Deferred { phase, error, .. } => println!(
            "{}Could not check the running {} session: {}",
            WARN,
            phase.label(),
            style(error).yellow()
        ),
    }
}

fn print_outcomes(outcomes: &[TrackOutcome]) {
    if outcomes.is_empty() {
        return;
    }
    println!();
    for outcome in outcomes {
        match &outcome.result {
            Ok(_) => println!("{}{} completed", CHECK, outcome.phase.label()),
            Err(err @ OrchestratorError::JobFailure { .. }) => {
                println!("{}{}", CROSS, style(err).red())
            }
            Err(err) => println!(
                "{}{}: {} (run 'reconflow reconcile' to recheck)",
                WARN,
                outcome.phase.label(),
                style(err).yellow()
            ),
        }
    }
}

pub(crate) fn print_phases(orchestrator: &Orchestrator) {
    let state = orchestrator.state();
    for (phase, status) in state.statuses() {
        let session = state.session(phase).map(|s| s.session_id.as_str());
        println!("  {}", status_line(phase, status, session));
    }
}
