//! Model analysis and selection: `models`, `select`.

use anyhow::Result;
use console::style;
use reconflow::ranking::RankedModel;
use reconflow::tracker::NoopObserver;
use reconflow_common::QualityClass;
use std::path::Path;
use std::sync::Arc;

use super::open_orchestrator;
use crate::Cli;

pub async fn cmd_models(project_dir: &Path, cli: &Cli) -> Result<()> {
    let (_config, mut orchestrator) = open_orchestrator(project_dir, cli)?;
    orchestrator.startup(Arc::new(NoopObserver)).await?;

    let ranked = orchestrator.analyze_models().await?;
    if ranked.is_empty() {
        println!("No reconstruction models found. Run sparse reconstruction first.");
        return Ok(());
    }

    let selected = orchestrator.ranker().selected();
    println!();
    println!(
        "  {:<3} {:<12} {:<10} {:>11} {:>10} {:>8}",
        "", "MODEL", "QUALITY", "REGISTERED", "POINTS", "ERROR"
    );
    for model in &ranked {
        let marker = if selected == Some(model.model_id()) {
            "*"
        } else {
            ""
        };
        println!("  {:<3} {}", marker, model_row(model));
    }
    println!();
    if let Some(id) = selected {
        println!("Selected for dense reconstruction: {}", style(id).bold());
    }
    Ok(())
}

pub async fn cmd_select(project_dir: &Path, cli: &Cli, model_id: &str) -> Result<()> {
    let (_config, mut orchestrator) = open_orchestrator(project_dir, cli)?;
    orchestrator.startup(Arc::new(NoopObserver)).await?;

    orchestrator.select_model(model_id).await?;
    println!("Selected model {} for dense reconstruction.", style(model_id).bold());
    Ok(())
}

fn model_row(ranked: &RankedModel) -> String {
    let m = &ranked.model;
    let class = format!("{:<10}", ranked.class);
    let class = match ranked.class {
        QualityClass::Excellent | QualityClass::Good => style(class).green(),
        QualityClass::Fair => style(class).yellow(),
        QualityClass::Poor => style(class).red(),
    };
    format!(
        "{:<12} {} {:>11} {:>10} {:>8.3}",
        m.model_id,
        class,
        format!("{}/{}", m.registered_images, m.total_images),
        m.point_count,
        m.mean_reprojection_error
    )
}
