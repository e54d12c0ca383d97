//! Generate command - Materialize every configured project.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use modforge_iac::{CancellationFlag, GenerationRun};

use crate::ExitCodes;

use super::{print_reports, terraform_tool, SettingsArgs};

#[derive(Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Reuse project directories that already exist
    #[arg(long)]
    pub overwrite: bool,
}

pub async fn execute(args: GenerateArgs) -> Result<bool> {
    let settings = args.settings.resolve()?;
    let output_dir = settings.output_dir.clone();
    let tool = terraform_tool(&settings);

    let cancel = CancellationFlag::new();
    tokio::spawn(watch_interrupts(cancel.clone()));

    println!(
        "🏗️  Generating projects from {} into {}",
        settings.configs_dir.display(),
        output_dir.display()
    );
    info!("Using template directory {}", settings.template_dir.display());

    let summary = GenerationRun::new(settings, Arc::new(tool))
        .with_overwrite(args.overwrite)
        .with_cancellation(cancel)
        .execute()
        .await
        .context("Generation run aborted")?;

    println!();
    print_reports(&summary.projects);

    let report_path = summary
        .save(&output_dir)
        .context("Failed to write run report")?;

    println!();
    println!(
        "Total: {}/{} projects generated successfully",
        summary.succeeded(),
        summary.total()
    );
    println!("Report: {}", report_path.display());

    Ok(summary.all_succeeded())
}

/// First Ctrl-C stops new projects from starting, a second one exits.
async fn watch_interrupts(cancel: CancellationFlag) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if on_interrupt(&cancel) {
            eprintln!("❌ Interrupted again, exiting without waiting for running projects");
            std::process::exit(ExitCodes::INTERRUPTED.into());
        }
    }
}

/// Record one interrupt. Returns true when the run was already cancelled.
fn on_interrupt(cancel: &CancellationFlag) -> bool {
    if cancel.is_cancelled() {
        return true;
    }
    warn!("Interrupted, waiting for running projects to finish (press Ctrl-C again to exit)");
    cancel.cancel();
    false
}
