//! Check command - Validate module selections without writing anything.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use modforge_iac::GenerationRun;

use super::{print_reports, terraform_tool, SettingsArgs};

#[derive(Args, Debug, Clone, Default)]
pub struct CheckArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
}

pub async fn execute(args: CheckArgs) -> Result<bool> {
    let settings = args.settings.resolve()?;
    let tool = terraform_tool(&settings);

    println!("📋 Checking project configurations in {}", settings.configs_dir.display());

    let reports = GenerationRun::new(settings, Arc::new(tool))
        .check_projects()
        .await
        .context("Check aborted")?;

    println!();
    print_reports(&reports);

    let passed = reports.iter().filter(|r| r.is_success()).count();
    println!();
    println!("Total: {}/{} projects valid", passed, reports.len());

    Ok(passed == reports.len())
}
