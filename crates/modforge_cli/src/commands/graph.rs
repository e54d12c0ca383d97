//! Graph command - Print the module dependency map of the template.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use modforge_iac::GenerationRun;

use super::{terraform_tool, SettingsArgs};

#[derive(Args, Debug, Clone, Default)]
pub struct GraphArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Print the map as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: GraphArgs) -> Result<bool> {
    let settings = args.settings.resolve()?;
    let tool = terraform_tool(&settings);

    let graph = GenerationRun::new(settings, Arc::new(tool))
        .load_dependency_map()
        .await
        .context("Failed to load dependency graph")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
    } else {
        println!("📦 {} modules", graph.len());
        println!();
        print!("{}", graph);
    }
    Ok(true)
}
