//! CLI command definitions.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use modforge_config::Settings;
use modforge_iac::{ProjectReport, TerraformTool};
use modforge_runner::ProcessRunner;

pub mod check;
pub mod generate;
pub mod graph;

/// modforge - Terraform project generation from a shared module template
#[derive(Parser)]
#[command(name = "modforge")]
#[command(version, about = "Generate Terraform projects from a shared module template")]
#[command(long_about = r#"
modforge reads one YAML configuration per project, checks the selected
modules against the template's dependency graph and writes a reduced copy
of the template for every project, followed by terraform init and plan.

COMMANDS:
  generate  → Generate every configured project (default)
  graph     → Print the module dependency map of the template
  check     → Validate module selections without writing anything

EXIT CODES:
  0 - Every project succeeded
  1 - A project failed or the run was aborted
  2 - Invalid arguments
"#)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub generate: generate::GenerateArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate every configured project
    Generate(generate::GenerateArgs),

    /// Print the module dependency map
    Graph(graph::GraphArgs),

    /// Validate module selections without writing anything
    Check(check::CheckArgs),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Settings file (defaults to ./modforge.toml when present)
    #[arg(long, env = "MODFORGE_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Directory of project configurations
    #[arg(long)]
    pub configs: Option<PathBuf>,

    /// Template directory containing main.tf and variables.tf
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Output root for generated projects
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Number of projects processed in parallel
    #[arg(long)]
    pub workers: Option<usize>,

    /// Timeout for each terraform invocation, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl SettingsArgs {
    /// Load settings and apply command-line overrides.
    pub fn resolve(&self) -> Result<Settings> {
        let mut settings = Settings::load_or_default(self.settings.as_deref())
            .context("Failed to load settings")?;

        if let Some(configs) = &self.configs {
            settings.configs_dir = configs.clone();
        }
        if let Some(template) = &self.template {
            settings.template_dir = template.clone();
        }
        if let Some(output) = &self.output {
            settings.output_dir = output.clone();
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            settings.tool_timeout_secs = timeout;
        }

        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

/// Terraform binding configured from `settings`.
pub fn terraform_tool(settings: &Settings) -> TerraformTool {
    TerraformTool::new(Arc::new(ProcessRunner::new()))
        .with_binary(&settings.terraform_bin)
        .with_timeout(settings.tool_timeout_secs)
}

/// Print one status line per project, plus any further errors and warnings.
pub fn print_reports(reports: &[ProjectReport]) {
    for report in reports {
        println!("{}", report.status_line());
        for error in report.errors.iter().skip(1) {
            println!("   - {}", error);
        }
        for warning in &report.warnings {
            println!("   ⚠️  {}", warning);
        }
    }
}
