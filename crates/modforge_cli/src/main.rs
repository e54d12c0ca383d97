//! modforge CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Every project succeeded
//! - 1: At least one project failed, or the run was aborted
//! - 2: Invalid arguments
//! - 130: Interrupted twice during generation

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const FAILURE: u8 = 1;
    /// Reported by clap itself on usage errors.
    #[allow(dead_code)]
    pub const INVALID_ARGS: u8 = 2;
    pub const INTERRUPTED: u8 = 130;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Some(Commands::Generate(args)) => commands::generate::execute(args).await,
        Some(Commands::Graph(args)) => commands::graph::execute(args).await,
        Some(Commands::Check(args)) => commands::check::execute(args).await,
        None => commands::generate::execute(cli.generate).await,
    };

    match result {
        Ok(true) => ExitCode::from(ExitCodes::SUCCESS),
        Ok(false) => ExitCode::from(ExitCodes::FAILURE),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(ExitCodes::FAILURE)
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,modforge={}", level)));

    // Ignore the error when a subscriber is already installed.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}
