//! Terraform invocation through a [`CommandRunner`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use modforge_runner::{CommandConfig, CommandRunner, RunConfig, RunnerError};

use crate::error::IacResult;

/// Captured outcome of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    /// The process was killed by the timeout; output is partial.
    pub timed_out: bool,
}

impl ToolOutput {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failed(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
            exit_code,
            ..Self::default()
        }
    }

    /// Failure transcript: `<label>\n\n<stderr>\n\n<stdout>`.
    pub fn failure_report(&self, label: &str) -> String {
        let mut stderr = self.stderr.clone();
        if self.timed_out {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str("(timed out, output is partial)");
        }
        format!("{}\n\n{}\n\n{}", label, stderr, self.stdout)
    }

    /// Short description of a failed invocation.
    pub fn failure_summary(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        match self.stderr.lines().map(str::trim).find(|line| !line.is_empty()) {
            Some(line) => format!("exit code {}: {}", self.exit_code, line),
            None => format!("exit code {}", self.exit_code),
        }
    }
}

/// The external provisioning operations a run needs.
#[async_trait]
pub trait ProvisioningTool: Send + Sync {
    /// Export the dependency graph of the configuration in `dir` as DOT text.
    async fn export_graph(&self, dir: &Path) -> IacResult<ToolOutput>;

    /// Initialize providers and modules in `dir`.
    async fn init(&self, dir: &Path) -> IacResult<ToolOutput>;

    /// Produce a plan for `dir`.
    async fn plan(&self, dir: &Path) -> IacResult<ToolOutput>;
}

/// [`ProvisioningTool`] backed by the `terraform` binary.
pub struct TerraformTool {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    run_config: RunConfig,
}

impl TerraformTool {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "terraform".to_string(),
            run_config: RunConfig::default(),
        }
    }

    /// Use a different binary name or path.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Per-invocation timeout in seconds.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.run_config = self.run_config.timeout(seconds);
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn run_command(&self, dir: &Path, args: &[&str]) -> IacResult<ToolOutput> {
        let config = CommandConfig::new(&self.binary)
            .args(args.iter().copied())
            .workdir(dir)
            .env("TF_IN_AUTOMATION", "1");

        debug!("Executing {} in {}", config.display(), dir.display());

        match self.runner.run(&config, &self.run_config).await {
            Ok(result) => Ok(ToolOutput {
                success: result.success(),
                stdout: result.stdout,
                stderr: result.stderr,
                exit_code: result.exit_code,
                timed_out: false,
            }),
            Err(RunnerError::Timeout {
                command,
                seconds,
                stdout,
                stderr,
            }) => {
                warn!("{} timed out after {}s", command, seconds);
                Ok(ToolOutput {
                    success: false,
                    stdout,
                    stderr,
                    exit_code: -1,
                    timed_out: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ProvisioningTool for TerraformTool {
    async fn export_graph(&self, dir: &Path) -> IacResult<ToolOutput> {
        info!("Running terraform graph in {}", dir.display());
        self.run_command(dir, &["graph"]).await
    }

    async fn init(&self, dir: &Path) -> IacResult<ToolOutput> {
        info!("Running terraform init in {}", dir.display());
        self.run_command(dir, &["init", "-input=false", "-no-color"]).await
    }

    async fn plan(&self, dir: &Path) -> IacResult<ToolOutput> {
        info!("Running terraform plan in {}", dir.display());
        self.run_command(dir, &["plan", "-input=false", "-no-color"]).await
    }
}
