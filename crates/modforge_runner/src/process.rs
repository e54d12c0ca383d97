//! Local subprocess runner.
//!
//! Spawns the program directly with tokio, captures stdout and stderr on
//! background tasks and enforces the configured timeout. When a child is
//! killed for running too long, the output it produced so far is returned in
//! [`RunnerError::Timeout`].

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{CommandConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Runner that executes commands as local child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Environment applied to every command before its own overrides.
    base_env: Vec<(String, String)>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment variable applied to every spawned command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_env.push((key.into(), value.into()));
        self
    }

    fn build_command(&self, config: &CommandConfig) -> RunnerResult<Command> {
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args);

        if let Some(workdir) = &config.workdir {
            if !workdir.is_dir() {
                return Err(RunnerError::InvalidWorkdir(workdir.display().to_string()));
            }
            cmd.current_dir(workdir);
        }

        for (key, value) in &self.base_env {
            cmd.env(key, value);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Ok(cmd)
    }

    /// Read a pipe to EOF into a shared buffer so partial output survives an
    /// abandoned read.
    fn spawn_reader<R>(reader: Option<R>, buffer: SharedBuffer) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let Some(mut reader) = reader else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        debug!("Stopped reading child output: {}", e);
                        break;
                    }
                }
            }
        })
    }

    async fn drain(handle: JoinHandle<()>, limit: Option<Duration>) {
        match limit {
            Some(limit) => {
                if tokio::time::timeout(limit, handle).await.is_err() {
                    warn!("Output pipe still open after {:?}, keeping partial output", limit);
                }
            }
            None => {
                let _ = handle.await;
            }
        }
    }

    fn take(buffer: &SharedBuffer) -> String {
        String::from_utf8_lossy(&buffer.lock()).into_owned()
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn is_available(&self, program: &str) -> RunnerResult<bool> {
        let status = Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        Ok(status.map(|s| s.success()).unwrap_or(false))
    }

    async fn run(
        &self,
        config: &CommandConfig,
        run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        let mut cmd = self.build_command(config)?;
        debug!("Executing: {}", config.display());

        let started_at = Utc::now();
        let start = Instant::now();

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError::ProgramNotAvailable(config.program.clone())
            } else {
                RunnerError::ExecutionFailed(format!("Failed to spawn {}: {}", config.program, e))
            }
        })?;

        let stdout_buf = SharedBuffer::default();
        let stderr_buf = SharedBuffer::default();
        let stdout_task = Self::spawn_reader(child.stdout.take(), stdout_buf.clone());
        let stderr_task = Self::spawn_reader(child.stderr.take(), stderr_buf.clone());

        let status = if run_config.timeout_seconds == 0 {
            Some(child.wait().await?)
        } else {
            let limit = Duration::from_secs(run_config.timeout_seconds);
            match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    warn!(
                        "{} exceeded {}s timeout, killing it",
                        config.display(),
                        run_config.timeout_seconds
                    );
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill timed-out process: {}", e);
                    }
                    None
                }
            }
        };

        // A grandchild can inherit the pipes and keep them open after a kill,
        // so draining is bounded once the timeout path was taken.
        let drain_limit = status
            .is_none()
            .then(|| Duration::from_secs(run_config.drain_seconds));
        Self::drain(stdout_task, drain_limit).await;
        Self::drain(stderr_task, drain_limit).await;

        let stdout = Self::take(&stdout_buf);
        let stderr = Self::take(&stderr_buf);

        let Some(status) = status else {
            return Err(RunnerError::Timeout {
                command: config.display(),
                seconds: run_config.timeout_seconds,
                stdout,
                stderr,
            });
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let exit_code = status.code().map(i64::from).unwrap_or(-1);
        debug!("{} exited with {} in {}ms", config.program, exit_code, duration_ms);

        Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        })
    }
}
