//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur during runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Program not available: {0}")]
    ProgramNotAvailable(String),

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// The process was killed after exceeding its timeout. Output captured
    /// before the kill is preserved.
    #[error("Command timed out after {seconds} seconds: {command}")]
    Timeout {
        command: String,
        seconds: u64,
        stdout: String,
        stderr: String,
    },

    #[error("Invalid working directory: {0}")]
    InvalidWorkdir(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
