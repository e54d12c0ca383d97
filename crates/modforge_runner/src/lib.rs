//! # modforge_runner
//!
//! Subprocess execution wrapper for modforge.
//!
//! Every external tool invocation (graph export, init, plan) goes through the
//! [`CommandRunner`] trait so the rest of the workspace can be exercised
//! without a real binary on the `PATH`.
//!
//! # Features
//!
//! - **Process Runner**: tokio-based subprocess execution with captured output
//! - **Timeouts**: child processes are killed when they exceed their timeout,
//!   and whatever they printed before that is kept
//! - **Mock Runner**: scripted responses and call capture for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use modforge_runner::{CommandConfig, CommandRunner, ProcessRunner, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::new();
//!
//!     let config = CommandConfig::new("terraform")
//!         .arg("version")
//!         .workdir(".");
//!
//!     let result = runner.run(&config, &RunConfig::default()).await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod process;
pub mod runner;

pub use config::{CommandConfig, RunConfig};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use process::ProcessRunner;
pub use runner::{CommandRunner, ExecutionResult};
