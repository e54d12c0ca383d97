//! # modforge_iac
//!
//! Module dependency resolution and template materialization for modforge.
//!
//! A shared Terraform template declares every available module. For each
//! project configuration this crate checks the selected modules against the
//! template's dependency graph, writes a reduced copy of the template into
//! its own project directory and runs `init` and `plan` there.
//!
//! ## Features
//!
//! - DOT parsing of `terraform graph` output into a module dependency map
//! - Dependency validation of module selections
//! - Brace-aware filtering of `module` and `variable` blocks
//! - `terraform.tfvars` rendering with configurable collision handling
//! - Bounded parallel project pipelines with a JSON run report
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use modforge_config::Settings;
//! use modforge_iac::{GenerationRun, TerraformTool};
//! use modforge_runner::ProcessRunner;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load_or_default(None)?;
//!     let tool = TerraformTool::new(Arc::new(ProcessRunner::new()))
//!         .with_binary(&settings.terraform_bin)
//!         .with_timeout(settings.tool_timeout_secs);
//!
//!     let output_dir = settings.output_dir.clone();
//!     let summary = GenerationRun::new(settings, Arc::new(tool)).execute().await?;
//!     summary.save(&output_dir)?;
//!     println!("{}/{} projects generated", summary.succeeded(), summary.total());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod filter;
pub mod graph;
pub mod materializer;
pub mod report;
pub mod run;
pub mod scanner;
pub mod template;
pub mod terraform;
pub mod tfvars;
pub mod validator;

pub use error::{IacError, IacResult, TemplateStructureError};
pub use filter::{needed_variables, BlockKind, Segment, SourceRewrite, TemplateBlock, TemplateFilter};
pub use graph::{module_name, DependencyMap, GraphExtractor};
pub use materializer::{check_project, ProjectMaterializer, MAIN_FILE, PLAN_FILE, TFVARS_FILE, VARIABLES_FILE};
pub use report::{ProjectReport, ProjectStatus, RunSummary, Stage, StageFailure, REPORT_FILE};
pub use run::{CancellationFlag, GenerationRun};
pub use template::TemplateSet;
pub use terraform::{ProvisioningTool, TerraformTool, ToolOutput};
pub use tfvars::{parse_document, parse_value, render, render_value, MergedVariables, VariableSerializer};
pub use validator::{DependencyValidator, MissingDependency, ValidationResult};
