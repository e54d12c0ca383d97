//! Error types for IaC module.

use std::path::PathBuf;

use thiserror::Error;

use crate::validator::MissingDependency;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur during IaC operations.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Graph parse error at byte {offset}: {message}")]
    GraphParse { offset: usize, message: String },

    #[error("Dependency graph contains no modules")]
    EmptyGraph,

    #[error("Template not found: {0}")]
    TemplateNotFound(PathBuf),

    #[error("Template structure error in {file}: {source}")]
    TemplateStructure {
        file: String,
        #[source]
        source: TemplateStructureError,
    },

    #[error("No modules selected for project '{0}'")]
    EmptySelection(String),

    #[error("Dependency validation failed: {} missing dependencies", .0.len())]
    Validation(Vec<MissingDependency>),

    #[error("Project directory already exists: {} (use --overwrite to replace it)", .0.display())]
    Conflict(PathBuf),

    #[error("Project name '{0}' is used by more than one configuration")]
    DuplicateProject(String),

    #[error("Variable '{key}' is set by both '{first}' and '{second}'")]
    VariableConflict {
        key: String,
        first: String,
        second: String,
    },

    #[error("Terraform {operation} failed: {message}")]
    ToolInvocation { operation: String, message: String },

    #[error("Variable syntax error at byte {offset}: {message}")]
    VarsParse { offset: usize, message: String },

    #[error("No project configurations found in {0}")]
    NoConfigurations(PathBuf),

    #[error("Config error: {0}")]
    Config(#[from] modforge_config::ConfigError),

    #[error("Runner error: {0}")]
    Runner(#[from] modforge_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    Regex(#[from] regex::Error),
}

impl IacError {
    /// Whether the error invalidates the shared template or graph, which
    /// aborts a run before any project is processed.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            Self::GraphParse { .. }
                | Self::EmptyGraph
                | Self::TemplateNotFound(_)
                | Self::TemplateStructure { .. }
                | Self::NoConfigurations(_)
        )
    }
}

/// Structural problems found while scanning a template document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateStructureError {
    #[error("{keyword} \"{name}\" opened on line {line} is never closed")]
    UnterminatedBlock {
        keyword: String,
        name: String,
        line: usize,
    },

    #[error("{keyword} \"{name}\" on line {line} does not open a brace")]
    MissingOpenBrace {
        keyword: String,
        name: String,
        line: usize,
    },

    #[error("Unmatched closing brace on line {line}")]
    UnbalancedClose { line: usize },

    #[error("Brace group opened on line {line} is never closed")]
    UnterminatedGroup { line: usize },

    #[error("Heredoc <<{marker} opened on line {line} is never terminated")]
    UnterminatedHeredoc { marker: String, line: usize },

    #[error("Block comment opened on line {line} is never closed")]
    UnterminatedComment { line: usize },
}
