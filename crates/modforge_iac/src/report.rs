//! Per-project reports and the run summary.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{IacError, IacResult};

/// File name of the run summary inside the output root.
pub const REPORT_FILE: &str = "modforge-report.json";

/// Terminal status of a project.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Not processed yet
    #[default]
    Pending,
    /// All artifacts written and the plan succeeded
    Succeeded,
    /// Refused before anything was written
    Rejected,
    /// Failed while writing or running the tool
    Failed,
    /// Never started because the run was cancelled
    Cancelled,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Pipeline stage of a project.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Selecting,
    Validating,
    Preparing,
    Writing,
    Initializing,
    Planning,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Selecting => "selecting",
            Self::Validating => "validating",
            Self::Preparing => "preparing",
            Self::Writing => "writing",
            Self::Initializing => "initializing",
            Self::Planning => "planning",
        };
        f.write_str(label)
    }
}

/// Why a project stopped, and where.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub status: ProjectStatus,
    pub error: IacError,
}

impl StageFailure {
    pub fn rejected(stage: Stage, error: IacError) -> Self {
        Self {
            stage,
            status: ProjectStatus::Rejected,
            error,
        }
    }

    pub fn failed(stage: Stage, error: IacError) -> Self {
        Self {
            stage,
            status: ProjectStatus::Failed,
            error,
        }
    }
}

/// Outcome of processing one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectReport {
    pub project_name: String,
    pub source_file: Option<PathBuf>,
    pub status: ProjectStatus,
    /// Last stage entered
    pub stage: Stage,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub artifacts: Vec<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProjectReport {
    pub fn new(project_name: impl Into<String>, source_file: Option<PathBuf>) -> Self {
        Self {
            project_name: project_name.into(),
            source_file,
            status: ProjectStatus::Pending,
            stage: Stage::Selecting,
            errors: Vec::new(),
            warnings: Vec::new(),
            output_dir: None,
            artifacts: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark the report as started.
    pub fn start(mut self) -> Self {
        self.started_at = Some(Utc::now());
        self
    }

    pub fn enter(&mut self, stage: Stage) {
        debug!("[{}] {}", self.project_name, stage);
        self.stage = stage;
    }

    pub fn succeed(&mut self) {
        self.status = ProjectStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    /// Record a failure. Validation failures contribute one error per
    /// missing dependency.
    pub fn fail(&mut self, failure: StageFailure) {
        self.stage = failure.stage;
        self.status = failure.status;
        match failure.error {
            IacError::Validation(missing) => {
                self.errors.extend(missing.iter().map(ToString::to_string));
            }
            other => self.errors.push(other.to_string()),
        }
        self.finished_at = Some(Utc::now());
    }

    /// Report for a project that was never started.
    pub fn cancelled(project_name: impl Into<String>, source_file: Option<PathBuf>) -> Self {
        let mut report = Self::new(project_name, source_file);
        report.status = ProjectStatus::Cancelled;
        report.errors.push("Run cancelled before the project started".to_string());
        report
    }

    /// Report for a configuration reusing an earlier project name.
    pub fn duplicate(project_name: impl Into<String>, source_file: Option<PathBuf>) -> Self {
        let project_name = project_name.into();
        let mut report = Self::new(project_name.clone(), source_file).start();
        report.fail(StageFailure::rejected(
            Stage::Preparing,
            IacError::DuplicateProject(project_name),
        ));
        report
    }

    pub fn is_success(&self) -> bool {
        self.status == ProjectStatus::Succeeded
    }

    /// One-line status for terminal output.
    pub fn status_line(&self) -> String {
        match self.status {
            ProjectStatus::Succeeded => format!("✅ {}", self.project_name),
            ProjectStatus::Cancelled => format!("⏭️  {} (cancelled)", self.project_name),
            status => format!(
                "❌ {} ({} at {}): {}",
                self.project_name,
                status,
                self.stage,
                self.errors.first().map(String::as_str).unwrap_or("unknown error")
            ),
        }
    }
}

/// Summary of a whole run, written as JSON into the output root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// In input order
    pub projects: Vec<ProjectReport>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            projects: Vec::new(),
        }
    }

    pub fn finish(mut self, projects: Vec<ProjectReport>) -> Self {
        self.projects = projects;
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn succeeded(&self) -> usize {
        self.projects.iter().filter(|p| p.is_success()).count()
    }

    pub fn total(&self) -> usize {
        self.projects.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.total()
    }

    /// Write the summary into `output_dir` and return its path.
    pub fn save(&self, output_dir: &Path) -> IacResult<PathBuf> {
        fs::create_dir_all(output_dir)?;
        let path = output_dir.join(REPORT_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        debug!("Saved run report to {}", path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> IacResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
