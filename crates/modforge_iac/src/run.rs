//! Orchestration of a whole generation run.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use modforge_config::{ConfigLoader, ProjectConfig, Settings};

use crate::error::{IacError, IacResult};
use crate::graph::{DependencyMap, GraphExtractor};
use crate::materializer::{check_project, ProjectMaterializer};
use crate::report::{ProjectReport, RunSummary, StageFailure};
use crate::template::TemplateSet;
use crate::terraform::ProvisioningTool;

/// Shared flag that stops new projects from starting.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A generation run over every configuration in the configs directory.
pub struct GenerationRun {
    settings: Arc<Settings>,
    tool: Arc<dyn ProvisioningTool>,
    overwrite: bool,
    cancel: CancellationFlag,
}

impl GenerationRun {
    pub fn new(settings: Settings, tool: Arc<dyn ProvisioningTool>) -> Self {
        Self {
            settings: Arc::new(settings),
            tool,
            overwrite: false,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Make sure the template directory can be inspected, running
    /// `init` there once if it was never initialized.
    pub async fn prepare_template(&self) -> IacResult<()> {
        let dir = &self.settings.template_dir;
        if !dir.is_dir() {
            return Err(IacError::TemplateNotFound(dir.clone()));
        }
        let main = self.settings.main_template_path();
        if !main.is_file() {
            return Err(IacError::TemplateNotFound(main));
        }

        if !dir.join(".terraform").exists() {
            info!("Template directory {} is not initialized, running init", dir.display());
            let output = self.tool.init(dir).await?;
            if !output.success {
                return Err(IacError::ToolInvocation {
                    operation: "init".to_string(),
                    message: output.failure_summary(),
                });
            }
        }
        Ok(())
    }

    /// Export and parse the template's dependency graph.
    pub async fn load_dependency_map(&self) -> IacResult<DependencyMap> {
        self.prepare_template().await?;

        let output = self.tool.export_graph(&self.settings.template_dir).await?;
        if !output.success {
            return Err(IacError::ToolInvocation {
                operation: "graph".to_string(),
                message: output.failure_summary(),
            });
        }

        let graph = GraphExtractor::parse(&output.stdout)?;
        if graph.is_empty() {
            return Err(IacError::EmptyGraph);
        }
        info!("Loaded dependency graph with {} modules", graph.len());
        Ok(graph)
    }

    /// Load every project configuration; at least one is required.
    pub fn load_projects(&self) -> IacResult<Vec<ProjectConfig>> {
        let projects = ConfigLoader::new(&self.settings.configs_dir).load_all()?;
        if projects.is_empty() {
            return Err(IacError::NoConfigurations(self.settings.configs_dir.clone()));
        }
        info!("Found {} project configurations", projects.len());
        Ok(projects)
    }

    /// Generate every project. Errors are returned only for problems that
    /// affect the whole run; per-project outcomes are in the summary.
    pub async fn execute(&self) -> IacResult<RunSummary> {
        let summary = RunSummary::new();

        let projects = self.load_projects()?;
        let templates = TemplateSet::load(&self.settings)?;
        templates.check()?;
        let graph = self.load_dependency_map().await?;

        let reports = self
            .process(projects, Arc::new(templates), Arc::new(graph))
            .await?;
        let summary = summary.finish(reports);
        info!(
            "Run {} finished: {}/{} projects generated",
            summary.run_id,
            summary.succeeded(),
            summary.total()
        );
        Ok(summary)
    }

    /// Run the project pipelines on the worker pool. Reports come back in
    /// input order.
    pub async fn process(
        &self,
        projects: Vec<ProjectConfig>,
        templates: Arc<TemplateSet>,
        graph: Arc<DependencyMap>,
    ) -> IacResult<Vec<ProjectReport>> {
        let materializer = Arc::new(
            ProjectMaterializer::new(
                Arc::clone(&self.settings),
                templates,
                graph,
                Arc::clone(&self.tool),
            )?
            .with_overwrite(self.overwrite),
        );

        let labels: Vec<(String, Option<PathBuf>)> = projects
            .iter()
            .map(|p| (p.project_name.clone(), p.source_file.clone()))
            .collect();
        let duplicates = duplicate_indices(&projects);
        let mut slots: Vec<Option<ProjectReport>> = vec![None; projects.len()];

        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut tasks = JoinSet::new();

        for (index, project) in projects.into_iter().enumerate() {
            if duplicates.contains(&index) {
                warn!(
                    "Project name '{}' already used by another configuration, skipping {}",
                    project.project_name,
                    project.label()
                );
                slots[index] = Some(ProjectReport::duplicate(
                    project.project_name,
                    project.source_file,
                ));
                continue;
            }

            let materializer = Arc::clone(&materializer);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let permit = semaphore.acquire_owned().await;
                if permit.is_err() || cancel.is_cancelled() {
                    return (
                        index,
                        ProjectReport::cancelled(project.project_name, project.source_file),
                    );
                }
                let report = materializer.materialize(&project).await;
                drop(permit);
                (index, report)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => error!("Project task failed: {}", e),
            }
        }

        Ok(slots
            .into_iter()
            .zip(labels)
            .map(|(slot, (name, source))| {
                slot.unwrap_or_else(|| {
                    let mut report = ProjectReport::new(name, source).start();
                    report.fail(StageFailure::failed(
                        report.stage,
                        IacError::ToolInvocation {
                            operation: "pipeline".to_string(),
                            message: "project task aborted".to_string(),
                        },
                    ));
                    report
                })
            })
            .collect())
    }

    /// Validate every project's selection against the graph without
    /// writing anything.
    pub async fn check_projects(&self) -> IacResult<Vec<ProjectReport>> {
        let projects = self.load_projects()?;
        let graph = self.load_dependency_map().await?;
        let duplicates = duplicate_indices(&projects);

        Ok(projects
            .into_iter()
            .enumerate()
            .map(|(index, project)| {
                if duplicates.contains(&index) {
                    ProjectReport::duplicate(project.project_name, project.source_file)
                } else {
                    check_project(&project, &graph)
                }
            })
            .collect())
    }
}

/// Indices of configurations whose project name was already used by an
/// earlier configuration.
fn duplicate_indices(projects: &[ProjectConfig]) -> HashSet<usize> {
    let mut seen = HashSet::new();
    projects
        .iter()
        .enumerate()
        .filter(|(_, project)| !seen.insert(project.project_name.as_str()))
        .map(|(index, _)| index)
        .collect()
}
