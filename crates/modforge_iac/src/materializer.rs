//! Per-project pipeline: select, validate, write, init and plan.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{error, info, warn};

use modforge_config::{ProjectConfig, SelectedModules, Settings};

use crate::error::{IacError, IacResult};
use crate::filter::{needed_variables, SourceRewrite, TemplateFilter};
use crate::graph::DependencyMap;
use crate::report::{ProjectReport, ProjectStatus, Stage, StageFailure};
use crate::template::TemplateSet;
use crate::terraform::{ProvisioningTool, ToolOutput};
use crate::tfvars::VariableSerializer;
use crate::validator::DependencyValidator;

pub const MAIN_FILE: &str = "main.tf";
pub const VARIABLES_FILE: &str = "variables.tf";
pub const TFVARS_FILE: &str = "terraform.tfvars";
pub const PLAN_FILE: &str = "plan.txt";

/// Turns one project configuration into a planned project directory.
pub struct ProjectMaterializer {
    settings: Arc<Settings>,
    templates: Arc<TemplateSet>,
    graph: Arc<DependencyMap>,
    tool: Arc<dyn ProvisioningTool>,
    module_filter: TemplateFilter,
    variable_filter: TemplateFilter,
    serializer: VariableSerializer,
    overwrite: bool,
}

impl ProjectMaterializer {
    pub fn new(
        settings: Arc<Settings>,
        templates: Arc<TemplateSet>,
        graph: Arc<DependencyMap>,
        tool: Arc<dyn ProvisioningTool>,
    ) -> IacResult<Self> {
        let rewrite = SourceRewrite::new(
            settings.module_source.from.clone(),
            settings.module_source_target()?,
        );
        let module_filter = TemplateFilter::modules()?.with_source_rewrite(rewrite);
        let serializer = VariableSerializer::new(settings.collision_policy);
        Ok(Self {
            settings,
            templates,
            graph,
            tool,
            module_filter,
            variable_filter: TemplateFilter::variables()?,
            serializer,
            overwrite: false,
        })
    }

    /// Allow reusing existing project directories.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Directory a project is generated into.
    pub fn project_dir(&self, project: &ProjectConfig) -> PathBuf {
        self.settings.output_dir.join(&project.project_name)
    }

    /// Run the whole pipeline for `project`. Never fails; the outcome is in
    /// the returned report.
    pub async fn materialize(&self, project: &ProjectConfig) -> ProjectReport {
        let mut report = ProjectReport::new(&project.project_name, project.source_file.clone()).start();
        info!("Processing project: {}", project.label());

        match self.run_pipeline(project, &mut report).await {
            Ok(()) => {
                report.succeed();
                info!("Project {} generated successfully", project.project_name);
            }
            Err(failure) => {
                match failure.status {
                    ProjectStatus::Rejected => warn!(
                        "Project {} rejected at {}: {}",
                        project.project_name, failure.stage, failure.error
                    ),
                    _ => error!(
                        "Project {} failed at {}: {}",
                        project.project_name, failure.stage, failure.error
                    ),
                }
                report.fail(failure);
            }
        }
        report
    }

    async fn run_pipeline(
        &self,
        project: &ProjectConfig,
        report: &mut ProjectReport,
    ) -> Result<(), StageFailure> {
        let selection = select_and_validate(project, &self.graph, report)?;

        report.enter(Stage::Preparing);
        let dir = self.prepare_dir(project).await?;
        report.output_dir = Some(dir.clone());

        report.enter(Stage::Writing);
        self.write_artifacts(project, &selection, &dir, report)
            .await
            .map_err(|e| StageFailure::failed(Stage::Writing, e))?;

        report.enter(Stage::Initializing);
        let init = run_tool(self.tool.init(&dir).await);
        if !init.success {
            self.write_plan(&dir, &init.failure_report("INIT FAILED"), report)
                .await
                .map_err(|e| StageFailure::failed(Stage::Initializing, e))?;
            return Err(StageFailure::failed(
                Stage::Initializing,
                IacError::ToolInvocation {
                    operation: "init".to_string(),
                    message: init.failure_summary(),
                },
            ));
        }

        report.enter(Stage::Planning);
        let plan = run_tool(self.tool.plan(&dir).await);
        let transcript = if plan.success {
            plan.stdout.clone()
        } else {
            plan.failure_report("PLAN FAILED")
        };
        self.write_plan(&dir, &transcript, report)
            .await
            .map_err(|e| StageFailure::failed(Stage::Planning, e))?;
        if !plan.success {
            return Err(StageFailure::failed(
                Stage::Planning,
                IacError::ToolInvocation {
                    operation: "plan".to_string(),
                    message: plan.failure_summary(),
                },
            ));
        }

        Ok(())
    }

    async fn prepare_dir(&self, project: &ProjectConfig) -> Result<PathBuf, StageFailure> {
        project
            .validate_name()
            .map_err(|e| StageFailure::rejected(Stage::Preparing, e.into()))?;

        let root = &self.settings.output_dir;
        fs::create_dir_all(root)
            .await
            .map_err(|e| StageFailure::failed(Stage::Preparing, e.into()))?;

        let dir = self.project_dir(project);
        match fs::create_dir(&dir).await {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let is_dir = fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false);
                if !self.overwrite || !is_dir {
                    return Err(StageFailure::rejected(Stage::Preparing, IacError::Conflict(dir)));
                }
                warn!("Overwriting existing project directory {}", dir.display());
                match fs::remove_file(dir.join(PLAN_FILE)).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(StageFailure::failed(Stage::Preparing, e.into())),
                }
                Ok(dir)
            }
            Err(e) => Err(StageFailure::failed(Stage::Preparing, e.into())),
        }
    }

    async fn write_artifacts(
        &self,
        project: &ProjectConfig,
        selection: &SelectedModules,
        dir: &Path,
        report: &mut ProjectReport,
    ) -> IacResult<()> {
        let modules: BTreeSet<String> = selection.names().map(str::to_string).collect();
        let main = self
            .module_filter
            .filter(&self.templates.main, &modules)
            .map_err(|source| IacError::TemplateStructure {
                file: self.templates.main_path.display().to_string(),
                source,
            })?;

        let needed = needed_variables(&self.settings.project_variables, selection, &project.variables);
        let variables = self
            .variable_filter
            .filter(&self.templates.variables, &needed)
            .map_err(|source| IacError::TemplateStructure {
                file: self.templates.variables_path.display().to_string(),
                source,
            })?;

        let (tfvars, merged) = self.serializer.serialize(&project.variables, selection)?;
        report.warnings.extend(merged.warnings);

        for (name, content) in [(MAIN_FILE, main), (VARIABLES_FILE, variables), (TFVARS_FILE, tfvars)] {
            let path = dir.join(name);
            fs::write(&path, content).await?;
            report.artifacts.push(path);
        }
        Ok(())
    }

    async fn write_plan(&self, dir: &Path, content: &str, report: &mut ProjectReport) -> IacResult<()> {
        let path = dir.join(PLAN_FILE);
        fs::write(&path, content).await?;
        report.artifacts.push(path);
        Ok(())
    }
}

/// Run only the selection and validation stages for `project`.
pub fn check_project(project: &ProjectConfig, graph: &DependencyMap) -> ProjectReport {
    let mut report = ProjectReport::new(&project.project_name, project.source_file.clone()).start();
    match select_and_validate(project, graph, &mut report) {
        Ok(_) => report.succeed(),
        Err(failure) => report.fail(failure),
    }
    report
}

fn select_and_validate(
    project: &ProjectConfig,
    graph: &DependencyMap,
    report: &mut ProjectReport,
) -> Result<SelectedModules, StageFailure> {
    report.enter(Stage::Selecting);
    let selection = project.selected_modules();
    if selection.is_empty() {
        return Err(StageFailure::rejected(
            Stage::Selecting,
            IacError::EmptySelection(project.project_name.clone()),
        ));
    }

    report.enter(Stage::Validating);
    let validation = DependencyValidator::new(graph).validate(&selection);
    report.warnings.extend(validation.warnings());
    if !validation.valid {
        return Err(StageFailure::rejected(
            Stage::Validating,
            IacError::Validation(validation.errors),
        ));
    }
    Ok(selection)
}

/// Fold invocation errors into a failed output so they end up in `plan.txt`.
fn run_tool(result: IacResult<ToolOutput>) -> ToolOutput {
    result.unwrap_or_else(|e| ToolOutput::failed(-1, e.to_string()))
}
