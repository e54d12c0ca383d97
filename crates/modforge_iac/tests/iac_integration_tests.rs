//! End-to-end tests for generation runs, using fake provisioning tools.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use modforge_config::Settings;
use modforge_iac::{
    CancellationFlag, GenerationRun, IacError, IacResult, ProjectStatus, ProvisioningTool, RunSummary,
    Stage, TerraformTool, ToolOutput, PLAN_FILE, REPORT_FILE, TFVARS_FILE,
};
use modforge_runner::{MockResponse, MockRunner};

const GRAPH: &str = r#"digraph {
	compound = "true"
	newrank = "true"
	subgraph "root" {
		"[root] module.network.google_compute_network.vpc (expand)" [label = "module.network.google_compute_network.vpc", shape = "box"]
		"[root] module.storage.google_storage_bucket.b (expand)" [label = "module.storage.google_storage_bucket.b", shape = "box"]
		"[root] module.compute.google_compute_instance.vm (expand)" -> "[root] module.network.google_compute_network.vpc (expand)"
	}
}
"#;

const MAIN_TF: &str = r#"provider "google" {
  project = var.project_id
  region  = var.region
}

module "network" {
  source     = "./modules/network"
  project_id = var.project_id
}

module "compute" {
  source       = "./modules/compute"
  machine_type = var.machine_type
  network      = module.network.id
}

module "storage" {
  source = "./modules/storage"
}
"#;

const VARIABLES_TF: &str = r#"variable "project_id" {
  type = string
}

variable "region" {
  type    = string
  default = "europe-west1"
}

variable "machine_type" {
  type = string
}

variable "bucket_name" {
  type = string
}
"#;

/// Records calls and answers from a script.
struct RecordingTool {
    graph: String,
    plan: ToolOutput,
    calls: Mutex<Vec<(String, PathBuf)>>,
}

impl RecordingTool {
    fn new(graph: &str) -> Self {
        Self {
            graph: graph.to_string(),
            plan: ToolOutput::succeeded("Plan: 3 to add, 0 to change, 0 to destroy."),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls_for(&self, operation: &str) -> Vec<PathBuf> {
        self.calls
            .lock()
            .iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, dir)| dir.clone())
            .collect()
    }

    fn record(&self, operation: &str, dir: &Path) {
        self.calls.lock().push((operation.to_string(), dir.to_path_buf()));
    }
}

#[async_trait]
impl ProvisioningTool for RecordingTool {
    async fn export_graph(&self, dir: &Path) -> IacResult<ToolOutput> {
        self.record("graph", dir);
        Ok(ToolOutput::succeeded(self.graph.clone()))
    }

    async fn init(&self, dir: &Path) -> IacResult<ToolOutput> {
        self.record("init", dir);
        Ok(ToolOutput::succeeded("Terraform has been successfully initialized!"))
    }

    async fn plan(&self, dir: &Path) -> IacResult<ToolOutput> {
        self.record("plan", dir);
        Ok(self.plan.clone())
    }
}

struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("main.tf"), MAIN_TF).unwrap();
        fs::write(root.join("variables.tf"), VARIABLES_TF).unwrap();
        fs::create_dir_all(root.join(".terraform")).unwrap();
        fs::create_dir_all(root.join("configs")).unwrap();
        Self { temp }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn add_config(&self, file: &str, content: &str) {
        fs::write(self.root().join("configs").join(file), content).unwrap();
    }

    fn settings(&self) -> Settings {
        Settings {
            template_dir: self.root().to_path_buf(),
            configs_dir: self.root().join("configs"),
            output_dir: self.root().join("generated_projects"),
            workers: 2,
            ..Settings::default()
        }
    }

    fn project_dir(&self, name: &str) -> PathBuf {
        self.root().join("generated_projects").join(name)
    }
}

const WEB_APP: &str = r#"
project_name: web-app
modules:
  network:
    selected: true
    project_id: demo-123
    region: europe-west1
  compute:
    selected: true
    machine_type: e2-small
  storage:
    selected: false
    bucket_name: unused
"#;

const BROKEN_DEPS: &str = r#"
project_name: broken
modules:
  compute:
    selected: true
    machine_type: e2-small
"#;

#[tokio::test]
async fn test_full_run_generates_projects() {
    let ws = Workspace::new();
    ws.add_config("a_web.yaml", WEB_APP);
    ws.add_config("b_broken.yml", BROKEN_DEPS);
    let tool = Arc::new(RecordingTool::new(GRAPH));

    let summary = GenerationRun::new(ws.settings(), tool.clone())
        .execute()
        .await
        .unwrap();

    assert_eq!(summary.total(), 2);
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.projects[0].project_name, "web-app");
    assert_eq!(summary.projects[0].status, ProjectStatus::Succeeded);
    assert_eq!(summary.projects[1].status, ProjectStatus::Rejected);
    assert_eq!(
        summary.projects[1].errors,
        vec!["Module 'compute' requires 'network' to be selected"]
    );

    let dir = ws.project_dir("web-app");
    let main = fs::read_to_string(dir.join("main.tf")).unwrap();
    assert!(main.starts_with("provider \"google\" {"));
    assert!(main.contains("source     = \"../../modules/network\""));
    assert!(main.contains("source       = \"../../modules/compute\""));
    assert!(!main.contains("module \"storage\""));

    let variables = fs::read_to_string(dir.join("variables.tf")).unwrap();
    assert!(variables.contains("variable \"machine_type\""));
    assert!(variables.contains("variable \"region\""));
    assert!(!variables.contains("bucket_name"));

    assert_eq!(
        fs::read_to_string(dir.join(TFVARS_FILE)).unwrap(),
        "machine_type = \"e2-small\"\nproject_id = \"demo-123\"\nregion = \"europe-west1\""
    );
    assert!(fs::read_to_string(dir.join(PLAN_FILE)).unwrap().starts_with("Plan: 3 to add"));
    assert!(!ws.project_dir("broken").exists());

    // Template already initialized: init only ran for the generated project.
    assert_eq!(tool.calls_for("init"), vec![dir.clone()]);
    assert_eq!(tool.calls_for("graph"), vec![ws.root().to_path_buf()]);
}

#[tokio::test]
async fn test_module_sources_follow_a_nested_output_dir() {
    let ws = Workspace::new();
    ws.add_config("a.yaml", WEB_APP);
    fs::create_dir_all(ws.root().join("modules").join("network")).unwrap();
    let settings = Settings {
        output_dir: ws.root().join("out").join("nested"),
        ..ws.settings()
    };

    let summary = GenerationRun::new(settings, Arc::new(RecordingTool::new(GRAPH)))
        .execute()
        .await
        .unwrap();
    assert!(summary.projects[0].is_success());

    let dir = ws.root().join("out").join("nested").join("web-app");
    let main = fs::read_to_string(dir.join("main.tf")).unwrap();
    assert!(main.contains("source     = \"../../../modules/network\""));
    assert!(dir.join("../../../modules/network").is_dir());
}

#[tokio::test]
async fn test_existing_directory_does_not_stop_the_run() {
    let ws = Workspace::new();
    ws.add_config("a.yaml", WEB_APP);
    ws.add_config(
        "b.yaml",
        "project_name: second\nmodules:\n  network:\n    selected: true\n",
    );
    fs::create_dir_all(ws.project_dir("web-app")).unwrap();

    let summary = GenerationRun::new(ws.settings(), Arc::new(RecordingTool::new(GRAPH)))
        .execute()
        .await
        .unwrap();

    assert_eq!(summary.projects[0].status, ProjectStatus::Rejected);
    assert_eq!(summary.projects[0].stage, Stage::Preparing);
    assert_eq!(summary.projects[1].status, ProjectStatus::Succeeded);
    assert!(!ws.project_dir("web-app").join("main.tf").exists());

    let summary = GenerationRun::new(ws.settings(), Arc::new(RecordingTool::new(GRAPH)))
        .with_overwrite(true)
        .execute()
        .await
        .unwrap();
    assert!(summary.projects[0].is_success());
    assert!(ws.project_dir("web-app").join("main.tf").exists());
}

#[tokio::test]
async fn test_duplicate_project_names() {
    let ws = Workspace::new();
    ws.add_config("a.yaml", WEB_APP);
    ws.add_config("b.yaml", WEB_APP);

    let summary = GenerationRun::new(ws.settings(), Arc::new(RecordingTool::new(GRAPH)))
        .execute()
        .await
        .unwrap();

    assert!(summary.projects[0].is_success());
    assert_eq!(summary.projects[1].status, ProjectStatus::Rejected);
    assert!(summary.projects[1].errors[0].contains("more than one configuration"));
}

#[tokio::test]
async fn test_cancelled_run_starts_nothing() {
    let ws = Workspace::new();
    ws.add_config("a.yaml", WEB_APP);
    let cancel = CancellationFlag::new();
    cancel.cancel();
    let tool = Arc::new(RecordingTool::new(GRAPH));

    let summary = GenerationRun::new(ws.settings(), tool.clone())
        .with_cancellation(cancel)
        .execute()
        .await
        .unwrap();

    assert_eq!(summary.projects[0].status, ProjectStatus::Cancelled);
    assert!(tool.calls_for("plan").is_empty());
    assert!(!ws.project_dir("web-app").exists());
}

#[tokio::test]
async fn test_run_level_failures() {
    // Unterminated block in the shared template.
    let ws = Workspace::new();
    ws.add_config("a.yaml", WEB_APP);
    fs::write(ws.root().join("main.tf"), "module \"network\" {\n  source = \"./modules/network\"\n").unwrap();
    let err = GenerationRun::new(ws.settings(), Arc::new(RecordingTool::new(GRAPH)))
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, IacError::TemplateStructure { .. }));
    assert!(err.is_fatal_for_run());

    // Graph without modules.
    let ws = Workspace::new();
    ws.add_config("a.yaml", WEB_APP);
    let err = GenerationRun::new(ws.settings(), Arc::new(RecordingTool::new("digraph {}")))
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, IacError::EmptyGraph));

    // Unparseable graph.
    let err = GenerationRun::new(ws.settings(), Arc::new(RecordingTool::new("digraph {")))
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, IacError::GraphParse { .. }));

    // No configurations.
    let ws = Workspace::new();
    let err = GenerationRun::new(ws.settings(), Arc::new(RecordingTool::new(GRAPH)))
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, IacError::NoConfigurations(_)));
}

#[tokio::test]
async fn test_uninitialized_template_is_initialized_first() {
    let ws = Workspace::new();
    fs::remove_dir_all(ws.root().join(".terraform")).unwrap();
    let tool = Arc::new(RecordingTool::new(GRAPH));

    let graph = GenerationRun::new(ws.settings(), tool.clone())
        .load_dependency_map()
        .await
        .unwrap();

    assert_eq!(tool.calls_for("init"), vec![ws.root().to_path_buf()]);
    assert_eq!(graph.modules().collect::<Vec<_>>(), vec!["compute", "network", "storage"]);
}

#[tokio::test]
async fn test_check_projects_writes_nothing() {
    let ws = Workspace::new();
    ws.add_config("a.yaml", WEB_APP);
    ws.add_config("b.yaml", BROKEN_DEPS);

    let reports = GenerationRun::new(ws.settings(), Arc::new(RecordingTool::new(GRAPH)))
        .check_projects()
        .await
        .unwrap();

    assert!(reports[0].is_success());
    assert_eq!(reports[1].status, ProjectStatus::Rejected);
    assert!(!ws.root().join("generated_projects").exists());
}

#[tokio::test]
async fn test_terraform_tool_over_mock_runner() {
    let ws = Workspace::new();
    ws.add_config("a.yaml", WEB_APP);
    let mock = MockRunner::new()
        .respond_to("graph", MockResponse::success(GRAPH))
        .respond_to("init", MockResponse::success("Initialized"))
        .respond_to("plan", MockResponse::failure(1, "Error: Invalid provider configuration"));
    let tool = TerraformTool::new(Arc::new(mock.clone())).with_timeout(60);

    let settings = ws.settings();
    let output_dir = settings.output_dir.clone();
    let summary = GenerationRun::new(settings, Arc::new(tool)).execute().await.unwrap();

    let report = &summary.projects[0];
    assert_eq!(report.status, ProjectStatus::Failed);
    assert_eq!(report.stage, Stage::Planning);
    assert_eq!(
        fs::read_to_string(ws.project_dir("web-app").join(PLAN_FILE)).unwrap(),
        "PLAN FAILED\n\nError: Invalid provider configuration\n\n"
    );
    assert_eq!(mock.get_subcommand_calls("plan")[0].timeout_seconds, 60);

    let path = summary.save(&output_dir).unwrap();
    assert_eq!(path, output_dir.join(REPORT_FILE));
    let saved = RunSummary::load(&path).unwrap();
    assert_eq!(saved.projects[0].status, ProjectStatus::Failed);
}
