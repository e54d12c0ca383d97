//! Run settings loaded from `modforge.toml`.

use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};

/// Settings file looked up in the working directory when none is given.
pub const DEFAULT_SETTINGS_FILE: &str = "modforge.toml";

/// What to do when two selected modules set the same variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The module processed later (by name) overwrites earlier values.
    #[default]
    LastWins,
    /// The first value set is kept.
    FirstWins,
    /// Any collision with a different value fails the project.
    Error,
}

/// Textual rewrite applied to `source` lines of retained module blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSourceRewrite {
    /// Path token as written in the shared template.
    pub from: String,
    /// Replacement valid from inside a generated project directory. Derived
    /// from `template_dir` and `output_dir` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl Default for ModuleSourceRewrite {
    fn default() -> Self {
        Self {
            from: "./modules/".to_string(),
            to: None,
        }
    }
}

/// Settings of a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the shared template and its `modules/`.
    pub template_dir: PathBuf,
    /// Directory holding one YAML document per project.
    pub configs_dir: PathBuf,
    /// Root under which one directory per project is generated.
    pub output_dir: PathBuf,
    /// File name of the module template inside `template_dir`.
    pub main_template: String,
    /// File name of the variable template inside `template_dir`.
    pub variables_template: String,
    /// Provisioning tool binary.
    pub terraform_bin: String,
    /// Timeout for each tool invocation, in seconds (0 disables it).
    pub tool_timeout_secs: u64,
    /// Number of projects processed concurrently.
    pub workers: usize,
    /// Variables kept in every generated variables document.
    pub project_variables: Vec<String>,
    pub collision_policy: CollisionPolicy,
    pub module_source: ModuleSourceRewrite,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("."),
            configs_dir: PathBuf::from("configs"),
            output_dir: PathBuf::from("generated_projects"),
            main_template: "main.tf".to_string(),
            variables_template: "variables.tf".to_string(),
            terraform_bin: "terraform".to_string(),
            tool_timeout_secs: 900,
            workers: 4,
            project_variables: vec![
                "project_id".to_string(),
                "region".to_string(),
                "project_name".to_string(),
            ],
            collision_policy: CollisionPolicy::default(),
            module_source: ModuleSourceRewrite::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// Relative paths in the file are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        debug!("Reading settings from {:?}", path);

        let content = fs::read_to_string(path)?;
        let mut settings: Settings = toml::from_str(&content)?;

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            settings.resolve_relative_to(base);
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Load the given settings file, or `modforge.toml` when present, or
    /// fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_SETTINGS_FILE);
                if default_path.exists() {
                    info!("Using settings from {}", DEFAULT_SETTINGS_FILE);
                    Self::load(default_path)
                } else {
                    debug!("No {} found, using default settings", DEFAULT_SETTINGS_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidSettings("workers must be at least 1".to_string()));
        }
        if self.module_source.from.is_empty() {
            return Err(ConfigError::InvalidSettings(
                "module_source.from must not be empty".to_string(),
            ));
        }
        if self.main_template.is_empty() || self.variables_template.is_empty() {
            return Err(ConfigError::InvalidSettings(
                "template file names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn main_template_path(&self) -> PathBuf {
        self.template_dir.join(&self.main_template)
    }

    pub fn variables_template_path(&self) -> PathBuf {
        self.template_dir.join(&self.variables_template)
    }

    /// Replacement for `module_source.from` inside `<output_dir>/<project>`.
    ///
    /// An explicit `module_source.to` is returned as is. Otherwise the path
    /// from a project directory to `<template_dir>/<from>` is derived.
    pub fn module_source_target(&self) -> ConfigResult<String> {
        if let Some(to) = &self.module_source.to {
            return Ok(to.clone());
        }

        let cwd = env::current_dir()?;
        let modules = normalize_path(&cwd.join(&self.template_dir).join(&self.module_source.from));
        let output_root = normalize_path(&cwd.join(&self.output_dir));

        let mut target = match relative_path(&output_root, &modules) {
            Some(relative) if relative.is_empty() => "..".to_string(),
            Some(relative) => format!("../{}", relative),
            None => modules.to_string_lossy().replace('\\', "/"),
        };
        if self.module_source.from.ends_with('/') && !target.ends_with('/') {
            target.push('/');
        }
        debug!("Module sources rewritten to {}", target);
        Ok(target)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for dir in [&mut self.template_dir, &mut self.configs_dir, &mut self.output_dir] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            c => components.push(c),
        }
    }
    components.iter().collect()
}

/// `/`-separated path leading from directory `base` to `target`. Both must be
/// normalized absolute paths; `None` when they have different roots.
fn relative_path(base: &Path, target: &Path) -> Option<String> {
    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = target.components().collect();
    if base.first() != target.first() {
        return None;
    }

    let common = base.iter().zip(&target).take_while(|(a, b)| a == b).count();
    let parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(base.len() - common)
        .chain(
            target[common..]
                .iter()
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        )
        .collect();
    Some(parts.join("/"))
}
