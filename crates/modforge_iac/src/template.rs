//! The shared template document pair.

use std::fs;
use std::path::{Path, PathBuf};

use modforge_config::Settings;
use tracing::{debug, info};

use crate::error::{IacError, IacResult};
use crate::filter::TemplateFilter;

/// `main.tf` and `variables.tf` of the template directory, read once per run.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub main: String,
    pub variables: String,
    pub main_path: PathBuf,
    pub variables_path: PathBuf,
}

impl TemplateSet {
    /// Read both template documents named by `settings`.
    pub fn load(settings: &Settings) -> IacResult<Self> {
        let main_path = settings.main_template_path();
        let variables_path = settings.variables_template_path();

        for path in [&main_path, &variables_path] {
            if !path.is_file() {
                return Err(IacError::TemplateNotFound(path.clone()));
            }
        }

        let set = Self {
            main: fs::read_to_string(&main_path)?,
            variables: fs::read_to_string(&variables_path)?,
            main_path,
            variables_path,
        };
        debug!(
            "Loaded templates {} and {}",
            set.main_path.display(),
            set.variables_path.display()
        );
        Ok(set)
    }

    /// Build a set from in-memory documents.
    pub fn from_strings(main: impl Into<String>, variables: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            variables: variables.into(),
            main_path: PathBuf::from("main.tf"),
            variables_path: PathBuf::from("variables.tf"),
        }
    }

    /// Scan both documents for structural problems.
    pub fn check(&self) -> IacResult<()> {
        let modules = Self::count_blocks(TemplateFilter::modules()?, &self.main, &self.main_path)?;
        let variables =
            Self::count_blocks(TemplateFilter::variables()?, &self.variables, &self.variables_path)?;
        info!(
            "Template structure OK: {} module blocks, {} variable blocks",
            modules, variables
        );
        Ok(())
    }

    fn count_blocks(filter: TemplateFilter, content: &str, path: &Path) -> IacResult<usize> {
        filter
            .blocks(content)
            .map(|blocks| blocks.len())
            .map_err(|source| IacError::TemplateStructure {
                file: path.display().to_string(),
                source,
            })
    }
}
