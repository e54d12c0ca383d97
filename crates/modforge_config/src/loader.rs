//! Project configuration loading.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ConfigError, ConfigResult};
use crate::models::ProjectConfig;

/// Loads every project document from a configuration directory.
pub struct ConfigLoader {
    configs_path: PathBuf,
}

impl ConfigLoader {
    /// Create a new loader.
    pub fn new(configs_path: impl Into<PathBuf>) -> Self {
        Self {
            configs_path: configs_path.into(),
        }
    }

    /// Load all `*.yaml` / `*.yml` documents directly inside the directory,
    /// in file-name order.
    ///
    /// Documents that fail to parse are logged and skipped.
    pub fn load_all(&self) -> ConfigResult<Vec<ProjectConfig>> {
        if !self.configs_path.is_dir() {
            return Err(ConfigError::NotFound(self.configs_path.clone()));
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&self.configs_path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && is_yaml(p))
            .collect();
        files.sort();

        if files.is_empty() {
            warn!("No YAML files found in {:?}", self.configs_path);
        }

        let mut configs = Vec::with_capacity(files.len());
        for path in files {
            match Self::load_file(&path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", file_name(&path));
                    configs.push(config);
                }
                Err(e) => {
                    warn!("Failed to load {:?}: {}", file_name(&path), e);
                }
            }
        }

        Ok(configs)
    }

    /// Load a single project document.
    pub fn load_file(path: impl AsRef<Path>) -> ConfigResult<ProjectConfig> {
        let path = path.as_ref();
        debug!("Reading project configuration from {:?}", path);

        let content = fs::read_to_string(path)?;
        let mut config =
            ProjectConfig::from_yaml_str(&content).map_err(|e| ConfigError::InvalidDocument {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.source_file = Some(path.to_path_buf());
        Ok(config)
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext == "yaml" || ext == "yml")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_loader_empty_dir() {
        let temp = tempdir().unwrap();
        let loader = ConfigLoader::new(temp.path());
        assert!(loader.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_loader_missing_dir() {
        let loader = ConfigLoader::new("/does/not/exist/configs");
        assert!(matches!(loader.load_all(), Err(ConfigError::NotFound(_))));
    }
}
