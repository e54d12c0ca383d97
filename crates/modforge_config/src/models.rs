//! Project configuration documents.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::{ConfigError, ConfigResult};
use crate::value::{scalar_key, ConfigValue};

/// Name used when a document omits `project_name`.
pub const DEFAULT_PROJECT_NAME: &str = "unnamed-project";

/// Key holding the selection flag inside a module entry.
pub const SELECTED_KEY: &str = "selected";

/// Configuration of one module inside a project document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleConfig {
    /// Whether the module is part of the project.
    pub selected: bool,
    /// Variable values, without the `selected` flag.
    pub variables: BTreeMap<String, ConfigValue>,
}

impl ModuleConfig {
    pub fn new(selected: bool) -> Self {
        Self {
            selected,
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    fn from_yaml(module: &str, value: Value) -> ConfigResult<Self> {
        let mapping = match value {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(mapping) => mapping,
            other => {
                return Err(ConfigError::UnsupportedValue {
                    key: format!("modules.{}", module),
                    reason: format!("expected a mapping, found {}", yaml_kind(&other)),
                })
            }
        };

        let mut config = Self::default();
        for (key, value) in mapping {
            let name = scalar_key(&key).ok_or_else(|| ConfigError::UnsupportedValue {
                key: format!("modules.{}", module),
                reason: "variable names must be scalars".to_string(),
            })?;
            if name == SELECTED_KEY {
                config.selected = match value {
                    Value::Bool(b) => b,
                    _ => {
                        return Err(ConfigError::InvalidSelected {
                            module: module.to_string(),
                        })
                    }
                };
                continue;
            }
            let path = format!("modules.{}.{}", module, name);
            config.variables.insert(name, ConfigValue::from_yaml(value, &path)?);
        }
        Ok(config)
    }
}

/// A project configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    pub project_name: String,
    /// All modules mentioned by the document, selected or not.
    pub modules: BTreeMap<String, ModuleConfig>,
    /// Project-wide variable values, applied before module variables.
    pub variables: BTreeMap<String, ConfigValue>,
    /// File the document was loaded from.
    pub source_file: Option<PathBuf>,
}

impl ProjectConfig {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            modules: BTreeMap::new(),
            variables: BTreeMap::new(),
            source_file: None,
        }
    }

    pub fn with_module(mut self, name: impl Into<String>, module: ModuleConfig) -> Self {
        self.modules.insert(name.into(), module);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let root: Value = serde_yaml::from_str(content)?;
        let mut root = match root {
            Value::Mapping(mapping) => mapping,
            Value::Null => Mapping::new(),
            other => {
                return Err(ConfigError::UnsupportedValue {
                    key: "<root>".to_string(),
                    reason: format!("expected a mapping, found {}", yaml_kind(&other)),
                })
            }
        };

        let project_name = match root.remove("project_name") {
            None | Some(Value::Null) => DEFAULT_PROJECT_NAME.to_string(),
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(ConfigError::UnsupportedValue {
                    key: "project_name".to_string(),
                    reason: format!("expected a string, found {}", yaml_kind(&other)),
                })
            }
        };

        let mut modules = BTreeMap::new();
        for (name, value) in section(root.remove("modules"), "modules")? {
            let config = ModuleConfig::from_yaml(&name, value)?;
            modules.insert(name, config);
        }

        let mut variables = BTreeMap::new();
        for (name, value) in section(root.remove("variables"), "variables")? {
            let path = format!("variables.{}", name);
            variables.insert(name, ConfigValue::from_yaml(value, &path)?);
        }

        Ok(Self {
            project_name,
            modules,
            variables,
            source_file: None,
        })
    }

    /// Modules whose `selected` flag is true.
    pub fn selected_modules(&self) -> SelectedModules {
        let modules = self
            .modules
            .iter()
            .filter(|(_, config)| config.selected)
            .map(|(name, config)| (name.clone(), config.variables.clone()))
            .collect();
        SelectedModules { modules }
    }

    /// Check that the project name can be used as one output directory.
    pub fn validate_name(&self) -> ConfigResult<()> {
        let name = self.project_name.as_str();
        let mut components = Path::new(name).components();
        let single_normal = matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none();
        if name.trim().is_empty() || !single_normal || name.contains(['/', '\\']) {
            return Err(ConfigError::InvalidProjectName(name.to_string()));
        }
        Ok(())
    }

    /// Label used in logs: the project name plus its source file when known.
    pub fn label(&self) -> String {
        match self.source_file.as_ref().and_then(|p| p.file_name()) {
            Some(file) => format!("{} ({})", self.project_name, file.to_string_lossy()),
            None => self.project_name.clone(),
        }
    }
}

/// The modules selected by one project, with their variables.
///
/// Derived once per project; iteration is in module-name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectedModules {
    modules: BTreeMap<String, BTreeMap<String, ConfigValue>>,
}

impl SelectedModules {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn variables(&self, module: &str) -> Option<&BTreeMap<String, ConfigValue>> {
        self.modules.get(module)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, ConfigValue>)> {
        self.modules.iter().map(|(name, vars)| (name.as_str(), vars))
    }
}

impl<S: Into<String>> FromIterator<(S, BTreeMap<String, ConfigValue>)> for SelectedModules {
    fn from_iter<I: IntoIterator<Item = (S, BTreeMap<String, ConfigValue>)>>(iter: I) -> Self {
        Self {
            modules: iter.into_iter().map(|(name, vars)| (name.into(), vars)).collect(),
        }
    }
}

fn section(value: Option<Value>, name: &str) -> ConfigResult<Vec<(String, Value)>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Mapping(mapping)) => mapping
            .into_iter()
            .map(|(k, v)| {
                scalar_key(&k)
                    .map(|key| (key, v))
                    .ok_or_else(|| ConfigError::UnsupportedValue {
                        key: name.to_string(),
                        reason: "keys must be scalars".to_string(),
                    })
            })
            .collect(),
        Some(other) => Err(ConfigError::UnsupportedValue {
            key: name.to_string(),
            reason: format!("expected a mapping, found {}", yaml_kind(&other)),
        }),
    }
}

fn yaml_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
project_name: alpha
variables:
  region: europe-west1
modules:
  network:
    selected: true
    cidr: 10.0.0.0/16
  compute:
    selected: false
    size: 3
  storage:
"#;

    #[test]
    fn test_parse_project_document() {
        let project = ProjectConfig::from_yaml_str(DOC).unwrap();
        assert_eq!(project.project_name, "alpha");
        assert_eq!(project.modules.len(), 3);
        assert_eq!(project.variables["region"], ConfigValue::from("europe-west1"));

        let network = &project.modules["network"];
        assert!(network.selected);
        assert!(!network.variables.contains_key("selected"));
        assert_eq!(network.variables["cidr"], ConfigValue::from("10.0.0.0/16"));

        assert_eq!(project.modules["storage"], ModuleConfig::default());
    }

    #[test]
    fn test_selected_modules() {
        let project = ProjectConfig::from_yaml_str(DOC).unwrap();
        let selected = project.selected_modules();
        assert_eq!(selected.names().collect::<Vec<_>>(), vec!["network"]);
        assert!(!selected.contains("compute"));
    }

    #[test]
    fn test_default_project_name() {
        let project = ProjectConfig::from_yaml_str("modules: {}").unwrap();
        assert_eq!(project.project_name, DEFAULT_PROJECT_NAME);
    }

    #[test]
    fn test_non_boolean_selected() {
        let err = ProjectConfig::from_yaml_str("modules:\n  network:\n    selected: yes-please\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelected { module } if module == "network"));
    }

    #[test]
    fn test_validate_name() {
        assert!(ProjectConfig::new("alpha").validate_name().is_ok());
        assert!(ProjectConfig::new("team-a_prod.2").validate_name().is_ok());
        assert!(ProjectConfig::new("").validate_name().is_err());
        assert!(ProjectConfig::new("..").validate_name().is_err());
        assert!(ProjectConfig::new("a/b").validate_name().is_err());
        assert!(ProjectConfig::new("/abs").validate_name().is_err());
    }
}
