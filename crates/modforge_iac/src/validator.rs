//! Dependency validation of module selections.

use std::collections::BTreeSet;
use std::fmt;

use modforge_config::SelectedModules;
use serde::Serialize;
use tracing::warn;

use crate::graph::DependencyMap;

/// A selected module whose dependency was not selected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MissingDependency {
    pub module: String,
    pub dependency: String,
}

impl fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Module '{}' requires '{}' to be selected",
            self.module, self.dependency
        )
    }
}

/// Outcome of validating one selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Sorted by module, then dependency.
    pub errors: Vec<MissingDependency>,
    /// Selected modules the graph knows nothing about.
    pub unknown_modules: Vec<String>,
}

impl ValidationResult {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.unknown_modules
            .iter()
            .map(|m| format!("Module '{}' not found in dependency graph", m))
            .collect()
    }
}

/// Checks that every dependency of a selected module is also selected.
pub struct DependencyValidator<'a> {
    graph: &'a DependencyMap,
}

impl<'a> DependencyValidator<'a> {
    pub fn new(graph: &'a DependencyMap) -> Self {
        Self { graph }
    }

    pub fn validate(&self, selection: &SelectedModules) -> ValidationResult {
        self.validate_names(selection.names())
    }

    /// Validate a set of selected module names.
    ///
    /// Modules missing from the graph produce a warning and no error.
    pub fn validate_names<'n, I>(&self, names: I) -> ValidationResult
    where
        I: IntoIterator<Item = &'n str>,
    {
        let selected: BTreeSet<&str> = names.into_iter().collect();
        let mut result = ValidationResult::default();

        for module in &selected {
            let Some(deps) = self.graph.dependencies(module) else {
                warn!("Module '{}' not found in dependency graph", module);
                result.unknown_modules.push(module.to_string());
                continue;
            };
            for dep in deps {
                if !selected.contains(dep.as_str()) {
                    result.errors.push(MissingDependency {
                        module: module.to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        result.errors.sort();
        result.valid = result.errors.is_empty();
        result
    }
}
