//! Dependency lookup, cycle detection and reporting.
//!
//! The recursive "enable what is missing" walk lives in the controller; this
//! module answers what a unit needs and whether the graph is sound.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use stackvo_core::{DependencyBook, UnitKind, UnitName};

use crate::error::OrchestratorError;
use crate::registry::Registry;

/// Reads dependency specifications on every operation so edits to the file
/// apply without a restart.
pub struct DependencyResolver {
    path: PathBuf,
}

impl DependencyResolver {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The current book. Malformed JSON is logged and treated as empty.
    pub fn load(&self) -> DependencyBook {
        match DependencyBook::load_at(&self.path) {
            Ok(book) => book,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring dependency file");
                DependencyBook::default()
            }
        }
    }

    /// Required and optional dependencies of `name` with their live state.
    pub async fn report(&self, registry: &Registry, name: &UnitName) -> DependencyReport {
        let spec = self.load().spec(name);

        let mut required = Vec::with_capacity(spec.required.len());
        for dep in spec.required {
            let running = registry.is_running(UnitKind::Service, &dep).await;
            required.push(DependencyState { name: dep, running });
        }
        let mut optional = Vec::with_capacity(spec.optional.len());
        for dep in spec.optional {
            let running = registry.is_running(UnitKind::Service, &dep).await;
            optional.push(DependencyState { name: dep, running });
        }

        DependencyReport {
            unit: name.clone(),
            has_unmet_dependencies: required.iter().any(|d| !d.running),
            required,
            optional,
            internal: spec.internal,
            description: spec.description,
        }
    }
}

/// Fail with [`OrchestratorError::DependencyCycle`] if following `required`
/// edges from `root` ever revisits a unit on the active path.
pub fn check_acyclic(book: &DependencyBook, root: &UnitName) -> Result<(), OrchestratorError> {
    let mut path = Vec::new();
    let mut finished = HashSet::new();
    visit(book, root, &mut path, &mut finished)
}

fn visit(
    book: &DependencyBook,
    name: &UnitName,
    path: &mut Vec<UnitName>,
    finished: &mut HashSet<UnitName>,
) -> Result<(), OrchestratorError> {
    if let Some(start) = path.iter().position(|n| n == name) {
        let mut cycle = path[start..].to_vec();
        cycle.push(name.clone());
        return Err(OrchestratorError::DependencyCycle { path: cycle });
    }
    if finished.contains(name) {
        return Ok(());
    }

    path.push(name.clone());
    for dep in book.spec(name).required {
        visit(book, &dep, path, finished)?;
    }
    path.pop();
    finished.insert(name.clone());
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyState {
    pub name: UnitName,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub unit: UnitName,
    pub required: Vec<DependencyState>,
    pub optional: Vec<DependencyState>,
    pub internal: Vec<String>,
    pub description: String,
    pub has_unmet_dependencies: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackvo_core::DependencySpec;

    fn book(edges: &[(&str, &[&str])]) -> DependencyBook {
        let mut book = DependencyBook::default();
        for (name, required) in edges {
            book.insert(
                *name,
                DependencySpec {
                    required: required.iter().map(|r| UnitName::from(*r)).collect(),
                    ..Default::default()
                },
            );
        }
        book
    }

    #[test]
    fn chain_without_cycle_passes() {
        let b = book(&[("kibana", &["elasticsearch"]), ("elasticsearch", &[])]);
        check_acyclic(&b, &UnitName::from("kibana")).expect("acyclic");
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let b = book(&[("app", &["cache", "queue"]), ("queue", &["cache"])]);
        check_acyclic(&b, &UnitName::from("app")).expect("acyclic");
    }

    #[test]
    fn cycle_reports_active_path() {
        let b = book(&[("a", &["b"]), ("b", &["c"]), ("c", &["b"])]);
        let err = check_acyclic(&b, &UnitName::from("a")).unwrap_err();
        match err {
            OrchestratorError::DependencyCycle { path } => {
                let names: Vec<_> = path.iter().map(UnitName::as_str).collect();
                assert_eq!(names, ["b", "c", "b"]);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let b = book(&[("loop", &["loop"])]);
        assert!(check_acyclic(&b, &UnitName::from("loop")).is_err());
    }

    #[test]
    fn malformed_file_loads_as_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("deps.json");
        std::fs::write(&path, "[").unwrap();
        assert!(DependencyResolver::new(path).load().is_empty());
    }
}
