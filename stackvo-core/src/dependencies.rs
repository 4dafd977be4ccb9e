//! Per-unit dependency specifications.
//!
//! Loaded from a JSON document keyed by unit name:
//!
//! ```json
//! { "kafka": { "required": ["zookeeper"], "optional": [], "internal": ["broker"] } }
//! ```
//!
//! A missing file is not an error: every unit simply has no dependencies.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::UnitName;

/// What a unit needs before it can be enabled.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DependencySpec {
    #[serde(default)]
    pub required: Vec<UnitName>,
    #[serde(default)]
    pub optional: Vec<UnitName>,
    /// Free-form notes on components bundled inside the unit's container.
    #[serde(default)]
    pub internal: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// All dependency specifications, keyed by unit name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyBook {
    specs: HashMap<UnitName, DependencySpec>,
}

impl DependencyBook {
    /// Load the book from `path`; a missing file yields an empty book.
    pub fn load_at(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_json::from_str(&contents).map_err(|source| CoreError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The spec for `name`, or an empty spec when the unit has no entry.
    pub fn spec(&self, name: &UnitName) -> DependencySpec {
        self.specs.get(name).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, name: impl Into<UnitName>, spec: DependencySpec) {
        self.specs.insert(name.into(), spec);
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty_book() {
        let dir = TempDir::new().unwrap();
        let book = DependencyBook::load_at(&dir.path().join("deps.json")).expect("load");
        assert!(book.is_empty());
        assert_eq!(book.spec(&UnitName::from("kafka")), DependencySpec::default());
    }

    #[test]
    fn loads_partial_entries_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deps.json");
        std::fs::write(
            &path,
            r#"{"kibana":{"required":["elasticsearch"],"description":"UI"},"kafka":{"internal":["broker"]}}"#,
        )
        .unwrap();

        let book = DependencyBook::load_at(&path).expect("load");
        let kibana = book.spec(&UnitName::from("kibana"));
        assert_eq!(kibana.required, vec![UnitName::from("elasticsearch")]);
        assert!(kibana.optional.is_empty());
        assert_eq!(kibana.description, "UI");
        assert_eq!(book.spec(&UnitName::from("kafka")).internal, vec!["broker"]);
    }

    #[test]
    fn malformed_json_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deps.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = DependencyBook::load_at(&path).unwrap_err();
        assert!(matches!(err, CoreError::Json { .. }));
        assert!(err.to_string().contains("deps.json"));
    }
}
