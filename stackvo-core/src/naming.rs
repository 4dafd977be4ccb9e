//! Container, image, volume and log-path naming convention.
//!
//! Everything the runtime is asked about is derived from `<prefix>-<unit>`.
//! All call sites go through [`Naming`] so the convention can be swapped in one
//! place (tests use a distinct prefix to avoid clashing with a real stack).

use std::path::{Path, PathBuf};

use crate::types::{UnitKind, UnitName};

/// Default container prefix.
pub const DEFAULT_PREFIX: &str = "stackvo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    prefix: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl Naming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix>-<name>`
    pub fn container(&self, name: &UnitName) -> String {
        format!("{}-{}", self.prefix, name.0)
    }

    /// Inverse of [`Naming::container`]; accepts the runtime's `/name` form.
    pub fn unit_from_container(&self, container: &str) -> Option<UnitName> {
        let bare = container.trim_start_matches('/');
        bare.strip_prefix(&format!("{}-", self.prefix))
            .filter(|rest| !rest.is_empty())
            .map(UnitName::from)
    }

    /// Image built for a project: `<prefix>-<name>:latest`.
    pub fn project_image(&self, name: &UnitName) -> String {
        format!("{}-{}:latest", self.prefix, name.0)
    }

    /// Reference filter used when no image id was captured from the container.
    pub fn image_search_pattern(&self, name: &UnitName) -> String {
        format!("*{}*", name.0)
    }

    /// Name filter for volumes owned by the unit.
    pub fn volume_prefix(&self, name: &UnitName) -> String {
        self.container(name)
    }

    /// `<root>/logs/<kind-plural>/<name>`
    pub fn log_dir(&self, root: &Path, kind: UnitKind, name: &UnitName) -> PathBuf {
        root.join("logs").join(kind.plural()).join(&name.0)
    }

    /// Whether a runtime container name (with or without the leading `/`)
    /// belongs to `name`.
    pub fn matches_container(&self, runtime_name: &str, name: &UnitName) -> bool {
        runtime_name.trim_start_matches('/') == self.container(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names_roundtrip() {
        let naming = Naming::default();
        let redis = UnitName::from("redis");
        assert_eq!(naming.container(&redis), "stackvo-redis");
        assert_eq!(naming.unit_from_container("/stackvo-redis"), Some(redis.clone()));
        assert_eq!(naming.unit_from_container("other-redis"), None);
        assert_eq!(naming.unit_from_container("stackvo-"), None);
    }

    #[test]
    fn matching_is_exact_not_substring() {
        let naming = Naming::new("dev");
        assert!(naming.matches_container("/dev-redis", &UnitName::from("redis")));
        assert!(!naming.matches_container("/dev-redis-commander", &UnitName::from("redis")));
    }

    #[test]
    fn derived_names() {
        let naming = Naming::default();
        let blog = UnitName::from("blog");
        assert_eq!(naming.project_image(&blog), "stackvo-blog:latest");
        assert_eq!(naming.image_search_pattern(&blog), "*blog*");
        assert_eq!(naming.volume_prefix(&blog), "stackvo-blog");
        assert!(naming
            .log_dir(Path::new("/srv/stack"), UnitKind::Service, &blog)
            .ends_with("logs/services/blog"));
    }
}
