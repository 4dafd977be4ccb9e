//! Controller settings.
//!
//! Resolution order (later wins):
//! 1. built-in defaults
//! 2. `<root>/stackvo.yaml`, if present
//! 3. environment variables (`PROJECTS_DIR`, `DOCKER_SOCKET`, `CACHE_TTL`,
//!    `STACKVO_CONTAINER_PREFIX`, `STACKVO_DEPENDENCIES_FILE`)
//!
//! Relative paths are resolved against `root`. The root itself comes from
//! `STACKVO_ROOT` or the current directory and is never read from the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::naming::{Naming, DEFAULT_PREFIX};
use crate::types::UnitName;

pub const SETTINGS_FILE: &str = "stackvo.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip)]
    pub root: PathBuf,
    pub env_file: PathBuf,
    pub projects_dir: PathBuf,
    pub dependencies_file: PathBuf,
    pub container_prefix: String,
    pub docker_socket: PathBuf,
    /// TTL for registry listings, in seconds.
    pub cache_ttl_secs: u64,
    /// TTL for the runtime summary, in seconds.
    pub stats_ttl_secs: u64,
    /// Program plus leading args, e.g. `["docker", "compose"]`.
    pub compose_command: Vec<String>,
    /// Compose files used for services and tools, in order.
    pub compose_files: Vec<PathBuf>,
    pub projects_compose_file: PathBuf,
    /// Artifact generator script, invoked as `<generator> generate [scope]`.
    pub generator: PathBuf,
    /// Suffix appended to bare hosts in `<NS>_<NAME>_URL`.
    pub domain_suffix: String,
    /// Extra containers that belong to a unit (`kafka -> [zookeeper]`).
    pub co_located: BTreeMap<String, Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            env_file: PathBuf::from(".env"),
            projects_dir: PathBuf::from("projects"),
            dependencies_file: PathBuf::from("config/serviceDependencies.json"),
            container_prefix: DEFAULT_PREFIX.to_string(),
            docker_socket: PathBuf::from("/var/run/docker.sock"),
            cache_ttl_secs: 5,
            stats_ttl_secs: 2,
            compose_command: vec!["docker".into(), "compose".into()],
            compose_files: vec![
                PathBuf::from("generated/stackvo.yml"),
                PathBuf::from("generated/docker-compose.dynamic.yml"),
            ],
            projects_compose_file: PathBuf::from("generated/docker-compose.projects.yml"),
            generator: PathBuf::from("core/cli/stackvo.sh"),
            domain_suffix: "stackvo.loc".into(),
            co_located: BTreeMap::from([("kafka".to_string(), vec!["zookeeper".to_string()])]),
        }
    }
}

impl Settings {
    /// Defaults rooted at `root`, overlaid with `<root>/stackvo.yaml` if it exists.
    pub fn load_at(root: &Path) -> Result<Self, CoreError> {
        let path = root.join(SETTINGS_FILE);
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            serde_yaml::from_str::<Settings>(&contents)
                .map_err(|source| CoreError::Settings { path, source })?
        } else {
            Settings::default()
        };
        settings.root = root.to_path_buf();
        Ok(settings)
    }

    /// Root from `STACKVO_ROOT` (or the current directory), then
    /// [`Settings::load_at`], then process environment overrides.
    pub fn from_env() -> Result<Self, CoreError> {
        let root = match std::env::var_os("STACKVO_ROOT") {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir().map_err(|e| io_err(".", e))?,
        };
        let mut settings = Self::load_at(&root)?;
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// An unparsable `CACHE_TTL` is ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("PROJECTS_DIR") {
            self.projects_dir = PathBuf::from(dir);
        }
        if let Some(socket) = lookup("DOCKER_SOCKET") {
            self.docker_socket = PathBuf::from(socket);
        }
        if let Some(ttl) = lookup("CACHE_TTL").and_then(|v| v.trim().parse::<u64>().ok()) {
            if ttl > 0 {
                self.cache_ttl_secs = ttl;
            }
        }
        if let Some(prefix) = lookup("STACKVO_CONTAINER_PREFIX") {
            self.container_prefix = prefix;
        }
        if let Some(file) = lookup("STACKVO_DEPENDENCIES_FILE") {
            self.dependencies_file = PathBuf::from(file);
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn env_file_path(&self) -> PathBuf {
        self.resolve(&self.env_file)
    }

    pub fn projects_path(&self) -> PathBuf {
        self.resolve(&self.projects_dir)
    }

    pub fn dependencies_path(&self) -> PathBuf {
        self.resolve(&self.dependencies_file)
    }

    pub fn generator_path(&self) -> PathBuf {
        self.resolve(&self.generator)
    }

    pub fn compose_file_paths(&self) -> Vec<PathBuf> {
        self.compose_files.iter().map(|p| self.resolve(p)).collect()
    }

    pub fn projects_compose_path(&self) -> PathBuf {
        self.resolve(&self.projects_compose_file)
    }

    pub fn naming(&self) -> Naming {
        Naming::new(self.container_prefix.clone())
    }

    /// Containers that live and die with `name`, excluding its own.
    pub fn co_located_for(&self, name: &UnitName) -> Vec<UnitName> {
        self.co_located
            .get(name.as_str())
            .map(|extra| extra.iter().map(|s| UnitName::from(s.as_str())).collect())
            .unwrap_or_default()
    }
}
