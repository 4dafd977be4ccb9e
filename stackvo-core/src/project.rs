//! On-disk project definitions.
//!
//! # Storage layout
//!
//! ```text
//! <projects_root>/
//!   <name>/
//!     stackvo.json        (name, domain, webserver, document_root, runtime section)
//!     .stackvo/           (custom webserver / runtime config, optional)
//!     <document_root>/    (index page written on create)
//! ```
//!
//! The runtime section is keyed by runtime (`"php": {"version": "8.2", ...}`),
//! at most one per project.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::UnitName;

pub const CONFIG_FILE: &str = "stackvo.json";
pub const STACKVO_DIR: &str = ".stackvo";

const DEFAULT_WEBSERVER: &str = "nginx";
const DEFAULT_DOCUMENT_ROOT: &str = "public";
const DEFAULT_PHP_EXTENSIONS: [&str; 3] = ["pdo", "pdo_mysql", "mysqli"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhpSection {
    pub version: String,
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSection {
    pub version: String,
}

/// Contents of `stackvo.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webserver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub php: Option<PhpSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodejs: Option<VersionSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<VersionSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruby: Option<VersionSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub golang: Option<VersionSection>,
}

impl ProjectConfig {
    /// The first runtime section present, with its version.
    pub fn runtime(&self) -> Option<(ProjectRuntime, &str)> {
        if let Some(php) = &self.php {
            return Some((ProjectRuntime::Php, php.version.as_str()));
        }
        [
            (ProjectRuntime::Nodejs, &self.nodejs),
            (ProjectRuntime::Python, &self.python),
            (ProjectRuntime::Ruby, &self.ruby),
            (ProjectRuntime::Golang, &self.golang),
        ]
        .into_iter()
        .find_map(|(rt, section)| section.as_ref().map(|s| (rt, s.version.as_str())))
    }

    pub fn document_root(&self) -> &str {
        self.document_root.as_deref().unwrap_or(DEFAULT_DOCUMENT_ROOT)
    }
}

/// Supported project runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRuntime {
    Php,
    Nodejs,
    Python,
    Ruby,
    Golang,
}

impl fmt::Display for ProjectRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectRuntime::Php => "php",
            ProjectRuntime::Nodejs => "nodejs",
            ProjectRuntime::Python => "python",
            ProjectRuntime::Ruby => "ruby",
            ProjectRuntime::Golang => "golang",
        };
        f.write_str(s)
    }
}

impl FromStr for ProjectRuntime {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "php" => Ok(ProjectRuntime::Php),
            "nodejs" => Ok(ProjectRuntime::Nodejs),
            "python" => Ok(ProjectRuntime::Python),
            "ruby" => Ok(ProjectRuntime::Ruby),
            "golang" => Ok(ProjectRuntime::Golang),
            other => Err(CoreError::InvalidProject(format!(
                "unsupported runtime '{other}'; expected: php, nodejs, python, ruby, golang"
            ))),
        }
    }
}

/// A create-project request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub runtime: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webserver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

impl NewProject {
    /// Validate the request and produce the `stackvo.json` it would write.
    pub fn to_config(&self) -> Result<ProjectConfig, CoreError> {
        validate_name(&self.name)?;
        if self.version.trim().is_empty() {
            return Err(CoreError::InvalidProject("version is required".into()));
        }
        let runtime: ProjectRuntime = self.runtime.parse()?;
        let version = VersionSection {
            version: self.version.clone(),
        };

        let mut config = ProjectConfig {
            name: self.name.clone(),
            domain: Some(
                self.domain
                    .clone()
                    .unwrap_or_else(|| format!("{}.loc", self.name)),
            ),
            webserver: Some(
                self.webserver
                    .clone()
                    .unwrap_or_else(|| DEFAULT_WEBSERVER.to_string()),
            ),
            document_root: Some(
                self.document_root
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DOCUMENT_ROOT.to_string()),
            ),
            php: None,
            nodejs: None,
            python: None,
            ruby: None,
            golang: None,
        };
        match runtime {
            ProjectRuntime::Php => {
                config.php = Some(PhpSection {
                    version: self.version.clone(),
                    extensions: self.extensions.clone().unwrap_or_else(|| {
                        DEFAULT_PHP_EXTENSIONS.iter().map(|s| s.to_string()).collect()
                    }),
                })
            }
            ProjectRuntime::Nodejs => config.nodejs = Some(version),
            ProjectRuntime::Python => config.python = Some(version),
            ProjectRuntime::Ruby => config.ruby = Some(version),
            ProjectRuntime::Golang => config.golang = Some(version),
        }
        Ok(config)
    }
}

/// One directory under the projects root, with its parsed config or the
/// reason it could not be read.
#[derive(Debug, Clone)]
pub struct ProjectEntry {
    pub dir_name: String,
    pub config: Result<ProjectConfig, String>,
}

impl ProjectEntry {
    /// `config.name` when the config parsed, otherwise the directory name.
    pub fn unit_name(&self) -> UnitName {
        match &self.config {
            Ok(cfg) if !cfg.name.is_empty() => UnitName::from(cfg.name.as_str()),
            _ => UnitName::from(self.dir_name.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Names may contain ASCII letters, digits, `-`, `_` and `.`.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::InvalidProject("name is required".into()));
    }
    let allowed = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !allowed || name.chars().all(|c| c == '.') {
        return Err(CoreError::InvalidProject(format!(
            "invalid project name '{name}'; alphanumeric, dash, underscore and dot allowed"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// `<projects_root>/<name>` (pure, no I/O).
pub fn project_dir_at(projects_root: &Path, name: &str) -> PathBuf {
    projects_root.join(name)
}

pub fn exists_at(projects_root: &Path, name: &str) -> bool {
    project_dir_at(projects_root, name).is_dir()
}

/// Load `<projects_root>/<name>/stackvo.json`.
pub fn load_at(projects_root: &Path, name: &str) -> Result<ProjectConfig, CoreError> {
    let dir = project_dir_at(projects_root, name);
    if !dir.is_dir() {
        return Err(CoreError::ProjectNotFound {
            name: name.to_string(),
        });
    }
    read_config(&dir.join(CONFIG_FILE))
}

fn read_config(path: &Path) -> Result<ProjectConfig, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&contents).map_err(|source| CoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Every directory under `projects_root`, sorted by directory name.
///
/// A missing root yields an empty list. Plain files are skipped.
pub fn list_at(projects_root: &Path) -> Result<Vec<ProjectEntry>, CoreError> {
    if !projects_root.exists() {
        return Ok(vec![]);
    }
    let mut dirs: Vec<_> = std::fs::read_dir(projects_root)
        .map_err(|e| io_err(projects_root, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .collect();
    dirs.sort_by_key(|e| e.file_name());

    Ok(dirs
        .into_iter()
        .map(|entry| ProjectEntry {
            dir_name: entry.file_name().to_string_lossy().into_owned(),
            config: read_config(&entry.path().join(CONFIG_FILE))
                .map_err(|_| "configuration file not found or invalid".to_string()),
        })
        .collect())
}

/// Create the project directory, `stackvo.json`, `.stackvo/` and the document
/// root with a placeholder index page.
///
/// Any failure after the directory was created removes it again.
pub fn create_at(projects_root: &Path, request: &NewProject) -> Result<ProjectConfig, CoreError> {
    let config = request.to_config()?;
    let dir = project_dir_at(projects_root, &config.name);
    if dir.exists() {
        return Err(CoreError::ProjectExists {
            name: config.name.clone(),
        });
    }

    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    if let Err(e) = scaffold(&dir, &config, request) {
        let _ = std::fs::remove_dir_all(&dir);
        return Err(e);
    }
    Ok(config)
}

fn scaffold(dir: &Path, config: &ProjectConfig, request: &NewProject) -> Result<(), CoreError> {
    let config_path = dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&config_path, json).map_err(|e| io_err(&config_path, e))?;

    let docroot = dir.join(config.document_root());
    std::fs::create_dir_all(&docroot).map_err(|e| io_err(&docroot, e))?;

    let stackvo_dir = dir.join(STACKVO_DIR);
    std::fs::create_dir_all(&stackvo_dir).map_err(|e| io_err(&stackvo_dir, e))?;

    let (file, body) = index_page(config, request);
    let index = docroot.join(file);
    std::fs::write(&index, body).map_err(|e| io_err(&index, e))?;
    Ok(())
}

fn index_page(config: &ProjectConfig, request: &NewProject) -> (&'static str, String) {
    let domain = config.domain.as_deref().unwrap_or_default();
    let runtime_line = if config.php.is_some() {
        "<p><strong>PHP Version:</strong> <?php echo phpversion(); ?></p>".to_string()
    } else {
        format!(
            "<p><strong>Runtime:</strong> {} {}</p>",
            request.runtime, request.version
        )
    };
    let html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"UTF-8\">\n  \
         <title>Welcome to {name}</title>\n</head>\n<body>\n  <h1>Welcome to {name}!</h1>\n  \
         <p><strong>Domain:</strong> {domain}</p>\n  {runtime_line}\n  \
         <p><strong>Document Root:</strong> {docroot}</p>\n</body>\n</html>\n",
        name = config.name,
        docroot = config.document_root(),
    );
    if config.php.is_some() {
        ("index.php", html)
    } else {
        ("index.html", html)
    }
}

/// Remove `<projects_root>/<name>` recursively.
pub fn delete_at(projects_root: &Path, name: &str) -> Result<(), CoreError> {
    let dir = project_dir_at(projects_root, name);
    if !dir.exists() {
        return Err(CoreError::ProjectNotFound {
            name: name.to_string(),
        });
    }
    std::fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
