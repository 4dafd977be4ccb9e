//! Domain types for units managed by the controller.
//!
//! A [`Unit`] is never persisted; it is the joined view of `.env` flags (or a
//! project directory) and live runtime state, recomputed on every query.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A unit name as used in URLs and container names (`redis`, `rabbit-mq`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitName(pub String);

impl UnitName {
    /// Convert an `.env` key segment (`RABBIT_MQ`) into a unit name (`rabbit-mq`).
    pub fn from_env_segment(segment: &str) -> Self {
        Self(segment.to_ascii_lowercase().replace('_', "-"))
    }

    /// The `.env` key segment for this name (`rabbit-mq` → `RABBIT_MQ`).
    pub fn env_segment(&self) -> String {
        self.0.to_ascii_uppercase().replace('-', "_")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for UnitName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UnitName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The category of a controllable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Service,
    Tool,
    Project,
}

impl UnitKind {
    pub const ALL: [UnitKind; 3] = [UnitKind::Service, UnitKind::Tool, UnitKind::Project];

    /// `.env` key namespace for kinds driven by enable flags.
    ///
    /// Projects are defined by directories, not flags, and have no namespace.
    pub fn env_namespace(self) -> Option<&'static str> {
        match self {
            UnitKind::Service => Some("SERVICE"),
            UnitKind::Tool => Some("TOOLS"),
            UnitKind::Project => None,
        }
    }

    /// Plural used for directory names (`logs/services/<name>`).
    pub fn plural(self) -> &'static str {
        match self {
            UnitKind::Service => "services",
            UnitKind::Tool => "tools",
            UnitKind::Project => "projects",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Service => write!(f, "service"),
            UnitKind::Tool => write!(f, "tool"),
            UnitKind::Project => write!(f, "project"),
        }
    }
}

impl FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "service" | "services" => Ok(UnitKind::Service),
            "tool" | "tools" => Ok(UnitKind::Tool),
            "project" | "projects" => Ok(UnitKind::Project),
            other => Err(format!(
                "unknown unit kind '{other}'; expected: service, tool, project"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime detail
// ---------------------------------------------------------------------------

/// One published (or merely exposed) container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Container-side port spec, e.g. `6379/tcp`.
    pub container_port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<String>,
    pub exposed: bool,
}

/// Port and network details from a container inspect.
///
/// Left at its default (empty) when the inspect fails or the container is not
/// running.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(default)]
    pub ports: Vec<PortBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

// ---------------------------------------------------------------------------
// Unit view
// ---------------------------------------------------------------------------

/// The live view of one service, tool or project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: UnitName,
    pub kind: UnitKind,
    /// Persisted intent (`<NS>_<NAME>_ENABLE=true`, or a valid project config).
    pub configured: bool,
    pub running: bool,
    /// Runtime state string (`running`, `exited`, …) or `not created`.
    pub status: String,
    pub container_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub network: NetworkInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, String>,
    /// Set for projects whose `stackvo.json` is missing or invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Unit {
    /// A unit with no runtime counterpart yet.
    pub fn not_created(kind: UnitKind, name: UnitName, container_name: String) -> Self {
        Self {
            name,
            kind,
            configured: false,
            running: false,
            status: "not created".to_string(),
            container_name,
            container_id: None,
            image: None,
            version: None,
            url: None,
            domain: None,
            network: NetworkInfo::default(),
            created_at: None,
            credentials: BTreeMap::new(),
            error: None,
        }
    }
}

/// Sort units: running first, then configured, then disabled; ties by
/// case-insensitive name.
pub fn sort_units(units: &mut [Unit]) {
    units.sort_by(|a, b| {
        b.running
            .cmp(&a.running)
            .then(b.configured.cmp(&a.configured))
            .then_with(|| {
                a.name
                    .0
                    .to_lowercase()
                    .cmp(&b.name.0.to_lowercase())
            })
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
