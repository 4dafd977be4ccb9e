//! Unit Registry: joins persisted intent with live runtime state.
//!
//! Services and tools come from `<NS>_<NAME>_ENABLE` flags in `.env`;
//! projects from directories under the projects root. Each is matched to its
//! `<prefix>-<name>` container. Results are cached per kind and dropped by
//! [`Registry::invalidate`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use stackvo_core::project::{self, ProjectEntry};
use stackvo_core::types::sort_units;
use stackvo_core::{EnvDocument, EnvFile, Naming, Settings, Unit, UnitKind, UnitName};

use crate::cache::{
    CachedQuery, QueryCache, RuntimeSummary, PROJECTS_KEY, SERVICES_KEY, STATS_KEY, TOOLS_KEY,
};
use crate::error::OrchestratorError;
use crate::runtime::{ContainerRuntime, ContainerSummary};

/// Name of the shared container that serves every enabled tool.
pub const TOOLS_CONTAINER_UNIT: &str = "tools";

pub struct Registry {
    env: EnvFile,
    projects_root: PathBuf,
    naming: Naming,
    domain_suffix: String,
    runtime: Arc<dyn ContainerRuntime>,
    cache: Arc<QueryCache>,
    stats_ttl: Duration,
}

impl Registry {
    pub fn new(settings: &Settings, runtime: Arc<dyn ContainerRuntime>, cache: Arc<QueryCache>) -> Self {
        Self {
            env: EnvFile::new(settings.env_file_path()),
            projects_root: settings.projects_path(),
            naming: settings.naming(),
            domain_suffix: settings.domain_suffix.clone(),
            runtime,
            cache,
            stats_ttl: Duration::from_secs(settings.stats_ttl_secs),
        }
    }

    /// Units of `kind`, running first, then configured, then by name.
    pub async fn list_units(&self, kind: UnitKind) -> Result<Vec<Unit>, OrchestratorError> {
        let key = cache_key(kind);
        if let Some(CachedQuery::Units(units)) = self.cache.get(key) {
            return Ok(units);
        }
        let generation = self.cache.generation();

        let mut units = match kind {
            UnitKind::Project => self.scan_projects().await?,
            UnitKind::Service | UnitKind::Tool => self.scan_flagged(kind).await?,
        };
        sort_units(&mut units);

        // A mutation that finished while we scanned already invalidated; the
        // scan may predate it, so it is returned but not cached.
        self.cache.set_if_current(
            key,
            CachedQuery::Units(units.clone()),
            self.cache.default_ttl(),
            generation,
        );
        Ok(units)
    }

    /// Whether `<prefix>-<name>` is running. An unreachable runtime reads as
    /// "not running".
    pub async fn is_running(&self, kind: UnitKind, name: &UnitName) -> bool {
        match self.runtime.list_containers().await {
            Ok(containers) => self
                .find(&containers, name)
                .map(ContainerSummary::is_running)
                .unwrap_or(false),
            Err(err) => {
                warn!(unit = %name, %kind, error = %err, "runtime unavailable, assuming not running");
                false
            }
        }
    }

    /// Container totals, cached for the stats TTL.
    pub async fn runtime_summary(&self) -> Result<RuntimeSummary, OrchestratorError> {
        if let Some(CachedQuery::Summary(summary)) = self.cache.get(STATS_KEY) {
            return Ok(summary);
        }
        let generation = self.cache.generation();
        let containers = self.containers().await?;
        let running = containers.iter().filter(|c| c.is_running()).count();
        let summary = RuntimeSummary {
            total: containers.len(),
            running,
            stopped: containers.len() - running,
        };
        self.cache.set_if_current(
            STATS_KEY,
            CachedQuery::Summary(summary),
            self.stats_ttl,
            generation,
        );
        Ok(summary)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// The `.env` handle. Writers clone it so they share its write lock.
    pub fn env(&self) -> &EnvFile {
        &self.env
    }

    // -----------------------------------------------------------------------
    // Scans
    // -----------------------------------------------------------------------

    async fn scan_flagged(&self, kind: UnitKind) -> Result<Vec<Unit>, OrchestratorError> {
        let doc = self.env.read().map_err(OrchestratorError::ConfigUnavailable)?;
        let flags = doc.enable_flags(kind);
        let known: Vec<UnitName> = flags.iter().map(|(name, _)| name.clone()).collect();
        let containers = self.containers().await?;
        let shared_tools = UnitName::from(TOOLS_CONTAINER_UNIT);

        let mut units = Vec::with_capacity(flags.len());
        for (name, enabled) in flags {
            let own = self.find(&containers, &name);
            // Tools without a dedicated container are served by the shared one.
            let container = match (own, kind, enabled) {
                (None, UnitKind::Tool, true) => self.find(&containers, &shared_tools),
                (own, _, _) => own,
            };
            let mut unit = self.join(kind, name, container).await;
            unit.configured = enabled;
            self.describe(&doc, &known, &mut unit);
            units.push(unit);
        }
        Ok(units)
    }

    async fn scan_projects(&self) -> Result<Vec<Unit>, OrchestratorError> {
        let entries = project::list_at(&self.projects_root)?;
        let containers = self.containers().await?;

        let mut units = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = entry.unit_name();
            let container = self.find(&containers, &name);
            let mut unit = self.join(UnitKind::Project, name, container).await;
            describe_project(&entry, &mut unit);
            units.push(unit);
        }
        Ok(units)
    }

    async fn containers(&self) -> Result<Vec<ContainerSummary>, OrchestratorError> {
        self.runtime
            .list_containers()
            .await
            .map_err(|e| OrchestratorError::container("*", e))
    }

    fn find<'a>(
        &self,
        containers: &'a [ContainerSummary],
        name: &UnitName,
    ) -> Option<&'a ContainerSummary> {
        containers
            .iter()
            .find(|c| c.names.iter().any(|n| self.naming.matches_container(n, name)))
    }

    /// Build the runtime half of a unit. Port and network details are only
    /// fetched for running containers and left empty if inspect fails.
    async fn join(
        &self,
        kind: UnitKind,
        name: UnitName,
        container: Option<&ContainerSummary>,
    ) -> Unit {
        let container_name = self.naming.container(&name);
        let mut unit = Unit::not_created(kind, name, container_name);
        let Some(c) = container else {
            return unit;
        };

        unit.status = c.state.clone();
        unit.running = c.is_running();
        unit.container_id = Some(c.id.clone());
        unit.image = Some(c.image.clone());
        unit.created_at = c.created;
        if unit.running {
            match self.runtime.inspect_container(&c.id).await {
                Ok(details) => unit.network = details.network,
                Err(err) => debug!(unit = %unit.name, error = %err, "inspect failed"),
            }
        }
        unit
    }

    fn describe(&self, doc: &EnvDocument, known: &[UnitName], unit: &mut Unit) {
        let kind = unit.kind;
        unit.version = doc
            .unit_value(kind, &unit.name, "VERSION")
            .map(str::to_string);
        unit.url = doc
            .unit_value(kind, &unit.name, "URL")
            .map(|raw| expand_url(raw, &self.domain_suffix));
        unit.domain = unit.url.as_deref().map(domain_of);
        unit.credentials = doc.unit_credentials(kind, &unit.name, known);
        if unit.image.is_none() {
            unit.image = unit
                .version
                .as_ref()
                .map(|v| format!("{}:{v}", unit.name));
        }
    }
}

fn describe_project(entry: &ProjectEntry, unit: &mut Unit) {
    match &entry.config {
        Ok(config) => {
            unit.configured = true;
            unit.domain = config.domain.clone();
            unit.url = config.domain.as_ref().map(|d| format!("https://{d}"));
            unit.version = config
                .runtime()
                .map(|(runtime, version)| format!("{runtime} {version}"));
        }
        Err(reason) => unit.error = Some(reason.clone()),
    }
}

fn cache_key(kind: UnitKind) -> &'static str {
    match kind {
        UnitKind::Service => SERVICES_KEY,
        UnitKind::Tool => TOOLS_KEY,
        UnitKind::Project => PROJECTS_KEY,
    }
}

/// `adminer` becomes `https://adminer.<suffix>`; full URLs pass through.
pub fn expand_url(raw: &str, suffix: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}.{suffix}")
    }
}

/// Host part of a URL.
pub fn domain_of(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
