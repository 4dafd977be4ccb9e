//! Lifecycle Controller: enable/disable state machine, container actions and
//! project scaffolding.
//!
//! # Enable
//!
//! ```text
//! dependency → (log dir) → env → generate → container → invalidate cache
//!                           └──────── failure: ENABLE=false ────────┘
//! ```
//!
//! # Disable
//!
//! ```text
//! env → generate → container (stop/remove, image, volumes, log dir) → invalidate cache
//! ```
//!
//! Every step emits `running` then `done` or `failed` on `<kind>:progress`.
//! Each operation holds the unit's lock from start to finish.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use stackvo_core::env_file::enable_key;
use stackvo_core::project::{self, ProjectConfig};
use stackvo_core::{DependencyBook, EnvFile, Naming, NewProject, Settings, UnitKind, UnitName};

use crate::compose::{Compose, ComposeTarget};
use crate::error::{OrchestratorError, RuntimeError};
use crate::events::{Event, EventSink, Step, StepStatus};
use crate::generator::{ArtifactGenerator, GenerateScope};
use crate::locks::UnitLocks;
use crate::process::RunContext;
use crate::registry::{Registry, TOOLS_CONTAINER_UNIT};
use crate::resolver::{check_acyclic, DependencyResolver};
use crate::runtime::ContainerRuntime;

// ---------------------------------------------------------------------------
// Operation record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    pub message: String,
}

/// Transient record of one enable or disable, step by step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleOperation {
    pub kind: UnitKind,
    pub unit: UnitName,
    pub steps: Vec<StepRecord>,
}

impl LifecycleOperation {
    fn new(kind: UnitKind, unit: UnitName, steps: &[Step]) -> Self {
        Self {
            kind,
            unit,
            steps: steps
                .iter()
                .map(|&step| StepRecord {
                    step,
                    status: StepStatus::Pending,
                    message: String::new(),
                })
                .collect(),
        }
    }

    /// Update `step` and return the matching progress event.
    fn mark(&mut self, step: Step, status: StepStatus, message: impl Into<String>) -> Event {
        let message = message.into();
        if let Some(record) = self.steps.iter_mut().find(|r| r.step == step) {
            record.status = status;
            record.message = message.clone();
        }
        Event::progress(self.kind, &self.unit, step, status, message)
    }
}

const ENABLE_STEPS: [Step; 4] = [Step::Dependency, Step::Env, Step::Generate, Step::Container];
const DISABLE_STEPS: [Step; 3] = [Step::Env, Step::Generate, Step::Container];

/// Result of a successful lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleOutcome {
    pub kind: UnitKind,
    pub unit: UnitName,
    pub configured: bool,
    pub running: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    fn progressive(self) -> &'static str {
        match self {
            ContainerAction::Start => "starting",
            ContainerAction::Stop => "stopping",
            ContainerAction::Restart => "restarting",
        }
    }

    fn past(self) -> &'static str {
        match self {
            ContainerAction::Start => "started",
            ContainerAction::Stop => "stopped",
            ContainerAction::Restart => "restarted",
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct LifecycleController {
    root: std::path::PathBuf,
    projects_root: std::path::PathBuf,
    settings: Arc<Settings>,
    env: EnvFile,
    naming: Naming,
    registry: Arc<Registry>,
    resolver: Arc<DependencyResolver>,
    runtime: Arc<dyn ContainerRuntime>,
    compose: Arc<dyn Compose>,
    generator: Arc<dyn ArtifactGenerator>,
    events: Arc<dyn EventSink>,
    locks: UnitLocks,
}

impl LifecycleController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<Registry>,
        resolver: Arc<DependencyResolver>,
        runtime: Arc<dyn ContainerRuntime>,
        compose: Arc<dyn Compose>,
        generator: Arc<dyn ArtifactGenerator>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            root: settings.root.clone(),
            projects_root: settings.projects_path(),
            env: registry.env().clone(),
            naming: settings.naming(),
            settings,
            registry,
            resolver,
            runtime,
            compose,
            generator,
            events,
            locks: UnitLocks::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Enable
    // -----------------------------------------------------------------------

    /// Enable a service or tool, auto-enabling required dependencies first.
    pub async fn enable(
        &self,
        kind: UnitKind,
        name: &UnitName,
    ) -> Result<LifecycleOutcome, OrchestratorError> {
        require_flagged(kind)?;
        let book = self.resolver.load();
        if let Err(err) = check_acyclic(&book, name) {
            self.emit_error(kind, name, &err);
            return Err(err);
        }
        self.enable_unit(kind, name.clone(), &book, false).await
    }

    /// `as_dependency` units are skipped when already running once their lock
    /// is held, so siblings sharing a dependency start it only once.
    fn enable_unit<'a>(
        &'a self,
        kind: UnitKind,
        name: UnitName,
        book: &'a DependencyBook,
        as_dependency: bool,
    ) -> BoxFuture<'a, Result<LifecycleOutcome, OrchestratorError>> {
        Box::pin(async move {
            let _guard = self.locks.acquire(kind, &name).await;
            if as_dependency && self.registry.is_running(kind, &name).await {
                debug!(unit = %name, %kind, "dependency started by a concurrent enable");
                return Ok(LifecycleOutcome {
                    kind,
                    message: format!("{kind} \"{name}\" already running"),
                    unit: name,
                    configured: true,
                    running: true,
                    steps: Vec::new(),
                });
            }
            info!(unit = %name, %kind, "enabling");
            self.events
                .emit(Event::for_unit(kind, "enabling", &name, json!({})));

            let mut op = LifecycleOperation::new(kind, name.clone(), &ENABLE_STEPS);
            let result = self.run_enable(&mut op, book).await;

            match result {
                Ok(()) => {
                    self.registry.invalidate();
                    info!(unit = %name, %kind, "enabled");
                    self.events.emit(Event::for_unit(
                        kind,
                        "enabled",
                        &name,
                        json!({ "configured": true, "running": true }),
                    ));
                    Ok(LifecycleOutcome {
                        kind,
                        message: format!("{kind} \"{name}\" enabled and started"),
                        unit: name,
                        configured: true,
                        running: true,
                        steps: op.steps,
                    })
                }
                Err(err) => {
                    warn!(unit = %name, %kind, error = %err, "enable failed");
                    self.emit_error(kind, &name, &err);
                    Err(err)
                }
            }
        })
    }

    async fn run_enable(
        &self,
        op: &mut LifecycleOperation,
        book: &DependencyBook,
    ) -> Result<(), OrchestratorError> {
        let kind = op.kind;
        let name = op.unit.clone();

        self.ensure_dependencies(op, book).await?;
        self.prepare_log_dir(kind, &name);

        let was_enabled = match self.env.read() {
            Ok(doc) => doc.is_enabled(kind, &name),
            Err(err) => {
                debug!(unit = %name, error = %err, "could not read flag before enable");
                false
            }
        };
        let applied = self.apply_enable(op).await;
        if applied.is_err() {
            self.rollback(kind, &name, was_enabled);
        }
        applied
    }

    /// Enable every required dependency that is not running, in declaration
    /// order. Optional dependencies are only logged.
    async fn ensure_dependencies(
        &self,
        op: &mut LifecycleOperation,
        book: &DependencyBook,
    ) -> Result<(), OrchestratorError> {
        self.events.emit(op.mark(
            Step::Dependency,
            StepStatus::Running,
            "Checking dependencies...",
        ));
        let spec = book.spec(&op.unit);

        for dep in &spec.required {
            if self.registry.is_running(UnitKind::Service, dep).await {
                debug!(unit = %op.unit, dependency = %dep, "dependency already running");
                continue;
            }
            self.events.emit(op.mark(
                Step::Dependency,
                StepStatus::Running,
                format!("Auto-starting dependency: {dep}..."),
            ));
            if let Err(cause) = self
                .enable_unit(UnitKind::Service, dep.clone(), book, true)
                .await
            {
                let err = OrchestratorError::DependencyFailed {
                    dependency: dep.clone(),
                    cause: Box::new(cause),
                };
                self.events
                    .emit(op.mark(Step::Dependency, StepStatus::Failed, err.to_string()));
                return Err(err);
            }
        }
        if !spec.optional.is_empty() {
            debug!(unit = %op.unit, optional = ?spec.optional, "optional dependencies not started");
        }

        self.events.emit(op.mark(
            Step::Dependency,
            StepStatus::Done,
            "Dependencies checked",
        ));
        Ok(())
    }

    async fn apply_enable(&self, op: &mut LifecycleOperation) -> Result<(), OrchestratorError> {
        let kind = op.kind;
        let name = op.unit.clone();

        self.step(
            op,
            Step::Env,
            "Updating configuration...",
            "Configuration updated",
            self.write_flag(kind, &name, true),
        )
        .await?;
        self.step(
            op,
            Step::Generate,
            "Generating Docker Compose files...",
            "Docker Compose files generated",
            self.generate(generate_scope(kind)),
        )
        .await?;
        self.step(
            op,
            Step::Container,
            "Building and starting container...",
            "Container started successfully",
            self.recreate(kind, &name),
        )
        .await
    }

    /// Remove stale containers, then bring the unit up through compose.
    async fn recreate(&self, kind: UnitKind, name: &UnitName) -> Result<(), OrchestratorError> {
        let target = self.compose_target(kind, name);
        match kind {
            UnitKind::Tool => {
                // The shared tools container must be recreated to pick up env changes.
                let down = self.compose.down(&target, &RunContext::quiet()).await;
                if let Err(err) = down {
                    debug!(unit = %name, error = %err, "tools down failed");
                }
            }
            _ => {
                for container in self.owned_containers(name) {
                    self.remove_if_present(&container).await?;
                }
            }
        }
        self.compose_up(&target).await
    }

    /// Put the enable flag back to what it was before the failed attempt.
    fn rollback(&self, kind: UnitKind, name: &UnitName, was_enabled: bool) {
        match self.env.set_enabled(kind, name, was_enabled) {
            Ok(key) => info!(unit = %name, key = %key, restored = was_enabled, "rolled back enable flag"),
            Err(err) => warn!(unit = %name, error = %err, "rollback failed"),
        }
    }

    // -----------------------------------------------------------------------
    // Disable
    // -----------------------------------------------------------------------

    /// Disable a service or tool and remove its runtime artifacts.
    pub async fn disable(
        &self,
        kind: UnitKind,
        name: &UnitName,
    ) -> Result<LifecycleOutcome, OrchestratorError> {
        require_flagged(kind)?;
        let _guard = self.locks.acquire(kind, name).await;
        info!(unit = %name, %kind, "disabling");
        self.events
            .emit(Event::for_unit(kind, "disabling", name, json!({})));

        let mut op = LifecycleOperation::new(kind, name.clone(), &DISABLE_STEPS);
        match self.run_disable(&mut op).await {
            Ok(()) => {
                self.registry.invalidate();
                info!(unit = %name, %kind, "disabled");
                self.events.emit(Event::for_unit(
                    kind,
                    "disabled",
                    name,
                    json!({ "configured": false, "running": false }),
                ));
                Ok(LifecycleOutcome {
                    kind,
                    unit: name.clone(),
                    configured: false,
                    running: false,
                    message: format!("{kind} \"{name}\" disabled and removed"),
                    steps: op.steps,
                })
            }
            Err(err) => {
                warn!(unit = %name, %kind, error = %err, "disable failed");
                self.emit_error(kind, name, &err);
                Err(err)
            }
        }
    }

    async fn run_disable(&self, op: &mut LifecycleOperation) -> Result<(), OrchestratorError> {
        let kind = op.kind;
        let name = op.unit.clone();

        self.step(
            op,
            Step::Env,
            "Updating configuration...",
            "Configuration updated",
            self.write_flag(kind, &name, false),
        )
        .await?;
        self.step(
            op,
            Step::Generate,
            "Generating Docker Compose files...",
            "Docker Compose files generated",
            self.generate(generate_scope(kind)),
        )
        .await?;
        self.step(
            op,
            Step::Container,
            "Stopping and removing container...",
            "Container removed",
            self.teardown(kind, &name),
        )
        .await
    }

    async fn teardown(&self, kind: UnitKind, name: &UnitName) -> Result<(), OrchestratorError> {
        if kind == UnitKind::Tool {
            return self.refresh_tools(name).await;
        }

        let container = self.naming.container(name);
        let image = match self.runtime.inspect_container(&container).await {
            Ok(details) => details.image_id,
            Err(err) => {
                debug!(unit = %name, error = %err, "no image captured");
                None
            }
        };

        for container in self.owned_containers(name) {
            self.stop_and_remove(&container).await?;
        }
        self.remove_images(name, image).await;
        self.remove_volumes(name).await;
        self.remove_log_dir(kind, name);
        Ok(())
    }

    /// Recreate the shared tools container; bringing it back up is skipped
    /// silently when no tool remains enabled.
    async fn refresh_tools(&self, name: &UnitName) -> Result<(), OrchestratorError> {
        let target = self.compose_target(UnitKind::Tool, name);
        if let Err(err) = self.compose.down(&target, &RunContext::quiet()).await {
            debug!(unit = %name, error = %err, "tools down failed");
        }
        let any_enabled = self
            .env
            .read()
            .map(|doc| doc.enable_flags(UnitKind::Tool).iter().any(|(_, on)| *on))
            .unwrap_or(false);
        if any_enabled {
            if let Err(err) = self.compose_up(&target).await {
                warn!(unit = %name, error = %err, "tools container not restarted");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Container actions
    // -----------------------------------------------------------------------

    /// Start, stop or restart `<prefix>-<name>` directly.
    pub async fn container_action(
        &self,
        kind: UnitKind,
        name: &UnitName,
        action: ContainerAction,
    ) -> Result<LifecycleOutcome, OrchestratorError> {
        let _guard = self.locks.acquire(kind, name).await;
        let container = self.naming.container(name);
        self.events.emit(Event::for_unit(
            kind,
            action.progressive(),
            name,
            json!({}),
        ));

        let result = match action {
            ContainerAction::Start => self.runtime.start_container(&container).await,
            ContainerAction::Stop => self.runtime.stop_container(&container).await,
            ContainerAction::Restart => self.runtime.restart_container(&container).await,
        };

        match result {
            Ok(()) => {
                self.registry.invalidate();
                let running = action != ContainerAction::Stop;
                info!(unit = %name, %kind, action = action.past(), "container action done");
                self.events.emit(Event::for_unit(
                    kind,
                    action.past(),
                    name,
                    json!({ "running": running }),
                ));
                Ok(LifecycleOutcome {
                    kind,
                    unit: name.clone(),
                    configured: true,
                    running,
                    message: format!("{container} {}", action.past()),
                    steps: Vec::new(),
                })
            }
            Err(err) => {
                let err = match err {
                    RuntimeError::NotFound(_) => {
                        OrchestratorError::NotFound(format!("container {container}"))
                    }
                    other => OrchestratorError::container(&container, other),
                };
                self.emit_error(kind, name, &err);
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Write the project definition to disk. Building is left to the caller.
    pub async fn create_project(
        &self,
        request: &NewProject,
    ) -> Result<ProjectConfig, OrchestratorError> {
        let name = UnitName::from(request.name.as_str());
        let _guard = self.locks.acquire(UnitKind::Project, &name).await;
        self.events.emit(Event::new(
            "project:creating",
            json!({ "project": name.as_str() }),
        ));

        match project::create_at(&self.projects_root, request) {
            Ok(config) => {
                info!(project = %name, "project created");
                self.registry.invalidate();
                self.events.emit(Event::new(
                    "project:created",
                    json!({ "project": name.as_str(), "domain": config.domain }),
                ));
                Ok(config)
            }
            Err(err) => {
                let err = OrchestratorError::from(err);
                self.emit_error(UnitKind::Project, &name, &err);
                Err(err)
            }
        }
    }

    /// Remove the project's container, image and directory, then regenerate.
    pub async fn delete_project(&self, name: &UnitName) -> Result<(), OrchestratorError> {
        project::validate_name(name.as_str())?;
        let _guard = self.locks.acquire(UnitKind::Project, name).await;
        if !project::exists_at(&self.projects_root, name.as_str()) {
            return Err(OrchestratorError::NotFound(format!("project \"{name}\"")));
        }
        self.events.emit(Event::new(
            "project:deleting",
            json!({ "project": name.as_str() }),
        ));

        let result = self.remove_project(name).await;
        match &result {
            Ok(()) => {
                self.registry.invalidate();
                info!(project = %name, "project deleted");
                self.events.emit(Event::new(
                    "project:deleted",
                    json!({ "project": name.as_str() }),
                ));
            }
            Err(err) => self.emit_error(UnitKind::Project, name, err),
        }
        result
    }

    async fn remove_project(&self, name: &UnitName) -> Result<(), OrchestratorError> {
        let container = self.naming.container(name);
        if let Err(err) = self.stop_and_remove(&container).await {
            warn!(project = %name, error = %err, "container not removed");
        }
        let image = self.naming.project_image(name);
        if let Err(err) = self.runtime.remove_image(&image, true).await {
            debug!(project = %name, image = %image, error = %err, "image not removed");
        }
        project::delete_at(&self.projects_root, name.as_str())?;
        self.generate(GenerateScope::Projects).await
    }

    // -----------------------------------------------------------------------
    // Step helpers
    // -----------------------------------------------------------------------

    async fn step<T, F>(
        &self,
        op: &mut LifecycleOperation,
        step: Step,
        start: &str,
        done: &str,
        work: F,
    ) -> Result<T, OrchestratorError>
    where
        F: Future<Output = Result<T, OrchestratorError>>,
    {
        self.events.emit(op.mark(step, StepStatus::Running, start));
        match work.await {
            Ok(value) => {
                self.events.emit(op.mark(step, StepStatus::Done, done));
                Ok(value)
            }
            Err(err) => {
                self.events
                    .emit(op.mark(step, StepStatus::Failed, err.to_string()));
                Err(err)
            }
        }
    }

    /// Write `ENABLE=<value>` and confirm a fresh read observes it.
    async fn write_flag(
        &self,
        kind: UnitKind,
        name: &UnitName,
        value: bool,
    ) -> Result<(), OrchestratorError> {
        let key = enable_key(kind, name).ok_or_else(|| {
            OrchestratorError::InvalidRequest(format!("{kind} units have no enable flag"))
        })?;
        let expected = if value { "true" } else { "false" };
        let failed = |reason: String| OrchestratorError::ConfigWriteFailed {
            key: key.clone(),
            reason,
        };

        self.env
            .write(&key, expected)
            .map_err(|e| failed(e.to_string()))?;
        let doc = self.env.read().map_err(|e| failed(e.to_string()))?;
        if doc.get(&key) != Some(expected) {
            return Err(failed(format!("{key}={expected} not found after write")));
        }
        debug!(key = %key, value = expected, "flag written");
        Ok(())
    }

    async fn generate(&self, scope: GenerateScope) -> Result<(), OrchestratorError> {
        let output = self
            .generator
            .generate(scope, &RunContext::quiet())
            .await
            .map_err(|e| OrchestratorError::GenerateFailed(e.to_string()))?;
        if !output.success() {
            return Err(OrchestratorError::GenerateFailed(format!(
                "generate {scope} exited with {:?}: {}",
                output.exit_code,
                output.diagnostic().trim()
            )));
        }
        Ok(())
    }

    async fn compose_up(&self, target: &ComposeTarget) -> Result<(), OrchestratorError> {
        let output = self
            .compose
            .up(target, &RunContext::quiet())
            .await
            .map_err(|e| OrchestratorError::container(&target.service, e))?;
        if !output.success() {
            return Err(OrchestratorError::container(
                &target.service,
                output.diagnostic().trim(),
            ));
        }
        Ok(())
    }

    fn compose_target(&self, kind: UnitKind, name: &UnitName) -> ComposeTarget {
        match kind {
            UnitKind::Tool => ComposeTarget {
                profile: "tools".into(),
                service: self
                    .naming
                    .container(&UnitName::from(TOOLS_CONTAINER_UNIT)),
                build: false,
            },
            _ => ComposeTarget {
                profile: name.to_string(),
                service: name.to_string(),
                build: true,
            },
        }
    }

    /// The unit's own container followed by its co-located ones.
    fn owned_containers(&self, name: &UnitName) -> Vec<String> {
        std::iter::once(name.clone())
            .chain(self.settings.co_located_for(name))
            .map(|unit| self.naming.container(&unit))
            .collect()
    }

    async fn remove_if_present(&self, container: &str) -> Result<(), OrchestratorError> {
        match self.runtime.remove_container(container, true).await {
            Ok(()) => {
                debug!(container, "removed stale container");
                Ok(())
            }
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(OrchestratorError::container(container, err)),
        }
    }

    async fn stop_and_remove(&self, container: &str) -> Result<(), OrchestratorError> {
        if let Err(err) = self.runtime.stop_container(container).await {
            debug!(container, error = %err, "stop skipped");
        }
        match self.runtime.remove_container(container, false).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(OrchestratorError::container(container, err)),
        }
    }

    async fn remove_images(&self, name: &UnitName, captured: Option<String>) {
        let images = match captured {
            Some(id) => vec![id],
            None => match self
                .runtime
                .list_images(&self.naming.image_search_pattern(name))
                .await
            {
                Ok(found) => found,
                Err(err) => {
                    warn!(unit = %name, error = %err, "image lookup failed");
                    return;
                }
            },
        };
        for image in images {
            match self.runtime.remove_image(&image, true).await {
                Ok(()) => debug!(unit = %name, image = %image, "image removed"),
                Err(err) => warn!(unit = %name, image = %image, error = %err, "image not removed"),
            }
        }
    }

    async fn remove_volumes(&self, name: &UnitName) {
        let volumes = match self
            .runtime
            .list_volumes(&self.naming.volume_prefix(name))
            .await
        {
            Ok(volumes) => volumes,
            Err(err) => {
                warn!(unit = %name, error = %err, "volume lookup failed");
                return;
            }
        };
        for volume in volumes {
            if let Err(err) = self.runtime.remove_volume(&volume).await {
                warn!(unit = %name, volume = %volume, error = %err, "volume not removed");
            }
        }
    }

    /// Create `<root>/logs/<kind>/<name>` world-writable. Best-effort.
    fn prepare_log_dir(&self, kind: UnitKind, name: &UnitName) {
        let dir = self.naming.log_dir(&self.root, kind, name);
        if let Err(err) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %err, "log directory not created");
            return;
        }
        set_world_writable(&dir);
    }

    fn remove_log_dir(&self, kind: UnitKind, name: &UnitName) {
        let dir = self.naming.log_dir(&self.root, kind, name);
        if dir.exists() {
            if let Err(err) = std::fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %err, "log directory not removed");
            }
        }
    }

    fn emit_error(&self, kind: UnitKind, name: &UnitName, err: &OrchestratorError) {
        self.events.emit(Event::for_unit(
            kind,
            "error",
            name,
            json!({ "error": err.to_string(), "kind": err.kind() }),
        ));
    }
}

fn require_flagged(kind: UnitKind) -> Result<(), OrchestratorError> {
    match kind {
        UnitKind::Service | UnitKind::Tool => Ok(()),
        UnitKind::Project => Err(OrchestratorError::InvalidRequest(
            "projects are built, not enabled; use build".into(),
        )),
    }
}

fn generate_scope(kind: UnitKind) -> GenerateScope {
    match kind {
        UnitKind::Service => GenerateScope::Services,
        UnitKind::Project => GenerateScope::Projects,
        UnitKind::Tool => GenerateScope::All,
    }
}

#[cfg(unix)]
fn set_world_writable(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(err) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777)) {
        warn!(dir = %dir.display(), error = %err, "could not set log directory permissions");
    }
}

#[cfg(not(unix))]
fn set_world_writable(_dir: &Path) {}
