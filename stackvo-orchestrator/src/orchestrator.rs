//! The orchestrator facade a transport talks to.
//!
//! [`Orchestrator`] is cheap to clone. It owns the cache, the registry, the
//! controller and the build job store for one stack root.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use stackvo_core::{NewProject, ProjectConfig, Settings, Unit, UnitKind, UnitName};

use crate::build::BuildPipeline;
use crate::cache::{Clock, QueryCache, RuntimeSummary, SystemClock};
use crate::compose::{Compose, DockerCompose};
use crate::controller::{ContainerAction, LifecycleController, LifecycleOutcome};
use crate::error::OrchestratorError;
use crate::events::EventSink;
use crate::generator::{ArtifactGenerator, ScriptGenerator};
use crate::jobs::{BuildJob, JobStore};
use crate::registry::Registry;
use crate::resolver::{DependencyReport, DependencyResolver};
use crate::runtime::{ContainerRuntime, DockerRuntime};

/// External collaborators, swappable for tests.
pub struct Collaborators {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub compose: Arc<dyn Compose>,
    pub generator: Arc<dyn ArtifactGenerator>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Docker over the configured socket, `docker compose` and the generator
    /// script under the stack root.
    pub fn production(
        settings: &Settings,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, OrchestratorError> {
        let runtime = DockerRuntime::connect(&settings.docker_socket)
            .map_err(|e| OrchestratorError::container("*", e))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            compose: Arc::new(DockerCompose::from_settings(settings)),
            generator: Arc::new(ScriptGenerator::new(
                settings.generator_path(),
                settings.root.clone(),
            )),
            events,
            clock: Arc::new(SystemClock),
        })
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    settings: Arc<Settings>,
    registry: Arc<Registry>,
    resolver: Arc<DependencyResolver>,
    controller: LifecycleController,
    pipeline: BuildPipeline,
    jobs: JobStore,
}

impl Orchestrator {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        let settings = Arc::new(settings);
        let Collaborators {
            runtime,
            compose,
            generator,
            events,
            clock,
        } = collaborators;

        let cache = Arc::new(QueryCache::new(
            clock,
            Duration::from_secs(settings.cache_ttl_secs),
        ));
        let registry = Arc::new(Registry::new(&settings, runtime.clone(), cache));
        let resolver = Arc::new(DependencyResolver::new(settings.dependencies_path()));
        let controller = LifecycleController::new(
            settings.clone(),
            registry.clone(),
            resolver.clone(),
            runtime,
            compose.clone(),
            generator.clone(),
            events.clone(),
        );
        let pipeline = BuildPipeline::new(settings.projects_path(), generator, compose, events);

        Self {
            inner: Arc::new(Inner {
                settings,
                registry,
                resolver,
                controller,
                pipeline,
                jobs: JobStore::new(),
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn list_units(&self, kind: UnitKind) -> Result<Vec<Unit>, OrchestratorError> {
        self.inner.registry.list_units(kind).await
    }

    pub async fn is_running(&self, kind: UnitKind, name: &UnitName) -> bool {
        self.inner.registry.is_running(kind, name).await
    }

    pub async fn dependency_report(&self, name: &UnitName) -> DependencyReport {
        self.inner
            .resolver
            .report(&self.inner.registry, name)
            .await
    }

    pub async fn runtime_summary(&self) -> Result<RuntimeSummary, OrchestratorError> {
        self.inner.registry.runtime_summary().await
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub async fn enable(
        &self,
        kind: UnitKind,
        name: &UnitName,
    ) -> Result<LifecycleOutcome, OrchestratorError> {
        self.inner.controller.enable(kind, name).await
    }

    pub async fn disable(
        &self,
        kind: UnitKind,
        name: &UnitName,
    ) -> Result<LifecycleOutcome, OrchestratorError> {
        self.inner.controller.disable(kind, name).await
    }

    pub async fn start(
        &self,
        kind: UnitKind,
        name: &UnitName,
    ) -> Result<LifecycleOutcome, OrchestratorError> {
        self.inner
            .controller
            .container_action(kind, name, ContainerAction::Start)
            .await
    }

    pub async fn stop(
        &self,
        kind: UnitKind,
        name: &UnitName,
    ) -> Result<LifecycleOutcome, OrchestratorError> {
        self.inner
            .controller
            .container_action(kind, name, ContainerAction::Stop)
            .await
    }

    pub async fn restart(
        &self,
        kind: UnitKind,
        name: &UnitName,
    ) -> Result<LifecycleOutcome, OrchestratorError> {
        self.inner
            .controller
            .container_action(kind, name, ContainerAction::Restart)
            .await
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Scaffold a project and start building it in the background.
    pub async fn create_project(
        &self,
        request: &NewProject,
    ) -> Result<(ProjectConfig, BuildJob), OrchestratorError> {
        let config = self.inner.controller.create_project(request).await?;
        let job = self.build(&UnitName::from(config.name.as_str()))?;
        Ok((config, job))
    }

    pub async fn delete_project(&self, name: &UnitName) -> Result<(), OrchestratorError> {
        self.inner.controller.delete_project(name).await
    }

    /// Start a build job for `project`, or return the one already in flight.
    pub fn build(&self, project: &UnitName) -> Result<BuildJob, OrchestratorError> {
        stackvo_core::project::validate_name(project.as_str())?;
        let (job, cancel) = self.inner.jobs.enqueue(project);
        let Some(cancel) = cancel else {
            info!(project = %project, job = %job.id, "build already in flight");
            return Ok(job);
        };

        let this = self.clone();
        let id = job.id.clone();
        let project = project.clone();
        tokio::spawn(async move {
            let inner = &this.inner;
            inner.jobs.mark_running(&id);
            let outcome = inner
                .pipeline
                .run(&project, cancel, |stage| inner.jobs.set_stage(&id, stage))
                .await;
            match &outcome {
                Ok(_) => inner.registry.invalidate(),
                Err(failure) => {
                    warn!(project = %project, job = %id, error = %failure, "build job failed")
                }
            }
            inner.jobs.finish(&id, outcome);
        });
        Ok(job)
    }

    pub fn job(&self, id: &str) -> Result<BuildJob, OrchestratorError> {
        self.inner
            .jobs
            .get(id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("job {id}")))
    }

    pub fn jobs(&self) -> Vec<BuildJob> {
        self.inner.jobs.list()
    }

    pub fn cancel_job(&self, id: &str) -> Result<BuildJob, OrchestratorError> {
        self.inner.jobs.cancel(id)
    }

    /// Resolve when job `id` finishes.
    pub async fn wait_job(&self, id: &str) -> Result<BuildJob, OrchestratorError> {
        self.inner
            .jobs
            .wait(id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(format!("job {id}")))
    }
}
