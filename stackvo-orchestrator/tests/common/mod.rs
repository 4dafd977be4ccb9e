//! In-memory collaborators shared by the orchestrator integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use stackvo_core::{NetworkInfo, Settings};
use stackvo_orchestrator::cache::ManualClock;
use stackvo_orchestrator::compose::{Compose, ComposeTarget};
use stackvo_orchestrator::generator::{ArtifactGenerator, GenerateScope};
use stackvo_orchestrator::process::{CommandOutput, OutputLine, OutputStream, ProcessError, RunContext};
use stackvo_orchestrator::runtime::{ContainerDetails, ContainerRuntime, ContainerSummary};
use stackvo_orchestrator::{Collaborators, Orchestrator, RecordingSink, RuntimeError};

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Ordered log of every collaborator call, shared across fakes.
#[derive(Debug, Default, Clone)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    image: String,
    state: String,
}

#[derive(Default)]
struct RuntimeState {
    containers: BTreeMap<String, FakeContainer>,
    images: BTreeSet<String>,
    volumes: BTreeSet<String>,
    list_calls: usize,
    fail_image_removal: bool,
}

/// Pauses one `list_containers` call after its snapshot is taken.
pub struct ListGate {
    /// Notified once the held call has its snapshot.
    pub parked: Arc<Notify>,
    /// Notify to let the held call return.
    pub release: Arc<Notify>,
}

pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
    journal: Journal,
    list_gate: Mutex<Option<ListGate>>,
}

impl FakeRuntime {
    pub fn new(journal: Journal) -> Self {
        Self {
            state: Mutex::new(RuntimeState::default()),
            journal,
            list_gate: Mutex::new(None),
        }
    }

    /// Hold the next `list_containers` call until released.
    pub fn hold_next_list(&self) -> ListGate {
        let parked = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.list_gate.lock().unwrap() = Some(ListGate {
            parked: parked.clone(),
            release: release.clone(),
        });
        ListGate { parked, release }
    }

    pub fn add_container(&self, name: &str, image: &str, running: bool) {
        let mut state = self.state.lock().unwrap();
        state.images.insert(image.to_string());
        state.containers.insert(
            name.to_string(),
            FakeContainer {
                id: format!("id-{name}"),
                image: image.to_string(),
                state: if running { "running" } else { "exited" }.to_string(),
            },
        );
    }

    pub fn add_volume(&self, name: &str) {
        self.state.lock().unwrap().volumes.insert(name.to_string());
    }

    pub fn fail_image_removal(&self) {
        self.state.lock().unwrap().fail_image_removal = true;
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.state.lock().unwrap().containers.contains_key(name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|c| c.state == "running")
            .unwrap_or(false)
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.state.lock().unwrap().images.contains(image)
    }

    pub fn volumes(&self) -> Vec<String> {
        self.state.lock().unwrap().volumes.iter().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    fn set_state(&self, name: &str, state: &str) -> Result<(), RuntimeError> {
        let mut guard = self.state.lock().unwrap();
        let container = guard
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(format!("container {name}")))?;
        container.state = state.to_string();
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let snapshot: Vec<ContainerSummary> = {
            let mut state = self.state.lock().unwrap();
            state.list_calls += 1;
            state
                .containers
                .iter()
                .map(|(name, c)| ContainerSummary {
                    id: c.id.clone(),
                    names: vec![format!("/{name}")],
                    image: c.image.clone(),
                    state: c.state.clone(),
                    created: None,
                })
                .collect()
        };
        let gate = self.list_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.parked.notify_one();
            gate.release.notified().await;
        }
        Ok(snapshot)
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, RuntimeError> {
        let state = self.state.lock().unwrap();
        let found = state
            .containers
            .iter()
            .find(|(n, c)| n.as_str() == name || c.id == name)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| RuntimeError::NotFound(format!("container {name}")))?;
        Ok(ContainerDetails {
            id: found.id,
            image_id: Some(found.image),
            network: NetworkInfo::default(),
        })
    }

    async fn start_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.journal.push(format!("start {name}"));
        self.set_state(name, "running")
    }

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.journal.push(format!("stop {name}"));
        self.set_state(name, "exited")
    }

    async fn restart_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.journal.push(format!("restart {name}"));
        self.set_state(name, "running")
    }

    async fn remove_container(&self, name: &str, _force: bool) -> Result<(), RuntimeError> {
        self.journal.push(format!("rm {name}"));
        self.state
            .lock()
            .unwrap()
            .containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(format!("container {name}")))
    }

    async fn list_images(&self, pattern: &str) -> Result<Vec<String>, RuntimeError> {
        let needle = pattern.trim_matches('*');
        Ok(self
            .state
            .lock()
            .unwrap()
            .images
            .iter()
            .filter(|i| i.contains(needle))
            .cloned()
            .collect())
    }

    async fn remove_image(&self, image: &str, _force: bool) -> Result<(), RuntimeError> {
        self.journal.push(format!("rmi {image}"));
        let mut state = self.state.lock().unwrap();
        if state.fail_image_removal {
            return Err(RuntimeError::Api("image is in use".into()));
        }
        if state.images.remove(image) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound(format!("image {image}")))
        }
    }

    async fn list_volumes(&self, name_filter: &str) -> Result<Vec<String>, RuntimeError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .volumes
            .iter()
            .filter(|v| v.contains(name_filter))
            .cloned()
            .collect())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.journal.push(format!("rmv {name}"));
        self.state.lock().unwrap().volumes.remove(name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Compose
// ---------------------------------------------------------------------------

/// Scripted result for one compose project stage.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed(Vec<&'static str>),
    Fail { stderr: &'static str, code: i32 },
    /// Block until cancelled.
    Hang,
}

pub struct FakeCompose {
    runtime: Arc<FakeRuntime>,
    journal: Journal,
    failing_up: Mutex<BTreeSet<String>>,
    build_script: Mutex<Script>,
}

impl FakeCompose {
    pub fn new(runtime: Arc<FakeRuntime>, journal: Journal) -> Self {
        Self {
            runtime,
            journal,
            failing_up: Mutex::new(BTreeSet::new()),
            build_script: Mutex::new(Script::Succeed(vec!["Step 1/2", "Successfully built"])),
        }
    }

    /// Make `up` for `service` exit non-zero.
    pub fn fail_up(&self, service: &str) {
        self.failing_up.lock().unwrap().insert(service.to_string());
    }

    pub fn script_build(&self, script: Script) {
        *self.build_script.lock().unwrap() = script;
    }

    fn container_for(service: &str) -> String {
        if service.starts_with("stackvo-") {
            service.to_string()
        } else {
            format!("stackvo-{service}")
        }
    }
}

#[async_trait]
impl Compose for FakeCompose {
    async fn up(
        &self,
        target: &ComposeTarget,
        _ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError> {
        self.journal.push(format!("up {}", target.service));
        if self.failing_up.lock().unwrap().contains(&target.service) {
            return Ok(failed("Error response from daemon: port is already allocated", 1));
        }
        // lets a concurrent operation run while compose is "starting" the unit
        tokio::task::yield_now().await;
        let container = Self::container_for(&target.service);
        self.runtime
            .add_container(&container, &format!("{}:latest", target.service), true);
        Ok(succeeded(&[]))
    }

    async fn down(
        &self,
        target: &ComposeTarget,
        _ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError> {
        self.journal.push(format!("down {}", target.service));
        let container = Self::container_for(&target.service);
        let _ = self.runtime.remove_container(&container, true).await;
        Ok(succeeded(&[]))
    }

    async fn build_project(
        &self,
        project: &str,
        ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError> {
        self.journal.push(format!("build {project}"));
        let script = self.build_script.lock().unwrap().clone();
        match script {
            Script::Succeed(lines) => {
                for line in &lines {
                    send(ctx, OutputStream::Stdout, line);
                }
                Ok(succeeded(&lines))
            }
            Script::Fail { stderr, code } => {
                for line in stderr.lines() {
                    send(ctx, OutputStream::Stderr, line);
                }
                Ok(failed(stderr, code))
            }
            Script::Hang => {
                ctx.cancel.cancelled().await;
                Err(ProcessError::Cancelled {
                    command: format!("docker compose build {project}"),
                })
            }
        }
    }

    async fn up_project(
        &self,
        project: &str,
        _ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError> {
        self.journal.push(format!("up-project {project}"));
        self.runtime
            .add_container(&format!("stackvo-{project}"), &format!("stackvo-{project}:latest"), true);
        Ok(succeeded(&[]))
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct FakeGenerator {
    journal: Journal,
    fail: Mutex<bool>,
}

impl FakeGenerator {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail: Mutex::new(false),
        }
    }

    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl ArtifactGenerator for FakeGenerator {
    async fn generate(
        &self,
        scope: GenerateScope,
        ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError> {
        self.journal.push(format!("generate {scope}"));
        if *self.fail.lock().unwrap() {
            return Ok(failed("template error: unknown service", 2));
        }
        send(ctx, OutputStream::Stdout, "Generated compose files");
        Ok(succeeded(&["Generated compose files"]))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub dir: TempDir,
    pub journal: Journal,
    pub runtime: Arc<FakeRuntime>,
    pub compose: Arc<FakeCompose>,
    pub generator: Arc<FakeGenerator>,
    pub events: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    /// A stack root with `env` as its `.env` and `deps` as the dependency file.
    pub fn new(env: &str, deps: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env"), env).unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::create_dir_all(dir.path().join("projects")).unwrap();
        std::fs::write(dir.path().join("config/serviceDependencies.json"), deps).unwrap();

        let journal = Journal::default();
        let runtime = Arc::new(FakeRuntime::new(journal.clone()));
        let compose = Arc::new(FakeCompose::new(runtime.clone(), journal.clone()));
        let generator = Arc::new(FakeGenerator::new(journal.clone()));
        let events = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new());

        let settings = Settings::load_at(dir.path()).unwrap();
        let orchestrator = Orchestrator::new(
            settings,
            Collaborators {
                runtime: runtime.clone(),
                compose: compose.clone(),
                generator: generator.clone(),
                events: events.clone(),
                clock: clock.clone(),
            },
        );

        Self {
            dir,
            journal,
            runtime,
            compose,
            generator,
            events,
            clock,
            orchestrator,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn env(&self) -> String {
        std::fs::read_to_string(self.root().join(".env")).unwrap()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events.topics()
    }

    /// Index of the first event with `topic` whose payload has `field == value`.
    pub fn event_index(&self, topic: &str, field: &str, value: &str) -> Option<usize> {
        self.events.events().iter().position(|e| {
            e.topic == topic && e.payload.get(field).and_then(|v| v.as_str()) == Some(value)
        })
    }

    /// Index of a `<kind>:progress` event for `unit`/`step`/`status`.
    pub fn progress_index(&self, topic: &str, unit: &str, step: &str, status: &str) -> Option<usize> {
        self.events.events().iter().position(|e| {
            e.topic == topic
                && e.payload["unit"] == unit
                && e.payload["step"] == step
                && e.payload["status"] == status
        })
    }
}

fn send(ctx: &RunContext, stream: OutputStream, line: &str) {
    if let Some(tx) = &ctx.lines {
        let _ = tx.send(OutputLine {
            stream,
            line: line.to_string(),
        });
    }
}

fn succeeded(lines: &[&str]) -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        stdout: lines.join("\n"),
        stderr: String::new(),
    }
}

fn failed(stderr: &str, code: i32) -> CommandOutput {
    CommandOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}
