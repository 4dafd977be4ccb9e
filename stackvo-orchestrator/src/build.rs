//! Build Pipeline: `generate projects` → `compose build` → `compose up`.
//!
//! Each stage is an external process whose stdout/stderr is streamed line by
//! line as `build:progress`. The first non-zero exit stops the pipeline.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stackvo_core::{project, UnitName};

use crate::compose::Compose;
use crate::error::OrchestratorError;
use crate::events::{Event, EventSink};
use crate::generator::{ArtifactGenerator, GenerateScope};
use crate::process::{CommandOutput, OutputLine, OutputStream, ProcessError, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStage {
    Generate,
    Build,
    Up,
}

impl BuildStage {
    pub const ORDER: [BuildStage; 3] = [BuildStage::Generate, BuildStage::Build, BuildStage::Up];

    fn banner(self, project: &UnitName) -> String {
        match self {
            BuildStage::Generate => "Generating project configuration...".to_string(),
            BuildStage::Build => format!("Building image for {project}..."),
            BuildStage::Up => format!("Starting container for {project}..."),
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::Generate => f.write_str("generate"),
            BuildStage::Build => f.write_str("build"),
            BuildStage::Up => f.write_str("up"),
        }
    }
}

/// Captured output of one finished stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage: BuildStage,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub project: UnitName,
    pub stages: Vec<StageOutput>,
    pub success: bool,
}

/// A failed build: the error plus whatever stages ran before it, including
/// the failing stage's full output.
#[derive(Debug)]
pub struct BuildFailure {
    pub error: OrchestratorError,
    pub partial: Option<BuildResult>,
}

impl From<OrchestratorError> for BuildFailure {
    fn from(error: OrchestratorError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

pub struct BuildPipeline {
    projects_root: PathBuf,
    generator: Arc<dyn ArtifactGenerator>,
    compose: Arc<dyn Compose>,
    events: Arc<dyn EventSink>,
}

impl BuildPipeline {
    pub fn new(
        projects_root: PathBuf,
        generator: Arc<dyn ArtifactGenerator>,
        compose: Arc<dyn Compose>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            projects_root,
            generator,
            compose,
            events,
        }
    }

    /// Run all stages for `project`. `on_stage` is called as each stage starts.
    pub async fn run(
        &self,
        project: &UnitName,
        cancel: CancellationToken,
        on_stage: impl Fn(BuildStage) + Send + Sync,
    ) -> Result<BuildResult, BuildFailure> {
        if !project::exists_at(&self.projects_root, project.as_str()) {
            let err = OrchestratorError::NotFound(format!("project \"{project}\""));
            self.emit_error(project, None, &err);
            return Err(err.into());
        }

        info!(project = %project, "build started");
        self.events.emit(Event::new(
            "build:start",
            json!({ "project": project.as_str(), "message": "Starting build..." }),
        ));

        let mut stages = Vec::with_capacity(BuildStage::ORDER.len());
        for stage in BuildStage::ORDER {
            on_stage(stage);
            self.info_line(project, stage, stage.banner(project));

            let output = match self.run_stage(project, stage, &cancel).await {
                Ok(output) => output,
                Err(err) => {
                    self.emit_error(project, Some(stage), &err);
                    return Err(failed(project, stages, err));
                }
            };
            let succeeded = output.success();
            stages.push(StageOutput {
                stage,
                exit_code: output.exit_code,
                stdout: output.stdout.clone(),
                stderr: output.stderr.clone(),
            });

            if !succeeded {
                let err = OrchestratorError::BuildStageFailed {
                    stage,
                    exit_code: output.exit_code,
                    output: output.diagnostic().to_string(),
                };
                warn!(project = %project, stage = %stage, exit_code = ?output.exit_code, "build stage failed");
                self.emit_error(project, Some(stage), &err);
                return Err(failed(project, stages, err));
            }
        }

        info!(project = %project, "build succeeded");
        self.events.emit(Event::new(
            "build:success",
            json!({
                "project": project.as_str(),
                "message": format!("Project \"{project}\" built and started"),
            }),
        ));
        Ok(BuildResult {
            project: project.clone(),
            stages,
            success: true,
        })
    }

    async fn run_stage(
        &self,
        project: &UnitName,
        stage: BuildStage,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, OrchestratorError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_lines(
            rx,
            self.events.clone(),
            project.clone(),
            stage,
        ));

        let ctx = RunContext::streaming(tx, cancel.clone());
        let result = match stage {
            BuildStage::Generate => self.generator.generate(GenerateScope::Projects, &ctx).await,
            BuildStage::Build => self.compose.build_project(project.as_str(), &ctx).await,
            BuildStage::Up => self.compose.up_project(project.as_str(), &ctx).await,
        };
        drop(ctx);
        let _ = forwarder.await;

        result.map_err(|err| match err {
            ProcessError::Cancelled { .. } => OrchestratorError::Cancelled,
            other => OrchestratorError::BuildStageFailed {
                stage,
                exit_code: None,
                output: other.to_string(),
            },
        })
    }

    fn info_line(&self, project: &UnitName, stage: BuildStage, message: String) {
        self.events
            .emit(build_progress(project, stage, "info", message));
    }

    fn emit_error(&self, project: &UnitName, stage: Option<BuildStage>, err: &OrchestratorError) {
        self.events.emit(Event::new(
            "build:error",
            json!({
                "project": project.as_str(),
                "stage": stage,
                "error": err.to_string(),
                "kind": err.kind(),
            }),
        ));
    }
}

fn failed(project: &UnitName, stages: Vec<StageOutput>, error: OrchestratorError) -> BuildFailure {
    BuildFailure {
        error,
        partial: Some(BuildResult {
            project: project.clone(),
            stages,
            success: false,
        }),
    }
}

fn build_progress(project: &UnitName, stage: BuildStage, stream: &str, message: String) -> Event {
    Event::new(
        "build:progress",
        json!({
            "project": project.as_str(),
            "step": stage,
            "status": "running",
            "stream": stream,
            "message": message,
        }),
    )
}

async fn forward_lines(
    mut rx: mpsc::UnboundedReceiver<OutputLine>,
    events: Arc<dyn EventSink>,
    project: UnitName,
    stage: BuildStage,
) {
    while let Some(line) = rx.recv().await {
        let stream = match line.stream {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        };
        events.emit(build_progress(&project, stage, stream, line.line));
    }
}
