//! `docker compose` invocations for units and projects.

use std::path::PathBuf;

use async_trait::async_trait;

use stackvo_core::Settings;

use crate::process::{self, CommandOutput, CommandSpec, ProcessError, RunContext};

/// What compose should bring up for a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeTarget {
    pub profile: String,
    pub service: String,
    /// Rebuild images before starting (`--build`).
    pub build: bool,
}

#[async_trait]
pub trait Compose: Send + Sync {
    /// `up -d [--build] <service>` under `--profile <profile>`.
    async fn up(&self, target: &ComposeTarget, ctx: &RunContext)
        -> Result<CommandOutput, ProcessError>;

    /// `down <service>` under `--profile <profile>`.
    async fn down(&self, target: &ComposeTarget, ctx: &RunContext)
        -> Result<CommandOutput, ProcessError>;

    /// `-f <projects file> build <project>`.
    async fn build_project(&self, project: &str, ctx: &RunContext)
        -> Result<CommandOutput, ProcessError>;

    /// `-f <projects file> up -d --no-build <project>`.
    async fn up_project(&self, project: &str, ctx: &RunContext)
        -> Result<CommandOutput, ProcessError>;
}

/// Runs the configured compose command from the stack root.
pub struct DockerCompose {
    command: Vec<String>,
    root: PathBuf,
    env_file: PathBuf,
    unit_files: Vec<PathBuf>,
    projects_file: PathBuf,
}

impl DockerCompose {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            command: settings.compose_command.clone(),
            root: settings.root.clone(),
            env_file: settings.env_file_path(),
            unit_files: settings.compose_file_paths(),
            projects_file: settings.projects_compose_path(),
        }
    }

    fn base(&self) -> CommandSpec {
        let mut parts = self.command.iter();
        let program = parts.next().map(String::as_str).unwrap_or("docker");
        CommandSpec::new(program, &self.root).args(parts.cloned())
    }

    fn unit_command(&self, target: &ComposeTarget) -> CommandSpec {
        let mut spec = self
            .base()
            .arg("--env-file")
            .arg(self.env_file.to_string_lossy());
        for file in &self.unit_files {
            spec = spec.arg("-f").arg(file.to_string_lossy());
        }
        spec.arg("--profile").arg(&target.profile)
    }

    pub fn up_command(&self, target: &ComposeTarget) -> CommandSpec {
        let spec = self.unit_command(target).arg("up").arg("-d");
        let spec = if target.build { spec.arg("--build") } else { spec };
        spec.arg(&target.service)
    }

    pub fn down_command(&self, target: &ComposeTarget) -> CommandSpec {
        self.unit_command(target).arg("down").arg(&target.service)
    }

    fn project_command(&self) -> CommandSpec {
        self.base()
            .arg("-f")
            .arg(self.projects_file.to_string_lossy())
    }

    pub fn build_project_command(&self, project: &str) -> CommandSpec {
        self.project_command().arg("build").arg(project)
    }

    pub fn up_project_command(&self, project: &str) -> CommandSpec {
        self.project_command()
            .args(["up", "-d", "--no-build"])
            .arg(project)
    }
}

#[async_trait]
impl Compose for DockerCompose {
    async fn up(
        &self,
        target: &ComposeTarget,
        ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError> {
        process::run(&self.up_command(target), ctx).await
    }

    async fn down(
        &self,
        target: &ComposeTarget,
        ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError> {
        process::run(&self.down_command(target), ctx).await
    }

    async fn build_project(
        &self,
        project: &str,
        ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError> {
        process::run(&self.build_project_command(project), ctx).await
    }

    async fn up_project(
        &self,
        project: &str,
        ctx: &RunContext,
    ) -> Result<CommandOutput, ProcessError> {
        process::run(&self.up_project_command(project), ctx).await
    }
}
