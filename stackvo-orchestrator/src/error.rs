//! Error types for stackvo-orchestrator.

use thiserror::Error;

use stackvo_core::{CoreError, UnitName};

use crate::build::BuildStage;

/// Failures surfaced by lifecycle, registry and build operations.
///
/// Every variant maps to a stable [`OrchestratorError::kind`] string that the
/// daemon returns to callers alongside the message.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The `.env` file (or another required config source) could not be read.
    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(#[source] CoreError),

    /// Writing or verifying an enable flag failed.
    #[error("failed to update {key}: {reason}")]
    ConfigWriteFailed { key: String, reason: String },

    /// A required dependency could not be enabled.
    #[error("required dependency {dependency} failed to start: {cause}")]
    DependencyFailed {
        dependency: UnitName,
        #[source]
        cause: Box<OrchestratorError>,
    },

    /// The dependency graph loops back on itself.
    #[error("dependency cycle: {}", format_path(.path))]
    DependencyCycle { path: Vec<UnitName> },

    /// The artifact generator exited unsuccessfully or could not be run.
    #[error("artifact generation failed: {0}")]
    GenerateFailed(String),

    /// A runtime or compose operation on a container failed.
    #[error("container operation on {container} failed: {reason}")]
    ContainerOperationFailed { container: String, reason: String },

    /// A build stage exited non-zero.
    #[error("build stage {stage} failed (exit code {}): {}", format_code(.exit_code), last_line(.output))]
    BuildStageFailed {
        stage: BuildStage,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::ConfigUnavailable(_) => "config_unavailable",
            OrchestratorError::ConfigWriteFailed { .. } => "config_write_failed",
            OrchestratorError::DependencyFailed { .. } => "dependency_failed",
            OrchestratorError::DependencyCycle { .. } => "dependency_cycle",
            OrchestratorError::GenerateFailed(_) => "generate_failed",
            OrchestratorError::ContainerOperationFailed { .. } => "container_operation_failed",
            OrchestratorError::BuildStageFailed { .. } => "build_stage_failed",
            OrchestratorError::NotFound(_) => "not_found",
            OrchestratorError::InvalidRequest(_) => "invalid_request",
            OrchestratorError::Cancelled => "cancelled",
        }
    }

    pub(crate) fn container(container: impl Into<String>, reason: impl ToString) -> Self {
        OrchestratorError::ContainerOperationFailed {
            container: container.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<CoreError> for OrchestratorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidProject(msg) => OrchestratorError::InvalidRequest(msg),
            CoreError::ProjectExists { name } => {
                OrchestratorError::InvalidRequest(format!("project \"{name}\" already exists"))
            }
            CoreError::ProjectNotFound { name } => {
                OrchestratorError::NotFound(format!("project \"{name}\""))
            }
            other => OrchestratorError::ConfigUnavailable(other),
        }
    }
}

fn format_path(path: &[UnitName]) -> String {
    path.iter()
        .map(UnitName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn last_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
}

/// Errors reported by a [`crate::runtime::ContainerRuntime`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The container, image or volume does not exist.
    #[error("{0} not found")]
    NotFound(String),

    #[error("container runtime error: {0}")]
    Api(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}
