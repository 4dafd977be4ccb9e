use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime and its socket protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Core(#[from] stackvo_core::CoreError),

    #[error(transparent)]
    Orchestrator(#[from] stackvo_orchestrator::OrchestratorError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    /// The daemon answered with `ok: false`.
    #[error("{message}")]
    Remote { kind: String, message: String },

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

impl DaemonError {
    /// The error kind reported by the daemon, if the failure came from it.
    pub fn remote_kind(&self) -> Option<&str> {
        match self {
            DaemonError::Remote { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
