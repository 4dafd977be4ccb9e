//! Error types for stackvo-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration, dependency and project storage.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path that was being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `stackvo.yaml` exists but could not be parsed.
    #[error("failed to parse settings at {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A JSON document (dependency book, `stackvo.json`) could not be parsed.
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (write path).
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A project name or definition was rejected before touching disk.
    #[error("invalid project: {0}")]
    InvalidProject(String),

    /// The project directory already exists.
    #[error("project \"{name}\" already exists")]
    ProjectExists { name: String },

    /// The project directory does not exist.
    #[error("project \"{name}\" does not exist")]
    ProjectNotFound { name: String },
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
