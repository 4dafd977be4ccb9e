//! Stackvo core library: domain types, persisted configuration, naming, errors.
//!
//! Public API surface:
//! - [`types`]: unit kinds, names and the [`Unit`] view
//! - [`env_file`]: the `.env` configuration store
//! - [`dependencies`]: per-unit dependency specifications
//! - [`project`]: on-disk project definitions (`stackvo.json`)
//! - [`settings`]: controller settings (`stackvo.yaml` + environment)
//! - [`naming`]: container/image/volume naming convention
//! - [`error`]: [`CoreError`]

pub mod dependencies;
pub mod env_file;
pub mod error;
pub mod naming;
pub mod project;
pub mod settings;
pub mod types;

pub use dependencies::{DependencyBook, DependencySpec};
pub use env_file::{EnvDocument, EnvFile};
pub use error::CoreError;
pub use naming::Naming;
pub use project::{NewProject, ProjectConfig, ProjectRuntime};
pub use settings::Settings;
pub use types::{NetworkInfo, PortBinding, Unit, UnitKind, UnitName};
