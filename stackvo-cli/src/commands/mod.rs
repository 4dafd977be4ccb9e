pub mod daemon;
pub mod events;
pub mod project;
pub mod status;
pub mod units;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;

use stackvo_daemon::{DaemonError, DaemonRequest};

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Send `request` to the running daemon and return its payload.
pub fn call(request: &DaemonRequest) -> Result<Value> {
    let home = home_dir()?;
    stackvo_daemon::request(&home, request).map_err(|err| match err {
        DaemonError::DaemonNotRunning { .. } => {
            anyhow!("daemon is not running; start it with `stackvo daemon start`")
        }
        other => anyhow!(other).context(format!("'{}' failed", request.cmd)),
    })
}

/// Decode a daemon payload into a typed value.
pub fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).with_context(|| format!("unexpected {what} payload from daemon"))
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}
