use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use stackvo_core::{Settings, UnitKind, UnitName};
use stackvo_orchestrator::{
    BroadcastSink, Collaborators, Event, JobStatus, Orchestrator, OrchestratorError,
};

use crate::error::{io_err, DaemonError};
use crate::paths::{logs_dir, run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Events buffered per subscriber before the slowest one starts lagging.
pub const EVENT_CAPACITY: usize = 1024;

/// Shared by every client connection.
#[derive(Clone)]
struct DaemonState {
    home: PathBuf,
    orchestrator: Orchestrator,
    events: Arc<BroadcastSink>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, settings: Settings) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(async move {
        let events = Arc::new(BroadcastSink::new(EVENT_CAPACITY));
        let collaborators = Collaborators::production(&settings, events.clone())?;
        tracing::info!(root = %settings.root.display(), "stackvo daemon starting");
        let orchestrator = Orchestrator::new(settings, collaborators);
        run(home.to_path_buf(), orchestrator, events).await
    })
}

/// Serve `orchestrator` on the daemon socket under `home` until shutdown.
///
/// `events` must be the sink the orchestrator emits into.
pub async fn run(
    home: PathBuf,
    orchestrator: Orchestrator,
    events: Arc<BroadcastSink>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let state = DaemonState {
        home: home.clone(),
        orchestrator,
        events,
        shutdown_tx: shutdown_tx.clone(),
        started_at_unix: unix_seconds_now(),
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = socket_server_task(state, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, rotation_result, signal_result) =
        tokio::join!(socket_handle, rotation_handle, signal_handle);

    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("stackvo daemon stopped");
    Ok(())
}

async fn socket_server_task(
    state: DaemonState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, state: DaemonState) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };
        tracing::debug!(cmd = %request.cmd, "request");

        match request.cmd.as_str() {
            "subscribe" => {
                // Subscribe before acknowledging so nothing emitted after the
                // ack is missed.
                let rx = state.events.subscribe();
                write_response(&mut writer, &DaemonResponse::ok(json!({ "subscribed": true })))
                    .await?;
                return stream_events(
                    &mut writer,
                    rx,
                    &request.topics,
                    state.shutdown_tx.subscribe(),
                )
                .await;
            }
            "shutdown" => {
                write_response(&mut writer, &DaemonResponse::ok(json!({ "stopping": true })))
                    .await?;
                let _ = state.shutdown_tx.send(());
                break;
            }
            _ => {
                let response = match dispatch(&state, &request).await {
                    Ok(data) => DaemonResponse::ok(data),
                    Err(err) => {
                        tracing::warn!(cmd = %request.cmd, kind = err.kind(), error = %err, "request failed");
                        DaemonResponse::failure(&err)
                    }
                };
                write_response(&mut writer, &response).await?;
            }
        }
    }

    Ok(())
}

async fn dispatch(state: &DaemonState, request: &DaemonRequest) -> Result<Value, OrchestratorError> {
    let orchestrator = &state.orchestrator;
    match request.cmd.as_str() {
        "status" => Ok(build_status_payload(state).await),
        "list" => match request.kind {
            Some(kind) => Ok(json!(orchestrator.list_units(kind).await?)),
            None => {
                let mut all = serde_json::Map::new();
                for kind in UnitKind::ALL {
                    let units = orchestrator.list_units(kind).await?;
                    all.insert(kind.plural().to_string(), json!(units));
                }
                Ok(Value::Object(all))
            }
        },
        "enable" => {
            let (kind, name) = unit_args(request)?;
            Ok(json!(orchestrator.enable(kind, &name).await?))
        }
        "disable" => {
            let (kind, name) = unit_args(request)?;
            Ok(json!(orchestrator.disable(kind, &name).await?))
        }
        "start" => {
            let (kind, name) = unit_args(request)?;
            Ok(json!(orchestrator.start(kind, &name).await?))
        }
        "stop" => {
            let (kind, name) = unit_args(request)?;
            Ok(json!(orchestrator.stop(kind, &name).await?))
        }
        "restart" => {
            let (kind, name) = unit_args(request)?;
            Ok(json!(orchestrator.restart(kind, &name).await?))
        }
        "deps" => {
            let name = name_arg(request)?;
            Ok(json!(orchestrator.dependency_report(&name).await))
        }
        "build" => {
            let name = name_arg(request)?;
            let job = orchestrator.build(&name)?;
            let job = if request.wait {
                orchestrator.wait_job(&job.id).await?
            } else {
                job
            };
            Ok(json!(job))
        }
        "create_project" => {
            let project = request.project.as_ref().ok_or_else(|| missing("project"))?;
            let (config, job) = orchestrator.create_project(project).await?;
            let job = if request.wait {
                orchestrator.wait_job(&job.id).await?
            } else {
                job
            };
            Ok(json!({ "project": config, "job": job }))
        }
        "delete_project" => {
            let name = name_arg(request)?;
            orchestrator.delete_project(&name).await?;
            Ok(json!({ "deleted": name }))
        }
        "job" => {
            let id = request.id.as_deref().ok_or_else(|| missing("id"))?;
            Ok(json!(orchestrator.job(id)?))
        }
        "jobs" => Ok(json!(orchestrator.jobs())),
        "cancel" => {
            let id = request.id.as_deref().ok_or_else(|| missing("id"))?;
            Ok(json!(orchestrator.cancel_job(id)?))
        }
        other => Err(OrchestratorError::InvalidRequest(format!(
            "unknown command '{other}'"
        ))),
    }
}

fn unit_args(request: &DaemonRequest) -> Result<(UnitKind, UnitName), OrchestratorError> {
    let kind = request.kind.ok_or_else(|| missing("kind"))?;
    Ok((kind, name_arg(request)?))
}

fn name_arg(request: &DaemonRequest) -> Result<UnitName, OrchestratorError> {
    request
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .map(UnitName::from)
        .ok_or_else(|| missing("name"))
}

fn missing(field: &str) -> OrchestratorError {
    OrchestratorError::InvalidRequest(format!("missing field '{field}'"))
}

/// Forward matching events until the client goes away or the daemon stops.
async fn stream_events(
    writer: &mut OwnedWriteHalf,
    mut rx: broadcast::Receiver<Event>,
    topics: &[String],
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            received = rx.recv() => match received {
                Ok(event) => {
                    if !topic_matches(topics, &event.topic) {
                        continue;
                    }
                    if write_line(writer, &event).await.is_err() {
                        tracing::debug!("subscriber disconnected");
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagging, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

fn topic_matches(filters: &[String], topic: &str) -> bool {
    filters.is_empty() || filters.iter().any(|f| topic.starts_with(f.as_str()))
}

async fn build_status_payload(state: &DaemonState) -> Value {
    let orchestrator = &state.orchestrator;

    let mut units = serde_json::Map::new();
    for kind in UnitKind::ALL {
        let entry = match orchestrator.list_units(kind).await {
            Ok(list) => json!({
                "total": list.len(),
                "configured": list.iter().filter(|u| u.configured).count(),
                "running": list.iter().filter(|u| u.running).count(),
            }),
            Err(err) => json!({ "error": err.to_string() }),
        };
        units.insert(kind.plural().to_string(), entry);
    }

    let containers = match orchestrator.runtime_summary().await {
        Ok(summary) => json!(summary),
        Err(err) => json!({ "error": err.to_string() }),
    };

    let active_jobs = orchestrator
        .jobs()
        .iter()
        .filter(|job| matches!(job.status, JobStatus::Queued | JobStatus::Running))
        .count();

    json!({
        "running": true,
        "started_at_unix": state.started_at_unix,
        "socket": socket_path(&state.home).display().to_string(),
        "root": orchestrator.settings().root.display().to_string(),
        "units": units,
        "containers": containers,
        "active_jobs": active_jobs,
    })
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                let _ = tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await;
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [run_dir(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    write_line(writer, response).await
}

async fn write_line(
    writer: &mut OwnedWriteHalf,
    value: &impl serde::Serialize,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_vec(value)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_filter_matches_everything() {
        assert!(topic_matches(&[], "service:progress"));
    }

    #[test]
    fn filter_matches_by_prefix() {
        let filters = vec!["build:".to_string(), "tool:enabled".to_string()];
        assert!(topic_matches(&filters, "build:progress"));
        assert!(topic_matches(&filters, "tool:enabled"));
        assert!(!topic_matches(&filters, "service:enabled"));
    }

    #[test]
    fn unit_args_require_kind_and_name() {
        let err = unit_args(&DaemonRequest::new("enable").with_name("redis")).unwrap_err();
        assert_eq!(err.to_string(), "invalid request: missing field 'kind'");

        let blank = DaemonRequest::unit("enable", UnitKind::Service, "  ");
        assert!(unit_args(&blank).is_err());

        let (kind, name) =
            unit_args(&DaemonRequest::unit("enable", UnitKind::Tool, "adminer")).unwrap();
        assert_eq!(kind, UnitKind::Tool);
        assert_eq!(name.as_str(), "adminer");
    }

    #[test]
    fn stale_socket_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        fs::write(&socket, "").unwrap();

        prepare_socket_for_bind(&socket).unwrap();
        assert!(!socket.exists());
    }

    #[test]
    fn runtime_dirs_are_created() {
        let home = TempDir::new().unwrap();
        ensure_runtime_dirs(home.path()).unwrap();
        assert!(run_dir(home.path()).is_dir());
        assert!(logs_dir(home.path()).is_dir());
    }
}
