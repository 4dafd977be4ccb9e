//! External process execution with line streaming and cancellation.
//!
//! stdout and stderr are read concurrently line by line. Each line is
//! forwarded to an optional channel as it arrives and also captured for the
//! returned [`CommandOutput`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

pub type LineSender = mpsc::UnboundedSender<OutputLine>;

/// Where a run reports its output and how it can be stopped.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub lines: Option<LineSender>,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// No streaming, never cancelled.
    pub fn quiet() -> Self {
        Self::default()
    }

    pub fn streaming(lines: LineSender, cancel: CancellationToken) -> Self {
        Self {
            lines: Some(lines),
            cancel,
        }
    }
}

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `program arg1 arg2`, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stderr when non-empty, otherwise stdout.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
}

/// Run `spec` to completion, streaming lines into `ctx.lines`.
///
/// A non-zero exit is not an error here; callers inspect
/// [`CommandOutput::exit_code`]. Cancellation kills the child.
pub async fn run(spec: &CommandSpec, ctx: &RunContext) -> Result<CommandOutput, ProcessError> {
    let command = spec.display();
    debug!(command = %command, cwd = %spec.cwd.display(), "spawning");

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            command: command.clone(),
            source,
        })?;

    let stdout_task = child
        .stdout
        .take()
        .map(|pipe| pump(pipe, OutputStream::Stdout, ctx.lines.clone()));
    let stderr_task = child
        .stderr
        .take()
        .map(|pipe| pump(pipe, OutputStream::Stderr, ctx.lines.clone()));

    let status = tokio::select! {
        _ = ctx.cancel.cancelled() => {
            warn!(command = %command, "cancelled, killing process");
            let _ = child.kill().await;
            None
        }
        status = child.wait() => Some(status.map_err(|source| ProcessError::Wait {
            command: command.clone(),
            source,
        })?),
    };

    let Some(status) = status else {
        // Grandchildren may still hold the pipes open.
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            task.abort();
        }
        return Err(ProcessError::Cancelled { command });
    };

    Ok(CommandOutput {
        exit_code: status.code(),
        stdout: collect(stdout_task).await,
        stderr: collect(stderr_task).await,
    })
}

fn pump<R>(pipe: R, stream: OutputStream, tx: Option<LineSender>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut captured = String::new();
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            captured.push_str(&line);
            captured.push('\n');
            if let Some(tx) = &tx {
                let _ = tx.send(OutputLine { stream, line });
            }
        }
        captured
    })
}

async fn collect(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Convenience for `sh -c <script>` in `cwd`.
pub fn shell(script: &str, cwd: &Path) -> CommandSpec {
    CommandSpec::new("sh", cwd).arg("-c").arg(script)
}
