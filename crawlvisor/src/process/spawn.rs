//! Worker process spawning.
//!
//! Workers are spawned with:
//! - stdin closed, stdout and stderr piped
//! - their own process group, so a terminal interrupt reaches the supervisor
//!   first and the supervisor decides how to stop them
//! - a single merged line stream of both output pipes

use std::io;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::wrappers::SplitStream;
use tokio_stream::{Stream, StreamExt};

/// Merged stdout/stderr lines of a worker.
pub type OutputStream = Pin<Box<dyn Stream<Item = io::Result<String>> + Send>>;

/// Configuration options for spawning a process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// The program to execute.
    pub program: String,

    /// Arguments to pass to the program.
    pub args: Vec<String>,
}

impl ProcessOptions {
    /// Create new options for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// A freshly spawned worker.
pub struct SpawnedProcess {
    pub child: Child,
    pub pid: u32,
    /// Taken by the log collector; `None` once claimed.
    pub output: Option<OutputStream>,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.pid)
            .field("output", &self.output.is_some())
            .finish_non_exhaustive()
    }
}

/// Spawn a worker process.
///
/// The child is not waited on here; the caller owns the handle and is
/// responsible for reaping it.
pub fn spawn(options: &ProcessOptions) -> Result<SpawnedProcess> {
    let mut cmd = Command::new(&options.program);
    cmd.args(&options.args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn process: {}", options.program))?;

    let Some(pid) = child.id() else {
        anyhow::bail!("Process {} exited before its pid was read", options.program);
    };

    let output = match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => {
            Some(Box::pin(lines(stdout).merge(lines(stderr))) as OutputStream)
        }
        (Some(stdout), None) => Some(Box::pin(lines(stdout)) as OutputStream),
        (None, Some(stderr)) => Some(Box::pin(lines(stderr)) as OutputStream),
        (None, None) => None,
    };

    Ok(SpawnedProcess { child, pid, output })
}

/// Newline-separated lines of `reader`. Bytes that are not UTF-8 become
/// replacement characters instead of failing the stream.
fn lines<R>(reader: R) -> impl Stream<Item = io::Result<String>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    SplitStream::new(BufReader::new(reader).split(b'\n')).map(|chunk| {
        chunk.map(|bytes| {
            let line = String::from_utf8_lossy(&bytes);
            line.strip_suffix('\r').unwrap_or(&line).to_string()
        })
    })
}
