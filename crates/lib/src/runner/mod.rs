//! Sandboxed command execution.
//!
//! A runner executes a task's command against a prepared [`Workdir`]. It
//! streams the command's stdout and stderr into the work directory's files,
//! records the numeric exit code in `exit`, and returns the status. Deciding
//! what a non-zero status means is left to the caller.
//!
//! # Submodules
//!
//! - [`local`] - isolated child process on the host
//! - [`container`] - `docker run` with the work directory mounted

pub mod container;
pub mod local;

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::graph::TaskCommand;
use crate::repo::Workdir;

pub use container::ContainerRunner;
pub use local::LocalRunner;

/// Exit status of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatus {
  /// Exit code; `128 + signal` for commands killed by a signal.
  pub code: i32,
}

impl RunStatus {
  pub fn success(&self) -> bool {
    self.code == 0
  }
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.code)
  }
}

impl From<ExitStatus> for RunStatus {
  fn from(status: ExitStatus) -> Self {
    #[cfg(unix)]
    let signal = {
      use std::os::unix::process::ExitStatusExt;
      status.signal()
    };
    #[cfg(not(unix))]
    let signal: Option<i32> = None;

    let code = status.code().or(signal.map(|s| 128 + s)).unwrap_or(-1);
    Self { code }
  }
}

/// Errors from launching or supervising a command.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
  #[error("failed to launch {program}: {source}")]
  Launch {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command exited with status {status}")]
  ExitStatus { status: RunStatus },

  #[error("command timed out after {0}s")]
  Timeout(u64),

  #[error("the container runner requires an image")]
  MissingImage,

  #[error("command is empty")]
  EmptyCommand,

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Executes task commands.
#[async_trait]
pub trait Runner: Send + Sync {
  /// Short name for logs.
  fn name(&self) -> &str;

  /// Run `command` in `workdir`. `repo_root` is made available read-only.
  async fn run(&self, repo_root: &Path, workdir: &Workdir, command: &TaskCommand) -> Result<RunStatus, RunnerError>;
}


fn create_capture(path: &Path) -> Result<File, RunnerError> {
  File::create(path).map_err(|source| RunnerError::Io {
    path: path.to_path_buf(),
    source,
  })
}

/// Spawn `command` with its output captured into `workdir`, wait for it, and
/// record the exit code.
///
/// The child is killed if the returned future is dropped, which is how
/// deadlines are enforced.
pub(crate) async fn run_captured(mut command: Command, program: &str, workdir: &Workdir) -> Result<RunStatus, RunnerError> {
  command
    .stdin(Stdio::null())
    .stdout(Stdio::from(create_capture(&workdir.stdout)?))
    .stderr(Stdio::from(create_capture(&workdir.stderr)?))
    .kill_on_drop(true);

  let status: RunStatus = command
    .status()
    .await
    .map_err(|source| RunnerError::Launch {
      program: program.to_string(),
      source,
    })?
    .into();

  fs::write(&workdir.exit, status.to_string())
    .await
    .map_err(|source| RunnerError::Io {
      path: workdir.exit.clone(),
      source,
    })?;

  debug!(program, code = status.code, "command finished");
  Ok(status)
}
