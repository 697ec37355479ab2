//! Host process runner.
//!
//! Commands run as direct children with a cleared environment. The sandbox
//! root is the work directory's `env`, so `/in` and `/out` in a command's
//! settings resolve to `env/in` and `env/out`.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

use super::{RunStatus, Runner, RunnerError, run_captured};
use crate::graph::TaskCommand;
use crate::repo::{Workdir, sandbox_path};

/// `PATH` given to every command.
pub const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Fixed epoch for reproducible timestamps (1980-01-01).
const SOURCE_DATE_EPOCH: &str = "315532800";

/// Runs commands directly on the host.
///
/// The image field of a command is ignored.
#[derive(Debug, Clone)]
pub struct LocalRunner {
  path: String,
}

impl Default for LocalRunner {
  fn default() -> Self {
    Self {
      path: DEFAULT_PATH.to_string(),
    }
  }
}

impl LocalRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Override the `PATH` handed to commands.
  pub fn with_path(mut self, path: impl Into<String>) -> Self {
    self.path = path.into();
    self
  }
}

#[async_trait]
impl Runner for LocalRunner {
  fn name(&self) -> &str {
    "local"
  }

  async fn run(&self, repo_root: &Path, workdir: &Workdir, command: &TaskCommand) -> Result<RunStatus, RunnerError> {
    let (program, args) = command.cmd.split_first().ok_or(RunnerError::EmptyCommand)?;
    if let Some(img) = &command.img {
      debug!(img, "local runner ignores image");
    }

    // Scratch space outside env so it never ends up in the outputs.
    let tmp = workdir.base.join("tmp");
    fs::create_dir_all(&tmp).await.map_err(|source| RunnerError::Io {
      path: tmp.clone(),
      source,
    })?;

    let cwd = sandbox_path(&workdir.env, &command.cwd);
    let mut cmd = Command::new(program);
    cmd
      .args(args)
      .current_dir(&cwd)
      .env_clear()
      .env("PATH", &self.path)
      .env("HOME", "/homeless-shelter")
      .env("TMPDIR", &tmp)
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
      .env("in", &workdir.input)
      .env("out", &workdir.output)
      .env("repo", repo_root);

    info!(program = %program, args = ?args, cwd = ?cwd, "running command");
    run_captured(cmd, program, workdir).await
  }
}
