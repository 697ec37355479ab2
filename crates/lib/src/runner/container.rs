//! Container runner.
//!
//! Wraps each command in `docker run`. The work directory's `env` is mounted
//! at `/env` and the repository is mounted read-only, both at `/repo` and at
//! its host path so the absolute `env/in` symlink resolves inside the
//! container.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use super::{RunStatus, Runner, RunnerError, run_captured};
use crate::graph::TaskCommand;
use crate::repo::Workdir;

const CONTAINER_ENV: &str = "/env";
const CONTAINER_REPO: &str = "/repo";

#[derive(Debug, Clone)]
pub struct ContainerRunner {
  program: String,
}

impl Default for ContainerRunner {
  fn default() -> Self {
    Self {
      program: "docker".to_string(),
    }
  }
}

fn in_container(path: &str) -> String {
  let trimmed = path.trim_matches('/');
  if trimmed.is_empty() {
    CONTAINER_ENV.to_string()
  } else {
    format!("{CONTAINER_ENV}/{trimmed}")
  }
}

impl ContainerRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Use a docker-compatible CLI such as `podman`.
  pub fn with_program(mut self, program: impl Into<String>) -> Self {
    self.program = program.into();
    self
  }

  /// Arguments passed to the container CLI for `command`.
  pub fn run_args(&self, repo_root: &Path, workdir: &Workdir, command: &TaskCommand) -> Result<Vec<String>, RunnerError> {
    let img = command.img.as_deref().ok_or(RunnerError::MissingImage)?;
    if command.cmd.is_empty() {
      return Err(RunnerError::EmptyCommand);
    }

    let repo = repo_root.display();
    let mut args = vec![
      "run".to_string(),
      "--rm".to_string(),
      "-v".to_string(),
      format!("{repo}:{CONTAINER_REPO}:ro"),
      "-v".to_string(),
      format!("{repo}:{repo}:ro"),
      "-v".to_string(),
      format!("{}:{CONTAINER_ENV}", workdir.env.display()),
      "-w".to_string(),
      in_container(&command.cwd),
    ];
    for (name, value) in [
      ("in", in_container(&command.input)),
      ("out", in_container(&command.output)),
      ("repo", CONTAINER_REPO.to_string()),
    ] {
      args.push("-e".to_string());
      args.push(format!("{name}={value}"));
    }
    args.push(img.to_string());
    args.extend(command.cmd.iter().cloned());
    Ok(args)
  }
}

#[async_trait]
impl Runner for ContainerRunner {
  fn name(&self) -> &str {
    "container"
  }

  async fn run(&self, repo_root: &Path, workdir: &Workdir, command: &TaskCommand) -> Result<RunStatus, RunnerError> {
    let args = self.run_args(repo_root, workdir, command)?;
    info!(program = %self.program, image = ?command.img, cmd = ?command.cmd, "running container");

    let mut cmd = Command::new(&self.program);
    cmd.args(&args);
    run_captured(cmd, &self.program, workdir).await
  }
}
