//! Per-execution work directories.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use super::{RepoError, Repository, TMP_DIR, io_error};
use crate::platform::link;
use crate::util::hash::Hash;

/// Default sandbox path of the input tree.
pub const SANDBOX_INPUT: &str = "/in";
/// Default sandbox path the command writes results to.
pub const SANDBOX_OUTPUT: &str = "/out";

/// Segments of a sandbox path, ignoring empty and `.` segments.
pub fn sandbox_segments(path: &str) -> Vec<&str> {
  path.split('/').filter(|s| !s.is_empty() && *s != ".").collect()
}

/// Whether one sandbox path contains the other. The sandbox root contains
/// every path.
pub fn sandbox_paths_overlap(a: &str, b: &str) -> bool {
  let (a, b) = (sandbox_segments(a), sandbox_segments(b));
  a.starts_with(&b) || b.starts_with(&a)
}

/// Resolve a sandbox path such as `/in` against a host directory.
pub fn sandbox_path(root: &Path, path: &str) -> PathBuf {
  sandbox_segments(path)
    .into_iter()
    .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
}

/// Sandbox directory for one task execution.
///
/// Only `env` is exposed to the command. The captured streams and the exit
/// code sit beside it so the command cannot tamper with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workdir {
  pub base: PathBuf,
  /// Directory mounted into the sandbox.
  pub env: PathBuf,
  /// Symlink to the checked out input tree, `env/in` by default.
  pub input: PathBuf,
  /// Where the command leaves its results, `env/out` by default.
  pub output: PathBuf,
  pub exit: PathBuf,
  pub stdout: PathBuf,
  pub stderr: PathBuf,
}

impl Workdir {
  fn at(base: PathBuf, input: &str, output: &str) -> Self {
    let env = base.join("env");
    Self {
      input: sandbox_path(&env, input),
      output: sandbox_path(&env, output),
      exit: base.join("exit"),
      stdout: base.join("stdout"),
      stderr: base.join("stderr"),
      env,
      base,
    }
  }

  /// Exit code recorded by the runner, if any.
  pub async fn read_exit_code(&self) -> Option<i32> {
    let text = fs::read_to_string(&self.exit).await.ok()?;
    text.trim().parse().ok()
  }
}

impl Repository {
  /// Allocate a fresh work directory for the input tree `input_hash`.
  ///
  /// The input is linked at the sandbox path `input` and an empty directory
  /// is created at `output`; neither may contain the other. The input must
  /// already be checked out. Work directories are never removed by the
  /// repository.
  pub async fn make_work_dir(&self, input_hash: &Hash, input: &str, output: &str) -> Result<Workdir, RepoError> {
    let tmp = self.layout_dir(TMP_DIR);
    if sandbox_paths_overlap(input, output) {
      return Err(RepoError::Io {
        path: tmp,
        source: io::Error::new(
          io::ErrorKind::InvalidInput,
          format!("sandbox paths {input} and {output} overlap"),
        ),
      });
    }
    let base = tempfile::Builder::new()
      .prefix(&format!("{}-", input_hash))
      .tempdir_in(&tmp)
      .map_err(io_error(&tmp))?
      .keep();
    let workdir = Workdir::at(base, input, output);

    fs::create_dir(&workdir.env).await.map_err(io_error(&workdir.env))?;
    fs::create_dir_all(&workdir.output).await.map_err(io_error(&workdir.output))?;
    if let Some(parent) = workdir.input.parent() {
      fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }
    link::symlink_dir(&self.mnt_path(input_hash), &workdir.input)
      .await
      .map_err(io_error(&workdir.input))?;
    for file in [&workdir.exit, &workdir.stdout, &workdir.stderr] {
      fs::write(file, b"").await.map_err(io_error(file))?;
    }

    debug!(input = %input_hash, path = ?workdir.base, "allocated work directory");
    Ok(workdir)
  }
}
