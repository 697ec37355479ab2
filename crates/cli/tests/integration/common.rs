//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

/// Isolated project directory.
///
/// Each test gets its own temporary directory holding the build file, the
/// sources and, after a build, the repository and the build root.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create a project with `fftt.yaml` set to `graph`.
  pub fn with_graph(graph: &str) -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    env.write_file("fftt.yaml", graph);
    env
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Output links of the build tagged `tag`.
  pub fn tag_dir(&self, tag: &str) -> PathBuf {
    self.temp.path().join("repo").join("out").join(tag)
  }

  /// Get a Command for the fftt binary running inside the project, with the
  /// `FFTT_*` overrides cleared.
  pub fn fftt_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("fftt");
    cmd.current_dir(self.temp.path());
    for var in ["FFTT_PARALLELISM", "FFTT_TIMEOUT_SECS", "FFTT_NO_CACHE", "RUST_LOG"] {
      cmd.env_remove(var);
    }
    cmd
  }

  /// Run `fftt build` with JSON output and return the parsed summary.
  pub fn build_json(&self, args: &[&str]) -> Value {
    let output = self
      .fftt_cmd()
      .arg("build")
      .args(args)
      .args(["-o", "json"])
      .assert()
      .success()
      .get_output()
      .stdout
      .clone();
    serde_json::from_slice(&output).unwrap()
  }
}
