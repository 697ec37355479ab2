//! Test utilities for fftt-lib.
//!
//! Fixture trees and shell helpers shared by unit tests.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::repo::Repository;

/// Sample source tree used by scanner, repository and evaluator tests.
///
/// Mixes text, json and js files across two levels so that glob filters have
/// both matching and non-matching branches to prune.
pub const SAMPLE_TREE: &[(&str, &str)] = &[
  ("data/t1.txt", "t1"),
  ("data/t2.txt", "t2"),
  ("data/jn1.json", "{j:true}"),
  ("data/j1.js", "console.log('Hi!')"),
  ("data/dir1/t11.txt", "t11"),
  ("data/dir1/t12.txt", "t12"),
  ("data/dir1/jn11.json", "{j:true}"),
  ("data/dir1/j11.js", "console.log('Hi!')"),
  ("data/dir1/dir1txt/t111.txt", "t11"),
  ("data/dir1/dir1txt/t112.txt", "t12"),
  ("data/dir1/dir1json/jn11i.json", "{j:true}"),
  ("data/dir1/dir1js/j11i.js", "console.log('Hi!')"),
  ("data/dir2/t21.txt", "t21"),
  ("data/dir2/t22.txt", "t22"),
  ("data/dir2/jn21.json", "{j:true}"),
  ("data/dir2/j21.js", "console.log('Hi!')"),
  ("data/dir2/dir2txt/t221.txt", "t21"),
  ("data/dir2/dir2txt/t222.txt", "t22"),
  ("data/dir2/dir2json/jn21i.json", "{j:true}"),
  ("data/dir2/dir2js/j12i.js", "console.log('Hi!')"),
];

/// Write `(relative path, content)` pairs under `root`, creating parents.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
  for (relative, content) in files {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }
}

/// Write the sample tree under `root`.
pub fn write_sample_tree(root: &Path) {
  write_files(root, SAMPLE_TREE);
}

/// Returns a command vector running `script` through the system shell.
pub fn shell_cmd(script: &str) -> Vec<String> {
  vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

/// Mark a file executable.
#[cfg(unix)]
pub fn make_executable(path: &Path) {
  use std::os::unix::fs::PermissionsExt;

  let mut perms = fs::metadata(path).unwrap().permissions();
  perms.set_mode(0o755);
  fs::set_permissions(path, perms).unwrap();
}

/// Open a repository in a fresh temporary directory.
///
/// The directory lives as long as the returned guard.
pub async fn open_temp_repo() -> (TempDir, Repository) {
  let temp = TempDir::new().unwrap();
  let repo = Repository::open(temp.path().join("repo")).await.unwrap();
  (temp, repo)
}
