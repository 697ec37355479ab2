//! Object immutability.
//!
//! Stored objects are write-protected once they land in `obj/`, so a hard
//! link handed out to a task or a checkout can never be used to corrupt the
//! content behind a hash.
//!
//! ## Platform Behavior
//!
//! - **Unix**: files become 0444, executables 0555
//! - **Other**: the read-only attribute is set

use std::path::Path;

use tokio::fs;
use tracing::trace;

/// Error during immutability operations.
#[derive(Debug, thiserror::Error)]
pub enum ImmutableError {
  #[error("failed to set permissions on {path}: {source}")]
  SetPermissions {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to read metadata for {path}: {source}")]
  Metadata {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// Write-protect a stored file object.
///
/// Directories are left alone: only file content is shared through links.
pub async fn make_immutable(path: &Path, is_exe: bool) -> Result<(), ImmutableError> {
  let metadata = fs::metadata(path).await.map_err(|e| ImmutableError::Metadata {
    path: path.display().to_string(),
    source: e,
  })?;

  if metadata.is_dir() {
    return Ok(());
  }

  let perms = read_only_permissions(metadata.permissions(), is_exe);
  trace!(path = ?path, is_exe, "write-protecting object");
  fs::set_permissions(path, perms)
    .await
    .map_err(|e| ImmutableError::SetPermissions {
      path: path.display().to_string(),
      source: e,
    })
}

#[cfg(unix)]
fn read_only_permissions(mut perms: std::fs::Permissions, is_exe: bool) -> std::fs::Permissions {
  use std::os::unix::fs::PermissionsExt;

  perms.set_mode(if is_exe { 0o555 } else { 0o444 });
  perms
}

#[cfg(not(unix))]
fn read_only_permissions(mut perms: std::fs::Permissions, _is_exe: bool) -> std::fs::Permissions {
  perms.set_readonly(true);
  perms
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::TempDir;

  use super::*;

  #[tokio::test]
  async fn immutable_prevents_write() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("object");
    fs::write(&file, "original").unwrap();

    make_immutable(&file, false).await.unwrap();

    assert!(fs::metadata(&file).unwrap().permissions().readonly());
  }

  #[tokio::test]
  async fn immutable_missing_path_fails() {
    let temp = TempDir::new().unwrap();
    let err = make_immutable(&temp.path().join("absent"), false).await.unwrap_err();
    assert!(matches!(err, ImmutableError::Metadata { .. }));
  }

  #[tokio::test]
  async fn immutable_skips_directories() {
    let temp = TempDir::new().unwrap();
    make_immutable(temp.path(), false).await.unwrap();
    assert!(!fs::metadata(temp.path()).unwrap().permissions().readonly());
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn immutable_sets_modes() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data.txt");
    let script = temp.path().join("script.sh");
    fs::write(&data, "content").unwrap();
    fs::write(&script, "#!/bin/sh\necho hello").unwrap();

    make_immutable(&data, false).await.unwrap();
    make_immutable(&script, true).await.unwrap();

    assert_eq!(fs::metadata(&data).unwrap().permissions().mode() & 0o777, 0o444);
    assert_eq!(fs::metadata(&script).unwrap().permissions().mode() & 0o777, 0o555);
  }
}
