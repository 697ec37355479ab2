//! Idempotent link and write primitives.
//!
//! Every operation here treats an existing target as success. Objects are
//! addressed by content, so whoever created the target first wrote the same
//! bytes.

use std::io;
use std::path::Path;

use tokio::fs;
use tracing::debug;

fn is_already_exists(e: &io::Error) -> bool {
  e.kind() == io::ErrorKind::AlreadyExists
}

fn temp_path_in(dir: &Path, prefix: &str) -> io::Result<tempfile::TempPath> {
  Ok(tempfile::Builder::new().prefix(prefix).tempfile_in(dir)?.into_temp_path())
}

fn parent_of(path: &Path) -> io::Result<&Path> {
  path.parent().ok_or_else(|| {
    io::Error::new(
      io::ErrorKind::InvalidInput,
      format!("{} has no parent directory", path.display()),
    )
  })
}

/// Hard-link `src` to `dst`.
pub async fn hard_link(src: &Path, dst: &Path) -> io::Result<()> {
  match fs::hard_link(src, dst).await {
    Err(e) if is_already_exists(&e) => Ok(()),
    other => other,
  }
}

/// Hard-link `src` to `dst`, copying when the two live on different
/// filesystems.
pub async fn hard_link_or_copy(src: &Path, dst: &Path) -> io::Result<()> {
  match hard_link(src, dst).await {
    Err(e) if matches!(e.kind(), io::ErrorKind::CrossesDevices | io::ErrorKind::Unsupported) => {
      debug!(src = ?src, dst = ?dst, "hard link unavailable, copying");
      copy_atomic(src, dst).await
    }
    other => other,
  }
}

/// Copy `src` to `dst` through a temporary sibling, so `dst` never holds a
/// partial file.
pub async fn copy_atomic(src: &Path, dst: &Path) -> io::Result<()> {
  let temp = temp_path_in(parent_of(dst)?, ".copy-")?;
  fs::copy(src, &temp).await?;
  temp.persist(dst).map_err(|e| e.error)
}

/// Write `contents` to `path` through a temporary sibling, replacing any
/// existing file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
  let temp = temp_path_in(parent_of(path)?, ".write-")?;
  fs::write(&temp, contents).await?;
  temp.persist(path).map_err(|e| e.error)
}

#[cfg(unix)]
async fn create_dir_symlink(target: &Path, link: &Path) -> io::Result<()> {
  fs::symlink(target, link).await
}

#[cfg(windows)]
async fn create_dir_symlink(target: &Path, link: &Path) -> io::Result<()> {
  fs::symlink_dir(target, link).await
}

/// Create a directory symlink at `link` pointing to `target`.
pub async fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
  match create_dir_symlink(target, link).await {
    Err(e) if is_already_exists(&e) => Ok(()),
    other => other,
  }
}

/// Point the symlink at `link` to `target`, replacing whatever is there.
///
/// The new link is created under a temporary name and renamed into place.
pub async fn replace_symlink(target: &Path, link: &Path) -> io::Result<()> {
  let parent = parent_of(link)?;
  fs::create_dir_all(parent).await?;

  // Reserve a unique name, then swap the placeholder file for the link.
  let temp = temp_path_in(parent, ".link-")?;
  let temp_link = temp.to_path_buf();
  temp.close()?;

  symlink_dir(target, &temp_link).await?;
  if let Err(e) = fs::rename(&temp_link, link).await {
    let _ = fs::remove_file(&temp_link).await;
    return Err(e);
  }
  Ok(())
}
