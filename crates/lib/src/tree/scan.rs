//! Filtered directory scanning.

use std::path::Path;
use std::time::UNIX_EPOCH;

use futures::future::BoxFuture;
use tokio::fs;
use tracing::trace;

use super::{TreeError, TreeNode, TreeNodeMap};
use crate::filter::{FilterId, NameFilter};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TreeError + '_ {
  move |source| TreeError::Io {
    path: path.to_path_buf(),
    source,
  }
}

fn mtime_ticks(metadata: &std::fs::Metadata) -> u64 {
  metadata
    .modified()
    .ok()
    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
    .map(|d| d.as_millis() as u64)
    .unwrap_or(0)
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode() & 0o100 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
  false
}

/// Scan the directory at `path`, keeping only entries selected by `filter`.
///
/// Symbolic links are followed. Directories reached through a volatile match
/// are dropped when nothing beneath them survives. Returned nodes are
/// unhashed.
pub async fn scan(path: &Path, filter: &NameFilter) -> Result<TreeNodeMap, TreeError> {
  scan_at(path, filter, filter.root()).await
}

/// Like `scan`, but wraps the result in a directory node.
pub async fn scan_tree(path: &Path, filter: &NameFilter) -> Result<TreeNode, TreeError> {
  let metadata = fs::metadata(path).await.map_err(io_error(path))?;
  let children = scan(path, filter).await?;
  Ok(TreeNode::dir(children).with_mtime(mtime_ticks(&metadata)))
}

fn scan_at<'a>(path: &'a Path, filter: &'a NameFilter, at: FilterId) -> BoxFuture<'a, Result<TreeNodeMap, TreeError>> {
  Box::pin(async move {
    let mut children = TreeNodeMap::new();
    let mut entries = fs::read_dir(path).await.map_err(io_error(path))?;

    while let Some(entry) = entries.next_entry().await.map_err(io_error(path))? {
      let entry_path = entry.path();
      let name = entry
        .file_name()
        .into_string()
        .map_err(|_| TreeError::InvalidName { path: entry_path.clone() })?;
      let metadata = fs::metadata(&entry_path).await.map_err(io_error(&entry_path))?;
      let is_dir = metadata.is_dir();

      let Some(m) = filter.apply(at, &name, is_dir) else {
        continue;
      };

      if is_dir {
        let grandchildren = scan_at(&entry_path, filter, m.next).await?;
        if m.volatile && grandchildren.is_empty() {
          trace!(path = %entry_path.display(), "pruned empty volatile match");
          continue;
        }
        children.insert(m.name, TreeNode::dir(grandchildren).with_mtime(mtime_ticks(&metadata)));
      } else if metadata.is_file() {
        children.insert(m.name, TreeNode::file(is_executable(&metadata), mtime_ticks(&metadata)));
      } else {
        return Err(TreeError::UnsupportedEntry { path: entry_path });
      }
    }

    Ok(children)
  })
}
