//! Storing files, directories and trees.

use std::path::{Path, PathBuf};

use futures::future::{BoxFuture, try_join_all};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, trace};

use super::{DirEntries, RepoError, Repository, io_error};
use crate::platform::immutable::make_immutable;
use crate::platform::link;
use crate::tree::{TreeNode, TreeNodeMap};
use crate::util::hash::{Hash, HashKind, HashSpec, hash_reader, hash_structured};

/// Hash a directory listing the way `store_dir` does, without storing it.
pub fn dir_hash(entries: &DirEntries, is_link: bool) -> Result<Hash, RepoError> {
  Ok(hash_structured(&HashSpec::map(), &entries_value(entries), HashKind::for_dir(is_link))?)
}

fn entries_value(entries: &DirEntries) -> Value {
  Value::Object(
    entries
      .iter()
      .map(|(name, hash)| (name.clone(), Value::String(hash.to_string())))
      .collect(),
  )
}

impl Repository {
  /// Store the file at `path` as an `F` or `X` object.
  ///
  /// With `link` the object is a hard link to `path`, which must not change
  /// afterwards. Without it the bytes are copied.
  pub async fn store_file(&self, path: &Path, is_exe: bool, link: bool) -> Result<Hash, RepoError> {
    let file = fs::File::open(path).await.map_err(io_error(path))?;
    let hash = hash_reader(file, HashKind::for_file(is_exe)).await?;

    if self.has_object(&hash).await {
      trace!(hash = %hash, path = ?path, "file object already stored");
      return Ok(hash);
    }

    let target = self.object_path(&hash);
    let result = if link {
      link::hard_link_or_copy(path, &target).await
    } else {
      link::copy_atomic(path, &target).await
    };
    result.map_err(io_error(&target))?;
    make_immutable(&target, is_exe).await?;

    debug!(hash = %hash, path = ?path, link, "stored file");
    Ok(hash)
  }

  /// Store a directory whose entries are `children`.
  ///
  /// Unhashed children are stored first, relative to `path`, and their hashes
  /// recorded on the nodes.
  pub async fn store_dir(
    &self,
    path: &Path,
    is_link: bool,
    children: &mut TreeNodeMap,
    link: bool,
  ) -> Result<Hash, RepoError> {
    let stored = try_join_all(children.iter_mut().map(|(name, child)| {
      let child_path = path.join(name);
      async move {
        let hash = self.store_node(child_path, child, link).await?;
        Ok::<_, RepoError>((name.clone(), hash, child.is_dir))
      }
    }))
    .await?;

    let entries: DirEntries = stored.iter().map(|(name, hash, _)| (name.clone(), hash.clone())).collect();
    let hash = dir_hash(&entries, is_link)?;

    if self.has_object(&hash).await {
      trace!(hash = %hash, "directory object already stored");
      return Ok(hash);
    }

    let farm = self.farm_path(&hash);
    let fix = self.fix_path(&hash);
    fs::create_dir_all(&farm).await.map_err(io_error(&farm))?;
    fs::create_dir_all(&fix).await.map_err(io_error(&fix))?;

    for (name, child_hash, is_dir) in &stored {
      let object = self.object_path(child_hash);
      if *is_dir {
        let pin = fix.join(name);
        link::hard_link(&object, &pin).await.map_err(io_error(&pin))?;
        let entry = farm.join(name);
        link::symlink_dir(&self.farm_path(child_hash), &entry)
          .await
          .map_err(io_error(&entry))?;
      } else {
        let entry = farm.join(name);
        link::hard_link(&object, &entry).await.map_err(io_error(&entry))?;
      }
    }

    // The record goes last: its presence means the farms are complete.
    let target = self.object_path(&hash);
    let record = serde_json::to_vec(&entries_value(&entries))?;
    link::write_atomic(&target, &record).await.map_err(io_error(&target))?;
    make_immutable(&target, false).await?;

    debug!(hash = %hash, entries = entries.len(), "stored directory");
    Ok(hash)
  }

  /// Store `node` and everything below it, recording hashes on the nodes.
  ///
  /// Nodes that already carry a hash are not revisited.
  pub async fn store_tree(&self, path: &Path, node: &mut TreeNode, link: bool) -> Result<Hash, RepoError> {
    self.store_node(path.to_path_buf(), node, link).await
  }

  fn store_node<'a>(&'a self, path: PathBuf, node: &'a mut TreeNode, link: bool) -> BoxFuture<'a, Result<Hash, RepoError>> {
    Box::pin(async move {
      if let Some(hash) = &node.hash {
        return Ok(hash.clone());
      }
      let hash = if node.is_dir {
        self.store_dir(&path, node.is_link, &mut node.children, link).await?
      } else {
        self.store_file(&path, node.is_exe, link).await?
      };
      node.hash = Some(hash.clone());
      Ok(hash)
    })
  }
}
