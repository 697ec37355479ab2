//! Reading objects back out of the repository.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use futures::future::{BoxFuture, try_join_all};
use tokio::fs;
use tracing::debug;

use super::{RepoError, Repository, io_error};
use crate::platform::link;
use crate::tree::TreeNode;
use crate::util::hash::{Hash, HashKind};

/// Contents of a directory object: child name to child hash.
pub type DirEntries = BTreeMap<String, Hash>;

impl Repository {
  async fn read_object(&self, hash: &Hash) -> Result<Vec<u8>, RepoError> {
    let path = self.object_path(hash);
    match fs::read(&path).await {
      Ok(bytes) => Ok(bytes),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Err(RepoError::NotFound(hash.clone())),
      Err(e) => Err(io_error(&path)(e)),
    }
  }

  /// Read the entry map of a directory object.
  pub async fn read_dir_record(&self, hash: &Hash) -> Result<DirEntries, RepoError> {
    if !hash.is_directory() {
      return Err(RepoError::NotADirectory(hash.clone()));
    }
    let bytes = self.read_object(hash).await?;
    serde_json::from_slice(&bytes).map_err(|e| RepoError::CorruptRecord {
      key: hash.to_string(),
      message: e.to_string(),
    })
  }

  /// Read the bytes of a file object.
  pub async fn read_file_object(&self, hash: &Hash) -> Result<Vec<u8>, RepoError> {
    if hash.is_directory() {
      return Err(RepoError::NotAFile(hash.clone()));
    }
    self.read_object(hash).await
  }

  /// Rebuild the in-memory tree for `hash` from directory records alone.
  ///
  /// Every node carries its hash; modification times are zero.
  pub async fn extract_tree(&self, hash: &Hash) -> Result<TreeNode, RepoError> {
    self.extract_node(hash.clone()).await
  }

  fn extract_node(&self, hash: Hash) -> BoxFuture<'_, Result<TreeNode, RepoError>> {
    Box::pin(async move {
      if !hash.is_directory() {
        return Ok(TreeNode::file(hash.kind() == HashKind::Exec, 0).with_hash(hash));
      }

      let entries = self.read_dir_record(&hash).await?;
      let children = try_join_all(
        entries
          .into_iter()
          .map(|(name, child)| async move { Ok::<_, RepoError>((name, self.extract_node(child).await?)) }),
      )
      .await?;

      Ok(TreeNode {
        is_link: hash.kind() == HashKind::Link,
        ..TreeNode::dir(children.into_iter().collect())
      }
      .with_hash(hash))
    })
  }

  /// Materialize `hash` under `mnt/<hash>` and return that path.
  ///
  /// An existing checkout is trusted as is. Directories are assembled in a
  /// temporary sibling and renamed into place, so concurrent checkouts of the
  /// same hash are harmless.
  pub async fn check_out_tree(&self, hash: &Hash) -> Result<PathBuf, RepoError> {
    let target = self.mnt_path(hash);
    if fs::symlink_metadata(&target).await.is_ok() {
      return Ok(target);
    }

    if !hash.is_directory() {
      let object = self.object_path(hash);
      if !self.has_object(hash).await {
        return Err(RepoError::NotFound(hash.clone()));
      }
      link::hard_link(&object, &target).await.map_err(io_error(&target))?;
      return Ok(target);
    }

    let mnt = self.layout_dir(super::MNT_DIR);
    let staging = tempfile::Builder::new()
      .prefix(".checkout-")
      .tempdir_in(&mnt)
      .map_err(io_error(&mnt))?
      .keep();

    if let Err(e) = self.materialize(hash.clone(), staging.clone()).await {
      let _ = fs::remove_dir_all(&staging).await;
      return Err(e);
    }

    if let Err(e) = fs::rename(&staging, &target).await {
      let _ = fs::remove_dir_all(&staging).await;
      if fs::symlink_metadata(&target).await.is_err() {
        return Err(io_error(&target)(e));
      }
      debug!(hash = %hash, "concurrent checkout won");
    }

    debug!(hash = %hash, path = ?target, "checked out tree");
    Ok(target)
  }

  fn materialize(&self, hash: Hash, dest: PathBuf) -> BoxFuture<'_, Result<(), RepoError>> {
    Box::pin(async move {
      for (name, child) in self.read_dir_record(&hash).await? {
        let child_path = dest.join(&name);
        if child.is_directory() {
          fs::create_dir(&child_path).await.map_err(io_error(&child_path))?;
          self.materialize(child, child_path).await?;
        } else {
          link::hard_link_or_copy(&self.object_path(&child), &child_path)
            .await
            .map_err(io_error(&child_path))?;
        }
      }
      Ok(())
    })
  }

  /// Point `out/<tag>/<task_id>` at the checkout of `hash`, replacing any
  /// previous link.
  pub async fn link_output(&self, tag: &str, task_id: &str, hash: &Hash) -> Result<PathBuf, RepoError> {
    let link_path = self.tag_path(tag).join(task_id);
    link::replace_symlink(&self.mnt_path(hash), &link_path)
      .await
      .map_err(io_error(&link_path))?;
    debug!(tag, task = task_id, hash = %hash, "linked output");
    Ok(link_path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::filter::NameFilter;
  use crate::tree::scan_tree;
  use crate::util::hash::hash_bytes;
  use crate::util::testutil::{open_temp_repo, write_files, write_sample_tree};
  use tempfile::TempDir;

  async fn store_sample(repo: &Repository, src: &TempDir) -> (TreeNode, Hash) {
    write_sample_tree(src.path());
    let mut tree = scan_tree(src.path(), &NameFilter::any()).await.unwrap();
    let hash = repo.store_tree(src.path(), &mut tree, false).await.unwrap();
    (tree, hash)
  }

  fn strip_mtimes(node: &mut TreeNode) {
    node.mtime_ticks = 0;
    node.children.values_mut().for_each(strip_mtimes);
  }

  #[tokio::test]
  async fn extract_round_trips_stored_tree() {
    let (_temp, repo) = open_temp_repo().await;
    let src = TempDir::new().unwrap();
    let (mut tree, hash) = store_sample(&repo, &src).await;

    let extracted = repo.extract_tree(&hash).await.unwrap();
    strip_mtimes(&mut tree);
    assert_eq!(extracted, tree);
  }

  #[tokio::test]
  async fn extract_file_hash_yields_leaf() {
    let (_temp, repo) = open_temp_repo().await;
    let hash = hash_bytes(b"#!", HashKind::Exec);
    let node = repo.extract_tree(&hash).await.unwrap();
    assert!(!node.is_dir);
    assert!(node.is_exe);
    assert_eq!(node.hash, Some(hash));
  }

  #[tokio::test]
  async fn check_out_materializes_files() {
    let (_temp, repo) = open_temp_repo().await;
    let src = TempDir::new().unwrap();
    let (_tree, hash) = store_sample(&repo, &src).await;

    let path = repo.check_out_tree(&hash).await.unwrap();
    assert_eq!(path, repo.mnt_path(&hash));
    assert_eq!(std::fs::read_to_string(path.join("data/dir1/t11.txt")).unwrap(), "t11");
    assert_eq!(
      std::fs::read_to_string(path.join("data/dir2/dir2js/j12i.js")).unwrap(),
      "console.log('Hi!')"
    );
    let leftovers: Vec<_> = std::fs::read_dir(repo.layout_dir(crate::repo::MNT_DIR))
      .unwrap()
      .map(|e| e.unwrap().file_name().into_string().unwrap())
      .filter(|n| n.starts_with(".checkout-"))
      .collect();
    assert!(leftovers.is_empty());
  }

  #[tokio::test]
  async fn existing_checkout_is_trusted() {
    let (_temp, repo) = open_temp_repo().await;
    let src = TempDir::new().unwrap();
    let (_tree, hash) = store_sample(&repo, &src).await;

    let path = repo.check_out_tree(&hash).await.unwrap();
    std::fs::write(path.join("marker"), "kept").unwrap();
    let again = repo.check_out_tree(&hash).await.unwrap();
    assert_eq!(path, again);
    assert!(again.join("marker").exists());
  }

  #[tokio::test]
  async fn concurrent_checkouts_agree() {
    let (_temp, repo) = open_temp_repo().await;
    let src = TempDir::new().unwrap();
    let (_tree, hash) = store_sample(&repo, &src).await;

    let (a, b) = tokio::join!(repo.check_out_tree(&hash), repo.check_out_tree(&hash));
    assert_eq!(a.unwrap(), b.unwrap());
    assert!(repo.mnt_path(&hash).join("data/t1.txt").is_file());
  }

  #[tokio::test]
  async fn check_out_file_hash_links_object() {
    let (_temp, repo) = open_temp_repo().await;
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("f", "bytes")]);
    let hash = repo.store_file(&src.path().join("f"), false, false).await.unwrap();

    let path = repo.check_out_tree(&hash).await.unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "bytes");
  }

  #[tokio::test]
  async fn missing_objects_are_reported() {
    let (_temp, repo) = open_temp_repo().await;
    let dir = hash_bytes(b"nope", HashKind::Dir);
    let file = hash_bytes(b"nope", HashKind::File);
    assert!(matches!(repo.extract_tree(&dir).await, Err(RepoError::NotFound(_))));
    assert!(matches!(repo.check_out_tree(&file).await, Err(RepoError::NotFound(_))));
    assert!(matches!(repo.read_file_object(&dir).await, Err(RepoError::NotAFile(_))));
  }

  #[tokio::test]
  async fn corrupt_directory_record_is_reported() {
    let (_temp, repo) = open_temp_repo().await;
    let hash = hash_bytes(b"broken", HashKind::Dir);
    std::fs::write(repo.object_path(&hash), "not json").unwrap();
    assert!(matches!(
      repo.read_dir_record(&hash).await,
      Err(RepoError::CorruptRecord { .. })
    ));
  }

  #[tokio::test]
  async fn link_output_overwrites_previous_link() {
    let (_temp, repo) = open_temp_repo().await;
    let src = TempDir::new().unwrap();
    write_files(src.path(), &[("one/a", "1"), ("two/b", "2")]);

    let mut one = scan_tree(&src.path().join("one"), &NameFilter::any()).await.unwrap();
    let mut two = scan_tree(&src.path().join("two"), &NameFilter::any()).await.unwrap();
    let h1 = repo.store_tree(&src.path().join("one"), &mut one, false).await.unwrap();
    let h2 = repo.store_tree(&src.path().join("two"), &mut two, false).await.unwrap();
    repo.check_out_tree(&h1).await.unwrap();
    repo.check_out_tree(&h2).await.unwrap();

    repo.link_output("tag", "task", &h1).await.unwrap();
    let link = repo.link_output("tag", "task", &h2).await.unwrap();
    assert_eq!(link, repo.tag_path("tag").join("task"));
    assert!(link.join("b").is_file());
    assert!(!link.join("a").exists());
  }
}
