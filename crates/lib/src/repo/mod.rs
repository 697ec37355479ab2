//! Content-addressed object repository.
//!
//! Layout under the repository root:
//!
//! - `obj/<hash>`: flat object store. File objects are raw bytes, directory
//!   objects are JSON maps of child name to child hash.
//! - `dir/<hash>`: link farm materializing a directory object. Files are hard
//!   links into `obj`, child directories are symlinks to `dir/<childHash>`.
//! - `fix/<hash>`: hard links to the object records of child directories.
//! - `mem/<taskHash>-<inputHash>`: memo records.
//! - `tmp/`: task work directories.
//! - `mnt/<hash>`: trees checked out for consumption.
//! - `out/<tag>/<taskId>`: symlinks to task outputs under `mnt`.
//!
//! Every write is idempotent per hash: a target that already exists is taken
//! to hold the same content.
//!
//! # Submodules
//!
//! - [`store`] - storing files, directories and trees
//! - [`checkout`] - reading objects back, materializing trees, output links
//! - [`workdir`] - per-execution sandbox directories
//! - [`memo`] - memoization records

pub mod checkout;
pub mod memo;
pub mod store;
pub mod workdir;

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::platform::immutable::ImmutableError;
use crate::tree::TreeError;
use crate::util::hash::{Hash, HashError};

pub use checkout::DirEntries;
pub use memo::MemoRecord;
pub use workdir::{SANDBOX_INPUT, SANDBOX_OUTPUT, Workdir, sandbox_path, sandbox_paths_overlap};

pub const OBJ_DIR: &str = "obj";
pub const DIR_DIR: &str = "dir";
pub const FIX_DIR: &str = "fix";
pub const MEM_DIR: &str = "mem";
pub const TMP_DIR: &str = "tmp";
pub const MNT_DIR: &str = "mnt";
pub const OUT_DIR: &str = "out";

/// Every top-level directory of a repository.
pub const LAYOUT: [&str; 7] = [OBJ_DIR, DIR_DIR, FIX_DIR, MEM_DIR, TMP_DIR, MNT_DIR, OUT_DIR];

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error(transparent)]
  Tree(#[from] TreeError),

  #[error(transparent)]
  Immutable(#[from] ImmutableError),

  #[error("failed to encode record: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("corrupt record for {key}: {message}")]
  CorruptRecord { key: String, message: String },

  #[error("object not found: {0}")]
  NotFound(Hash),

  #[error("{0} is a directory, not a file")]
  NotAFile(Hash),

  #[error("{0} is not a directory")]
  NotADirectory(Hash),
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(io::Error) -> RepoError + '_ {
  move |source| RepoError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Handle to a repository rooted at an absolute path.
#[derive(Debug, Clone)]
pub struct Repository {
  root: PathBuf,
}

impl Repository {
  /// Open the repository at `root`, creating its layout if needed.
  pub async fn open(root: impl AsRef<Path>) -> Result<Self, RepoError> {
    let root = root.as_ref();
    fs::create_dir_all(root).await.map_err(io_error(root))?;
    // Symlinks in the link farms are absolute, so the root must be too.
    let root = fs::canonicalize(root).await.map_err(io_error(root))?;

    for name in LAYOUT {
      let dir = root.join(name);
      fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;
    }

    debug!(root = ?root, "opened repository");
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn layout_dir(&self, name: &str) -> PathBuf {
    self.root.join(name)
  }

  /// `obj/<hash>`
  pub fn object_path(&self, hash: &Hash) -> PathBuf {
    self.root.join(OBJ_DIR).join(hash.as_str())
  }

  /// `dir/<hash>`
  pub fn farm_path(&self, hash: &Hash) -> PathBuf {
    self.root.join(DIR_DIR).join(hash.as_str())
  }

  /// `fix/<hash>`
  pub fn fix_path(&self, hash: &Hash) -> PathBuf {
    self.root.join(FIX_DIR).join(hash.as_str())
  }

  /// `mnt/<hash>`
  pub fn mnt_path(&self, hash: &Hash) -> PathBuf {
    self.root.join(MNT_DIR).join(hash.as_str())
  }

  /// `mem/<taskHash>-<inputHash>`
  pub fn memo_path(&self, task_hash: &Hash, input_hash: &Hash) -> PathBuf {
    self.root.join(MEM_DIR).join(format!("{}-{}", task_hash, input_hash))
  }

  /// `out/<tag>`
  pub fn tag_path(&self, tag: &str) -> PathBuf {
    self.root.join(OUT_DIR).join(tag)
  }

  pub async fn has_object(&self, hash: &Hash) -> bool {
    fs::try_exists(self.object_path(hash)).await.unwrap_or(false)
  }
}
