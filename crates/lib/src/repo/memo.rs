//! Memoization records.
//!
//! A record under `mem/<taskHash>-<inputHash>` remembers the result of running
//! a task definition on an input tree, so an identical execution can be
//! skipped.

use std::io;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::{RepoError, Repository, io_error};
use crate::platform::link;
use crate::util::hash::Hash;

/// Outcome of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoRecord {
  /// The relocated output tree.
  pub out: Hash,
  /// Record directory holding `out`, `exit`, `stdout` and `stderr`.
  pub all: Hash,
}

impl Repository {
  pub async fn read_memo(&self, task_hash: &Hash, input_hash: &Hash) -> Result<Option<MemoRecord>, RepoError> {
    let path = self.memo_path(task_hash, input_hash);
    let bytes = match fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(io_error(&path)(e)),
    };
    let record = serde_json::from_slice(&bytes).map_err(|e| RepoError::CorruptRecord {
      key: format!("{}-{}", task_hash, input_hash),
      message: e.to_string(),
    })?;
    Ok(Some(record))
  }

  pub async fn write_memo(&self, task_hash: &Hash, input_hash: &Hash, record: &MemoRecord) -> Result<(), RepoError> {
    let path = self.memo_path(task_hash, input_hash);
    let bytes = serde_json::to_vec(record)?;
    link::write_atomic(&path, &bytes).await.map_err(io_error(&path))?;
    debug!(task = %task_hash, input = %input_hash, out = %record.out, "wrote memo record");
    Ok(())
  }
}
