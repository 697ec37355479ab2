//! Build graphs: tasks, their inputs and outputs, and how to load them.
//!
//! # Submodules
//!
//! - [`types`] - `BuildGraph`, `Task`, `TaskArgument`, `TaskCommand`, `Glob`
//! - [`hash`] - task definition hashing
//! - [`load`] - construction from a YAML build file
//! - [`dag`] - dependency ordering and cycle detection

pub mod dag;
pub mod hash;
pub mod load;
pub mod types;

use std::path::PathBuf;

use crate::filter::FilterError;
use crate::util::hash::HashError;

pub use dag::TaskDag;
pub use types::{BuildGraph, DEFAULT_FILES, Glob, Task, TaskArgument, TaskCommand};

/// Errors raised while building a graph. All of them are fatal before any
/// evaluation starts.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
  #[error("invalid build graph: {0}")]
  InvalidGraph(String),

  #[error("duplicate task: {0}")]
  DuplicateTask(String),

  #[error("default task already present: {0}")]
  DuplicateDefault(String),

  #[error("dirs may only be specified once")]
  DuplicateDirs,

  #[error("input {reference} not found in task {task}")]
  MissingReference { task: String, reference: String },

  #[error("bad glob in task {task}: {source}")]
  Filter {
    task: String,
    #[source]
    source: FilterError,
  },

  #[error("default task not found: {0}")]
  MissingDefault(String),

  #[error("failed to parse build file: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("failed to read build file {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),
}
