//! Task evaluation.
//!
//! An [`Evaluator`] turns a task of a [`BuildGraph`] into an output hash. It
//! resolves the task's arguments into one input tree, consults the memo
//! records, runs the command when needed and stores what it produced. Each
//! call to [`Evaluator::evaluate`] gets its own session, so a graph can be
//! evaluated any number of times.
//!
//! # Submodules
//!
//! - [`session`] - per-call state and the evaluation steps

pub mod session;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::EvalConfig;
use crate::filter::FilterError;
use crate::graph::{BuildGraph, TaskDag};
use crate::repo::{RepoError, Repository};
use crate::runner::{Runner, RunnerError};
use crate::tree::TreeError;
use crate::util::hash::{Hash, HashError};

pub use session::EvalSession;

/// Errors from evaluating a task.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  #[error("cyclic dependency involving task {0}")]
  CyclicDependency(String),

  #[error("unknown task: {0}")]
  UnknownTask(String),

  #[error("path {path} not found for task {task}")]
  PathNotFound { task: String, path: String },

  #[error("task {task} failed: {source}")]
  RunnerFailure {
    task: String,
    #[source]
    source: RunnerError,
  },

  #[error("dependency {dependency} of task {task} failed")]
  DependencyFailed { task: String, dependency: String },

  #[error(transparent)]
  Repo(#[from] RepoError),

  #[error(transparent)]
  Tree(#[from] TreeError),

  #[error(transparent)]
  Filter(#[from] FilterError),

  #[error(transparent)]
  Hash(#[from] HashError),
}

/// How a task's result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
  /// The command ran.
  Executed,
  /// A memo record supplied the output.
  Cached,
  /// No command; the merged inputs are the output.
  Aggregated,
}

impl fmt::Display for TaskOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      TaskOutcome::Executed => "executed",
      TaskOutcome::Cached => "cached",
      TaskOutcome::Aggregated => "aggregated",
    };
    f.write_str(label)
  }
}

/// Result of one [`Evaluator::evaluate`] call.
#[derive(Debug, Clone)]
pub struct EvalReport {
  pub target: String,
  /// Output hash of the target.
  pub hash: Hash,
  /// Outcome of every task evaluated on the way.
  pub outcomes: BTreeMap<String, TaskOutcome>,
}

impl EvalReport {
  pub fn count(&self, outcome: TaskOutcome) -> usize {
    self.outcomes.values().filter(|o| **o == outcome).count()
  }
}

/// Evaluates tasks against one repository with one runner.
pub struct Evaluator {
  repo: Repository,
  runner: Arc<dyn Runner>,
  config: EvalConfig,
}

impl Evaluator {
  pub fn new(repo: Repository, runner: Arc<dyn Runner>, config: EvalConfig) -> Self {
    Self { repo, runner, config }
  }

  pub fn repo(&self) -> &Repository {
    &self.repo
  }

  pub fn config(&self) -> &EvalConfig {
    &self.config
  }

  /// Evaluate `task_id` and link every evaluated task's output under
  /// `out/<tag>/<task id>`.
  ///
  /// Cycles reachable from the task are rejected before anything runs.
  pub async fn evaluate(&self, graph: &BuildGraph, task_id: &str, tag: &str) -> Result<EvalReport, EvalError> {
    if graph.task(task_id).is_none() {
      return Err(EvalError::UnknownTask(task_id.to_string()));
    }
    let order = TaskDag::reachable_from(graph, task_id)
      .topological_order()
      .map_err(EvalError::CyclicDependency)?;

    info!(task = task_id, tag, tasks = order.len(), runner = self.runner.name(), "evaluating");
    let session = EvalSession::new(self, graph, tag);
    let hash = session.evaluate_task(task_id.to_string(), Vec::new()).await?;

    Ok(EvalReport {
      target: task_id.to_string(),
      hash,
      outcomes: session.into_outcomes(),
    })
  }
}
