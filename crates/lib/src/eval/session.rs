//! Per-call evaluation state.
//!
//! A session deduplicates shared dependencies, bounds concurrent commands and
//! collects the outcome of every task it evaluates. It lives for one
//! [`Evaluator::evaluate`](super::Evaluator::evaluate) call.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, try_join_all};
use tokio::fs;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};

use super::{EvalError, Evaluator, TaskOutcome};
use crate::graph::{BuildGraph, Glob, Task, TaskArgument, TaskCommand};
use crate::repo::{MemoRecord, RepoError, Workdir, sandbox_path};
use crate::runner::{RunStatus, RunnerError};
use crate::tree::{TreeNode, TreeNodeMap, apply_filter, merge_trees, prepend_path, scan_tree, walk_path};
use crate::util::hash::Hash;

/// Result slot of one task. `None` records a failure already reported to the
/// caller that ran it.
type ResultCell = Arc<OnceCell<Option<Hash>>>;

pub struct EvalSession<'a> {
  evaluator: &'a Evaluator,
  graph: &'a BuildGraph,
  tag: &'a str,
  results: Mutex<HashMap<String, ResultCell>>,
  outcomes: Mutex<BTreeMap<String, TaskOutcome>>,
  permits: Semaphore,
}

impl<'a> EvalSession<'a> {
  pub fn new(evaluator: &'a Evaluator, graph: &'a BuildGraph, tag: &'a str) -> Self {
    Self {
      evaluator,
      graph,
      tag,
      results: Mutex::new(HashMap::new()),
      outcomes: Mutex::new(BTreeMap::new()),
      permits: Semaphore::new(evaluator.config.parallelism.max(1)),
    }
  }

  pub fn into_outcomes(self) -> BTreeMap<String, TaskOutcome> {
    self.outcomes.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn record(&self, task_id: &str, outcome: TaskOutcome) {
    let mut outcomes = self.outcomes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    outcomes.insert(task_id.to_string(), outcome);
  }

  fn cell(&self, task_id: &str) -> ResultCell {
    let mut results = self.results.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    results.entry(task_id.to_string()).or_default().clone()
  }

  /// Evaluate `task_id` once per session. `ancestors` is the chain of tasks
  /// waiting on this one.
  pub fn evaluate_task(&self, task_id: String, ancestors: Vec<String>) -> BoxFuture<'_, Result<Hash, EvalError>> {
    Box::pin(async move {
      if ancestors.contains(&task_id) {
        return Err(EvalError::CyclicDependency(task_id));
      }
      let task = self
        .graph
        .task(&task_id)
        .ok_or_else(|| EvalError::UnknownTask(task_id.clone()))?;

      let cell = self.cell(&task_id);
      let mut chain = ancestors.clone();
      chain.push(task_id.clone());

      let mut failure = None;
      let slot = &mut failure;
      let result = cell
        .get_or_init(|| async move {
          match self.compute(task, chain).await {
            Ok(hash) => Some(hash),
            Err(e) => {
              *slot = Some(e);
              None
            }
          }
        })
        .await
        .clone();

      match (result, failure) {
        (Some(hash), _) => Ok(hash),
        (None, Some(e)) => Err(e),
        (None, None) => Err(EvalError::DependencyFailed {
          task: ancestors.last().cloned().unwrap_or_default(),
          dependency: task_id,
        }),
      }
    })
  }

  async fn compute(&self, task: &Task, chain: Vec<String>) -> Result<Hash, EvalError> {
    let repo = &self.evaluator.repo;

    let inputs = try_join_all(task.inputs.iter().map(|arg| self.resolve_argument(task, arg, chain.clone()))).await?;
    let mut input = merge_trees(&inputs)?;
    let input_hash = repo.store_tree(repo.root(), &mut input, true).await?;
    repo.check_out_tree(&input_hash).await?;
    debug!(task = %task.id, input = %input_hash, "resolved inputs");

    let Some(run) = &task.run else {
      repo.link_output(self.tag, &task.id, &input_hash).await?;
      self.record(&task.id, TaskOutcome::Aggregated);
      return Ok(input_hash);
    };

    if run.mem
      && self.evaluator.config.use_cache
      && let Some(memo) = repo.read_memo(&task.hash, &input_hash).await?
    {
      repo.check_out_tree(&memo.out).await?;
      repo.link_output(self.tag, &task.id, &memo.out).await?;
      info!(task = %task.id, out = %memo.out, "using cached result");
      self.record(&task.id, TaskOutcome::Cached);
      return Ok(memo.out);
    }

    let workdir = repo.make_work_dir(&input_hash, &run.input, &run.output).await?;
    let status = self.run_command(&task.id, &workdir, run).await?;
    if !status.success() {
      warn!(task = %task.id, code = status.code, stderr = ?workdir.stderr, "command failed");
      return Err(EvalError::RunnerFailure {
        task: task.id.clone(),
        source: RunnerError::ExitStatus { status },
      });
    }

    let memo = self.collect_outputs(task, &workdir).await?;
    if run.mem {
      repo.write_memo(&task.hash, &input_hash, &memo).await?;
    }
    repo.check_out_tree(&memo.out).await?;
    repo.link_output(self.tag, &task.id, &memo.out).await?;

    info!(task = %task.id, out = %memo.out, "task complete");
    self.record(&task.id, TaskOutcome::Executed);
    Ok(memo.out)
  }

  async fn resolve_argument(&self, task: &Task, arg: &TaskArgument, chain: Vec<String>) -> Result<TreeNode, EvalError> {
    match arg {
      TaskArgument::Source { path, glob } => self.resolve_source(task, path, glob).await,
      TaskArgument::Task { id, glob } => {
        let hash = self.evaluate_task(id.clone(), chain).await?;
        self.resolve_task_output(task, id, &hash, glob).await
      }
    }
  }

  async fn resolve_source(&self, task: &Task, path: &str, glob: &Glob) -> Result<TreeNode, EvalError> {
    let repo = &self.evaluator.repo;
    let root = sandbox_path(&sandbox_path(&self.graph.source_root, path), &glob.from);
    ensure_exists(&root, &task.id).await?;

    let mut tree = scan_tree(&root, &glob.filter()?).await?;
    repo.store_tree(&root, &mut tree, false).await?;

    // Only the directories added by the relocation still need storing.
    let mut relocated = prepend_path(&glob.to, tree);
    repo.store_tree(&root, &mut relocated, false).await?;
    debug!(task = %task.id, source = path, files = relocated.file_count(), "resolved source");
    Ok(relocated)
  }

  async fn resolve_task_output(
    &self,
    task: &Task,
    dependency: &str,
    hash: &Hash,
    glob: &Glob,
  ) -> Result<TreeNode, EvalError> {
    let repo = &self.evaluator.repo;
    let tree = repo.extract_tree(hash).await?;
    let selected = walk_path(&glob.from, &tree).ok_or_else(|| EvalError::PathNotFound {
      task: task.id.clone(),
      path: format!("{}:{}", dependency, glob.from),
    })?;

    let mut relocated = prepend_path(&glob.to, apply_filter(selected, &glob.filter()?));
    repo.store_tree(repo.root(), &mut relocated, true).await?;
    Ok(relocated)
  }

  async fn run_command(&self, task_id: &str, workdir: &Workdir, run: &TaskCommand) -> Result<RunStatus, EvalError> {
    let evaluator = self.evaluator;
    // Never closed.
    let _permit = self.permits.acquire().await.ok();

    info!(task = task_id, runner = evaluator.runner.name(), workdir = ?workdir.base, "running task");
    let running = evaluator.runner.run(evaluator.repo.root(), workdir, run);
    let result = match evaluator.config.timeout {
      Some(limit) => tokio::time::timeout(limit, running)
        .await
        .unwrap_or_else(|_| Err(RunnerError::Timeout(limit.as_secs()))),
      None => running.await,
    };

    result.map_err(|source| EvalError::RunnerFailure {
      task: task_id.to_string(),
      source,
    })
  }

  /// Store the command's results and build the memo record for them.
  async fn collect_outputs(&self, task: &Task, workdir: &Workdir) -> Result<MemoRecord, EvalError> {
    let repo = &self.evaluator.repo;

    let out_root = sandbox_path(&workdir.output, &task.out.from);
    ensure_exists(&out_root, &task.id).await?;
    let mut scanned = scan_tree(&out_root, &task.out.filter()?).await?;
    repo.store_tree(&out_root, &mut scanned, true).await?;
    let mut relocated = prepend_path(&task.out.to, scanned);
    let out = repo.store_tree(&out_root, &mut relocated, true).await?;

    let mut all = TreeNodeMap::new();
    all.insert("out".to_string(), TreeNode::dir(TreeNodeMap::new()).with_hash(out.clone()));
    for (name, path) in [("exit", &workdir.exit), ("stdout", &workdir.stdout), ("stderr", &workdir.stderr)] {
      let hash = repo.store_file(path, false, true).await?;
      all.insert(name.to_string(), TreeNode::file(false, 0).with_hash(hash));
    }
    let all = repo.store_dir(&workdir.base, false, &mut all, true).await?;

    debug!(task = %task.id, out = %out, all = %all, "stored outputs");
    Ok(MemoRecord { out, all })
  }
}

async fn ensure_exists(path: &Path, task_id: &str) -> Result<(), EvalError> {
  match fs::metadata(path).await {
    Ok(_) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EvalError::PathNotFound {
      task: task_id.to_string(),
      path: path.display().to_string(),
    }),
    Err(source) => Err(RepoError::Io {
      path: path.to_path_buf(),
      source,
    }
    .into()),
  }
}
