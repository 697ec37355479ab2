//! Build graph types.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::filter::{FilterError, GlobItem, NameFilter};
use crate::repo::{SANDBOX_INPUT, SANDBOX_OUTPUT};
use crate::util::hash::Hash;

use super::GraphError;
use super::hash::task_hash;

/// Default `files` pattern: everything at every depth.
pub const DEFAULT_FILES: &str = "**/*";

/// Selects a subtree, filters it, and re-roots the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
  /// Path to start matching at.
  pub from: String,
  pub files: Vec<GlobItem>,
  /// Path prefix the matched entries are placed under.
  pub to: String,
}

impl Default for Glob {
  fn default() -> Self {
    Self {
      from: "/".to_string(),
      files: vec![GlobItem::from(DEFAULT_FILES)],
      to: "/".to_string(),
    }
  }
}

impl Glob {
  /// A glob selecting `pattern` from the root.
  pub fn files(pattern: &str) -> Self {
    Self {
      files: vec![GlobItem::from(pattern)],
      ..Self::default()
    }
  }

  pub fn with_from(mut self, from: impl Into<String>) -> Self {
    self.from = from.into();
    self
  }

  pub fn with_to(mut self, to: impl Into<String>) -> Self {
    self.to = to.into();
    self
  }

  pub fn filter(&self) -> Result<NameFilter, FilterError> {
    NameFilter::from_glob_array(&self.files)
  }
}

/// One input of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskArgument {
  /// A path under the source root.
  Source { path: String, glob: Glob },
  /// The output of another task.
  Task { id: String, glob: Glob },
}

impl TaskArgument {
  pub fn source(path: impl Into<String>, glob: Glob) -> Self {
    TaskArgument::Source {
      path: path.into(),
      glob,
    }
  }

  pub fn task(id: impl Into<String>, glob: Glob) -> Self {
    TaskArgument::Task { id: id.into(), glob }
  }

  pub fn glob(&self) -> &Glob {
    match self {
      TaskArgument::Source { glob, .. } | TaskArgument::Task { glob, .. } => glob,
    }
  }

  /// Id of the referenced task, for task arguments.
  pub fn task_id(&self) -> Option<&str> {
    match self {
      TaskArgument::Task { id, .. } => Some(id),
      TaskArgument::Source { .. } => None,
    }
  }
}

/// The command a task runs, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
  /// Container image. Required by the container runner only.
  pub img: Option<String>,
  pub cmd: Vec<String>,
  /// Sandbox path of the input tree.
  pub input: String,
  /// Sandbox path the command writes results to.
  pub output: String,
  /// Working directory inside the sandbox.
  pub cwd: String,
  /// Opt into result memoization.
  pub mem: bool,
  pub ovr: bool,
}

impl TaskCommand {
  pub fn new<I, S>(cmd: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      img: None,
      cmd: cmd.into_iter().map(Into::into).collect(),
      input: SANDBOX_INPUT.to_string(),
      output: SANDBOX_OUTPUT.to_string(),
      cwd: "/".to_string(),
      mem: true,
      ovr: false,
    }
  }

  pub fn with_image(mut self, img: impl Into<String>) -> Self {
    self.img = Some(img.into());
    self
  }

  pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
    self.cwd = cwd.into();
    self
  }

  pub fn with_mem(mut self, mem: bool) -> Self {
    self.mem = mem;
    self
  }
}

/// A node of the build graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
  pub id: String,
  pub inputs: Vec<TaskArgument>,
  pub out: Glob,
  /// `None` for pure aggregation tasks.
  pub run: Option<TaskCommand>,
  /// Hash of the definition, excluding inputs.
  pub hash: Hash,
}

impl Task {
  pub fn new(
    id: impl Into<String>,
    inputs: Vec<TaskArgument>,
    out: Glob,
    run: Option<TaskCommand>,
  ) -> Result<Self, GraphError> {
    let id = id.into();
    for glob in inputs.iter().map(TaskArgument::glob).chain([&out]) {
      glob.filter().map_err(|source| GraphError::Filter {
        task: id.clone(),
        source,
      })?;
    }
    let hash = task_hash(&id, &out, run.as_ref())?;
    Ok(Self {
      id,
      inputs,
      out,
      run,
      hash,
    })
  }

  /// Ids of the tasks this task reads from, in argument order.
  pub fn dependencies(&self) -> impl Iterator<Item = &str> {
    self.inputs.iter().filter_map(TaskArgument::task_id)
  }
}

/// A validated set of tasks plus the directories they build in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildGraph {
  pub repo_root: PathBuf,
  pub source_root: PathBuf,
  pub build_root: PathBuf,
  pub default_task: Option<String>,
  pub tasks: BTreeMap<String, Task>,
}

impl BuildGraph {
  /// An empty graph with the default layout under `base_dir`.
  pub fn new(base_dir: &Path) -> Self {
    Self {
      repo_root: base_dir.join("repo"),
      source_root: base_dir.to_path_buf(),
      build_root: base_dir.join("out"),
      default_task: None,
      tasks: BTreeMap::new(),
    }
  }

  pub fn insert_task(&mut self, task: Task) -> Result<(), GraphError> {
    if self.tasks.contains_key(&task.id) {
      return Err(GraphError::DuplicateTask(task.id));
    }
    self.tasks.insert(task.id.clone(), task);
    Ok(())
  }

  pub fn task(&self, id: &str) -> Option<&Task> {
    self.tasks.get(id)
  }

  /// Check that every task reference and the default task resolve.
  pub fn validate(&self) -> Result<(), GraphError> {
    for task in self.tasks.values() {
      if let Some(missing) = task.dependencies().find(|id| !self.tasks.contains_key(*id)) {
        return Err(GraphError::MissingReference {
          task: task.id.clone(),
          reference: missing.to_string(),
        });
      }
    }

    if let Some(default) = &self.default_task
      && !self.tasks.contains_key(default)
    {
      return Err(GraphError::MissingDefault(default.clone()));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn glob_defaults() {
    let glob = Glob::default();
    assert_eq!(glob.from, "/");
    assert_eq!(glob.to, "/");
    assert_eq!(glob.files, vec![GlobItem::from("**/*")]);
    assert!(glob.filter().unwrap().matches_path("a/b/c.txt", false));
  }

  #[test]
  fn command_defaults() {
    let cmd = TaskCommand::new(["make"]);
    assert_eq!(cmd.input, "/in");
    assert_eq!(cmd.output, "/out");
    assert_eq!(cmd.cwd, "/");
    assert!(cmd.mem);
    assert!(!cmd.ovr);
    assert!(cmd.img.is_none());
  }

  #[test]
  fn dependencies_skip_sources() {
    let task = Task::new(
      "t",
      vec![
        TaskArgument::source("src", Glob::default()),
        TaskArgument::task("a", Glob::default()),
        TaskArgument::task("b", Glob::default()),
      ],
      Glob::default(),
      None,
    )
    .unwrap();
    assert_eq!(task.dependencies().collect::<Vec<_>>(), vec!["a", "b"]);
  }

  #[test]
  fn insert_rejects_duplicates() {
    let mut graph = BuildGraph::new(Path::new("/base"));
    graph.insert_task(Task::new("a", vec![], Glob::default(), None).unwrap()).unwrap();
    let err = graph
      .insert_task(Task::new("a", vec![], Glob::default(), None).unwrap())
      .unwrap_err();
    assert!(matches!(err, GraphError::DuplicateTask(id) if id == "a"));
  }

  #[test]
  fn validate_reports_missing_references() {
    let mut graph = BuildGraph::new(Path::new("/base"));
    graph
      .insert_task(Task::new("a", vec![TaskArgument::task("ghost", Glob::default())], Glob::default(), None).unwrap())
      .unwrap();
    assert!(matches!(
      graph.validate(),
      Err(GraphError::MissingReference { reference, .. }) if reference == "ghost"
    ));

    let mut graph = BuildGraph::new(Path::new("/base"));
    graph.default_task = Some("nope".to_string());
    assert!(matches!(graph.validate(), Err(GraphError::MissingDefault(_))));
  }
}
