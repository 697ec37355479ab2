//! Build graph construction from a parsed build file.
//!
//! A build file is a YAML list. Each element is one of:
//!
//! - `{id: ..., in: ..., out: ..., run: ...}`: a task
//! - `{default: <task id>}`: the task built when none is named (at most once)
//! - `{dirs: {repo, src, out}}`: repository, source and build roots relative
//!   to the file's directory (at most once)
//! - `{env: ...}`: reserved, ignored
//!
//! Task inputs are a single argument or a list of them. An argument is either
//! a bare task id or a mapping with `id` or `source` and an optional `files`
//! glob. Globs are `null`, a pattern, a glob array, or a mapping with optional
//! `from`, `to` and `files`.

use std::path::Path;

use serde_yaml::Value;
use tokio::fs;
use tracing::debug;

use crate::filter::GlobItem;
use crate::repo::sandbox_paths_overlap;

use super::GraphError;
use super::types::{BuildGraph, Glob, Task, TaskArgument, TaskCommand};

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Sequence(_) => "list",
    Value::Mapping(_) => "mapping",
    Value::Tagged(_) => "tagged value",
  }
}

fn invalid(what: &str, value: &Value, task_id: &str) -> GraphError {
  GraphError::InvalidGraph(format!(
    "invalid {} ({}) in task {}",
    what,
    type_name(value),
    task_id
  ))
}

/// Present, non-null field of a mapping.
fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
  value.get(key).filter(|v| !v.is_null())
}

fn optional_string(value: &Value, key: &str, task_id: &str) -> Result<Option<String>, GraphError> {
  match field(value, key) {
    None => Ok(None),
    Some(Value::String(s)) => Ok(Some(s.clone())),
    Some(other) => Err(invalid(key, other, task_id)),
  }
}

fn is_glob_array(value: &Value) -> bool {
  match value {
    Value::Sequence(items) => items.iter().all(|item| item.is_string() || is_glob_array(item)),
    _ => false,
  }
}

fn glob_items(value: &Value) -> Vec<GlobItem> {
  match value {
    Value::Sequence(items) => items
      .iter()
      .filter_map(|item| match item {
        Value::String(s) => Some(GlobItem::Pattern(s.clone())),
        Value::Sequence(_) => Some(GlobItem::Group(glob_items(item))),
        _ => None,
      })
      .collect(),
    _ => Vec::new(),
  }
}

fn parse_files(value: Option<&Value>, task_id: &str) -> Result<Vec<GlobItem>, GraphError> {
  match value {
    None => Ok(Glob::default().files),
    Some(Value::String(pattern)) => Ok(vec![GlobItem::from(pattern.as_str())]),
    Some(v) if is_glob_array(v) => Ok(glob_items(v)),
    Some(other) => Err(invalid("files specification", other, task_id)),
  }
}

fn parse_glob(value: Option<&Value>, task_id: &str) -> Result<Glob, GraphError> {
  match value {
    None | Some(Value::Null) => Ok(Glob::default()),
    Some(Value::String(pattern)) => Ok(Glob::files(pattern)),
    Some(v) if is_glob_array(v) => Ok(Glob {
      files: glob_items(v),
      ..Glob::default()
    }),
    Some(v @ Value::Mapping(_)) => {
      let defaults = Glob::default();
      Ok(Glob {
        from: optional_string(v, "from", task_id)?.unwrap_or(defaults.from),
        files: parse_files(field(v, "files"), task_id)?,
        to: optional_string(v, "to", task_id)?.unwrap_or(defaults.to),
      })
    }
    Some(other) => Err(invalid("glob", other, task_id)),
  }
}

fn parse_argument(value: &Value, task_id: &str) -> Result<TaskArgument, GraphError> {
  if let Value::String(id) = value {
    return Ok(TaskArgument::task(id.clone(), Glob::default()));
  }
  if !value.is_mapping() {
    return Err(invalid("argument", value, task_id));
  }

  let glob = parse_glob(field(value, "files"), task_id)?;
  let id = optional_string(value, "id", task_id)?;
  let source = optional_string(value, "source", task_id)?;
  match (id, source) {
    (Some(id), None) => Ok(TaskArgument::task(id, glob)),
    (None, Some(source)) => Ok(TaskArgument::source(source, glob)),
    (Some(_), Some(_)) => Err(GraphError::InvalidGraph(format!(
      "argument in task {} has both id and source",
      task_id
    ))),
    (None, None) => Err(GraphError::InvalidGraph(format!(
      "argument in task {} has no id or source",
      task_id
    ))),
  }
}

fn parse_inputs(value: Option<&Value>, task_id: &str) -> Result<Vec<TaskArgument>, GraphError> {
  match value {
    None => Ok(Vec::new()),
    Some(Value::Sequence(items)) => items.iter().map(|item| parse_argument(item, task_id)).collect(),
    Some(single) => Ok(vec![parse_argument(single, task_id)?]),
  }
}

fn parse_command(value: Option<&Value>, task_id: &str) -> Result<Option<TaskCommand>, GraphError> {
  let Some(value) = value else {
    return Ok(None);
  };
  if !value.is_mapping() {
    return Err(invalid("run", value, task_id));
  }

  let cmd = match field(value, "cmd") {
    Some(Value::String(s)) => vec![s.clone()],
    Some(Value::Sequence(items)) => items
      .iter()
      .map(|item| match item {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(invalid("cmd element", other, task_id)),
      })
      .collect::<Result<Vec<_>, _>>()?,
    Some(other) => return Err(invalid("cmd", other, task_id)),
    None => return Err(GraphError::InvalidGraph(format!("missing cmd in run in task {}", task_id))),
  };

  let defaults = TaskCommand::new(Vec::<String>::new());
  let command = TaskCommand {
    img: optional_string(value, "img", task_id)?,
    cmd,
    input: optional_string(value, "in", task_id)?.unwrap_or(defaults.input),
    output: optional_string(value, "out", task_id)?.unwrap_or(defaults.output),
    cwd: optional_string(value, "cwd", task_id)?.unwrap_or(defaults.cwd),
    mem: field(value, "mem").and_then(Value::as_bool) != Some(false),
    ovr: field(value, "ovr").and_then(Value::as_bool) == Some(true),
  };
  if sandbox_paths_overlap(&command.input, &command.output) {
    return Err(GraphError::InvalidGraph(format!(
      "run in {} and out {} overlap in task {}",
      command.input, command.output, task_id
    )));
  }
  Ok(Some(command))
}

fn parse_task(value: &Value) -> Result<Task, GraphError> {
  let Some(Value::String(id)) = value.get("id") else {
    return Err(GraphError::InvalidGraph("task without a string id".to_string()));
  };
  Task::new(
    id.clone(),
    parse_inputs(field(value, "in"), id)?,
    parse_glob(field(value, "out"), id)?,
    parse_command(field(value, "run"), id)?,
  )
}

impl BuildGraph {
  /// Build a graph from a parsed build file. Relative roots resolve against
  /// `base_dir`.
  pub fn from_yaml_value(data: &Value, base_dir: &Path) -> Result<Self, GraphError> {
    let Value::Sequence(elements) = data else {
      return Err(GraphError::InvalidGraph("build file must be a YAML list".to_string()));
    };

    let mut graph = BuildGraph::new(base_dir);
    let mut has_dirs = false;

    for element in elements {
      if matches!(element.get("id"), Some(Value::String(_))) {
        graph.insert_task(parse_task(element)?)?;
      } else if element.get("env").is_some() {
        debug!("ignoring env element");
      } else if let Some(Value::String(default)) = element.get("default") {
        if graph.default_task.is_some() {
          return Err(GraphError::DuplicateDefault(default.clone()));
        }
        graph.default_task = Some(default.clone());
      } else if let Some(dirs @ Value::Mapping(_)) = element.get("dirs") {
        if has_dirs {
          return Err(GraphError::DuplicateDirs);
        }
        has_dirs = true;
        if let Some(Value::String(repo)) = dirs.get("repo") {
          graph.repo_root = base_dir.join(repo);
        }
        if let Some(Value::String(src)) = dirs.get("src") {
          graph.source_root = base_dir.join(src);
        }
        if let Some(Value::String(out)) = dirs.get("out") {
          graph.build_root = base_dir.join(out);
        }
      } else {
        return Err(GraphError::InvalidGraph(format!(
          "invalid build file element ({})",
          type_name(element)
        )));
      }
    }

    graph.validate()?;
    Ok(graph)
  }

  pub fn from_yaml_str(text: &str, base_dir: &Path) -> Result<Self, GraphError> {
    let data: Value = serde_yaml::from_str(text)?;
    Self::from_yaml_value(&data, base_dir)
  }

  /// Read and parse a build file; roots resolve against its directory.
  pub async fn load(path: &Path) -> Result<Self, GraphError> {
    let text = fs::read_to_string(path).await.map_err(|source| GraphError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    let graph = Self::from_yaml_str(&text, base_dir)?;
    debug!(path = ?path, tasks = graph.tasks.len(), "loaded build graph");
    Ok(graph)
  }
}
