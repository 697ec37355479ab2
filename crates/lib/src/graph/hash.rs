//! Task definition hashing.
//!
//! A task hash covers the id, the output glob and the full command, never the
//! inputs: those are resolved per evaluation and enter the memo key as the
//! input tree hash instead.

use serde_json::{Map, Value, json};

use crate::filter::GlobItem;
use crate::util::hash::{Hash, HashError, HashKind, HashSpec, hash_structured};

use super::types::{Glob, TaskCommand};

fn command_spec() -> HashSpec {
  HashSpec::fields([
    ("img", HashSpec::Value),
    ("cmd", HashSpec::array()),
    ("in", HashSpec::Value),
    ("out", HashSpec::Value),
    ("cwd", HashSpec::Value),
    ("mem", HashSpec::Value),
    ("ovr", HashSpec::Value),
  ])
}

fn task_spec() -> HashSpec {
  HashSpec::fields([
    ("id", HashSpec::Value),
    ("outFrom", HashSpec::Value),
    ("outFiles", HashSpec::Value),
    ("outTo", HashSpec::Value),
    ("run", command_spec()),
  ])
}

fn push_glob_parts(items: &[GlobItem], parts: &mut Vec<String>) {
  parts.push("[".to_string());
  for item in items {
    match item {
      GlobItem::Pattern(pattern) => parts.push(pattern.clone()),
      GlobItem::Group(group) => push_glob_parts(group, parts),
    }
  }
  parts.push("]".to_string());
}

/// Flatten a glob array into one string, bracketing every group.
pub fn flatten_glob_array(items: &[GlobItem]) -> String {
  let mut parts = Vec::new();
  push_glob_parts(items, &mut parts);
  parts.join("/")
}

fn command_value(command: &TaskCommand) -> Value {
  let mut map = Map::new();
  if let Some(img) = &command.img {
    map.insert("img".to_string(), json!(img));
  }
  map.insert("cmd".to_string(), json!(command.cmd));
  map.insert("in".to_string(), json!(command.input));
  map.insert("out".to_string(), json!(command.output));
  map.insert("cwd".to_string(), json!(command.cwd));
  map.insert("mem".to_string(), json!(command.mem));
  map.insert("ovr".to_string(), json!(command.ovr));
  Value::Object(map)
}

/// Hash a task definition.
pub fn task_hash(id: &str, out: &Glob, run: Option<&TaskCommand>) -> Result<Hash, HashError> {
  let mut data = Map::new();
  data.insert("id".to_string(), json!(id));
  data.insert("outFrom".to_string(), json!(out.from));
  data.insert("outFiles".to_string(), json!(flatten_glob_array(&out.files)));
  data.insert("outTo".to_string(), json!(out.to));
  if let Some(run) = run {
    data.insert("run".to_string(), command_value(run));
  }
  hash_structured(&task_spec(), &Value::Object(data), HashKind::Task)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::hash::structured_tokens;

  #[test]
  fn flatten_brackets_groups() {
    let items = vec![
      GlobItem::from("src/..."),
      GlobItem::Group(vec![GlobItem::from("*.rs"), GlobItem::from("*.toml")]),
    ];
    assert_eq!(flatten_glob_array(&items), "[/src/.../[/*.rs/*.toml/]/]");
    assert_eq!(flatten_glob_array(&[GlobItem::from("**/*")]), "[/**/*/]");
  }

  #[test]
  fn task_hash_is_tagged_and_stable() {
    let cmd = TaskCommand::new(["make", "all"]);
    let a = task_hash("build", &Glob::default(), Some(&cmd)).unwrap();
    let b = task_hash("build", &Glob::default(), Some(&cmd)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.kind(), HashKind::Task);
  }

  #[test]
  fn every_definition_field_matters() {
    let cmd = TaskCommand::new(["make"]);
    let base = task_hash("t", &Glob::default(), Some(&cmd)).unwrap();

    assert_ne!(base, task_hash("u", &Glob::default(), Some(&cmd)).unwrap());
    assert_ne!(base, task_hash("t", &Glob::files("*.o"), Some(&cmd)).unwrap());
    assert_ne!(base, task_hash("t", &Glob::default().with_to("/lib"), Some(&cmd)).unwrap());
    assert_ne!(base, task_hash("t", &Glob::default().with_from("/x"), Some(&cmd)).unwrap());
    assert_ne!(base, task_hash("t", &Glob::default(), Some(&cmd.clone().with_mem(false))).unwrap());
    assert_ne!(base, task_hash("t", &Glob::default(), Some(&cmd.clone().with_image("alpine"))).unwrap());
    assert_ne!(base, task_hash("t", &Glob::default(), Some(&TaskCommand::new(["make", "-j"]))).unwrap());
    assert_ne!(base, task_hash("t", &Glob::default(), None).unwrap());
  }

  #[test]
  fn task_tokens_follow_field_order() {
    let mut data = Map::new();
    data.insert("id".to_string(), json!("t"));
    data.insert("outFrom".to_string(), json!("/"));
    data.insert("outFiles".to_string(), json!("[/**/*/]"));
    data.insert("outTo".to_string(), json!("/"));
    data.insert("run".to_string(), command_value(&TaskCommand::new(["ls"])));
    let tokens = structured_tokens(&task_spec(), &Value::Object(data)).unwrap();
    assert_eq!(
      tokens,
      vec![
        "{", "id", "t", "outFrom", "/", "outFiles", "[/**/*/]", "outTo", "/", "run", "{", "img", "NONE", "cmd", "ls",
        "in", "/in", "out", "/out", "cwd", "/", "mem", "T", "ovr", "F", "}", "}"
      ]
    );
  }
}
