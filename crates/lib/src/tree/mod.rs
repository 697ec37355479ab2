//! In-memory file trees and the pure tree algebra.
//!
//! A `TreeNode` describes one filesystem entry. Directory nodes own their
//! children in a sorted map; file nodes have none. Hashes are attached once a
//! node has been stored in the repository and are reset whenever an operation
//! changes a directory's shape.
//!
//! Filesystem scanning lives in [`scan`]; everything else here is pure.

pub mod scan;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::filter::{FilterId, NameFilter};
use crate::util::hash::Hash;

pub use scan::{scan, scan_tree};

/// Children of a directory node, keyed by entry name.
pub type TreeNodeMap = BTreeMap<String, TreeNode>;

/// Errors from tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
  #[error("merge conflict at {path}: a file and a directory share the same path")]
  MergeConflict { path: String },

  #[error("{path} is neither a file nor a directory")]
  UnsupportedEntry { path: PathBuf },

  #[error("file name is not valid UTF-8: {path}")]
  InvalidName { path: PathBuf },

  #[error("failed to scan {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// One file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeNode {
  pub is_dir: bool,
  pub is_exe: bool,
  /// Directory synthesized by relocation; hashed with kind `L`.
  pub is_link: bool,
  pub children: TreeNodeMap,
  /// Modification time in milliseconds. Never hashed.
  pub mtime_ticks: u64,
  /// `None` until the node has been stored.
  pub hash: Option<Hash>,
}

impl TreeNode {
  pub fn file(is_exe: bool, mtime_ticks: u64) -> Self {
    Self {
      is_exe,
      mtime_ticks,
      ..Self::default()
    }
  }

  pub fn dir(children: TreeNodeMap) -> Self {
    Self {
      is_dir: true,
      children,
      ..Self::default()
    }
  }

  pub fn empty_dir() -> Self {
    Self::dir(TreeNodeMap::new())
  }

  pub fn with_hash(mut self, hash: Hash) -> Self {
    self.hash = Some(hash);
    self
  }

  pub fn with_mtime(mut self, mtime_ticks: u64) -> Self {
    self.mtime_ticks = mtime_ticks;
    self
  }

  pub fn has_children(&self) -> bool {
    !self.children.is_empty()
  }

  /// Number of file nodes in the subtree.
  pub fn file_count(&self) -> usize {
    if self.is_dir {
      self.children.values().map(TreeNode::file_count).sum()
    } else {
      1
    }
  }

  /// Slash-separated relative paths of every file in the subtree, sorted.
  pub fn file_paths(&self) -> Vec<String> {
    let mut paths = Vec::new();
    collect_file_paths(self, "", &mut paths);
    paths
  }
}

fn collect_file_paths(node: &TreeNode, prefix: &str, out: &mut Vec<String>) {
  for (name, child) in &node.children {
    let path = if prefix.is_empty() {
      name.clone()
    } else {
      format!("{}/{}", prefix, name)
    };
    if child.is_dir {
      collect_file_paths(child, &path, out);
    } else {
      out.push(path);
    }
  }
}

/// Split a slash-separated path into segments, ignoring empty and `.` segments.
///
/// `"/"`, `""` and `"."` all denote the root and yield no segments.
pub fn split_path(path: &str) -> Vec<&str> {
  path.split('/').filter(|s| !s.is_empty() && *s != ".").collect()
}

/// Wrap `tree` under one new directory per segment of `path`.
///
/// The new directories are unhashed and flagged as synthesized. A root path
/// returns the tree unchanged.
pub fn prepend_path(path: &str, tree: TreeNode) -> TreeNode {
  split_path(path).into_iter().rev().fold(tree, |child, segment| {
    let mut children = TreeNodeMap::new();
    children.insert(segment.to_string(), child);
    TreeNode {
      is_link: true,
      ..TreeNode::dir(children)
    }
  })
}

/// Descend through `path`; `None` if a segment is missing or crosses a file.
pub fn walk_path<'a>(path: &str, tree: &'a TreeNode) -> Option<&'a TreeNode> {
  split_path(path).into_iter().try_fold(tree, |node, segment| {
    if node.is_dir { node.children.get(segment) } else { None }
  })
}

fn child_path(parent: &str, name: &str) -> String {
  if parent.is_empty() || parent == "/" {
    name.to_string()
  } else {
    format!("{}/{}", parent, name)
  }
}

/// Structural union of two trees. `name` locates the pair in error messages.
///
/// Directories merge recursively and keep `a`'s link flag. On a file
/// collision `b` wins, and a file meeting a directory is a `MergeConflict`.
pub fn merge_trees2(a: &TreeNode, b: &TreeNode, name: &str) -> Result<TreeNode, TreeError> {
  match (a.is_dir, b.is_dir) {
    (true, true) => {
      let mut merged = a.clone();
      for (child_name, b_child) in &b.children {
        let next = match merged.children.get(child_name) {
          Some(a_child) => merge_trees2(a_child, b_child, &child_path(name, child_name))?,
          None => b_child.clone(),
        };
        merged.children.insert(child_name.clone(), next);
      }
      merged.hash = None;
      Ok(merged)
    }
    (false, false) => Ok(b.clone()),
    _ => Err(TreeError::MergeConflict {
      path: if name.is_empty() { "/".to_string() } else { name.to_string() },
    }),
  }
}

/// Left fold of `merge_trees2`; an empty list yields an empty directory.
pub fn merge_trees(trees: &[TreeNode]) -> Result<TreeNode, TreeError> {
  let Some((first, rest)) = trees.split_first() else {
    return Ok(TreeNode::empty_dir());
  };
  rest.iter().try_fold(first.clone(), |acc, tree| merge_trees2(&acc, tree, ""))
}

/// Re-select an in-memory tree through `filter`.
///
/// Matching and pruning follow `scan` exactly. File hashes are kept; a
/// directory keeps its hash only if filtering left it unchanged.
pub fn apply_filter(tree: &TreeNode, filter: &NameFilter) -> TreeNode {
  filter_node(tree, filter, filter.root())
}

fn filter_node(tree: &TreeNode, filter: &NameFilter, at: FilterId) -> TreeNode {
  if !tree.is_dir {
    return tree.clone();
  }

  let mut children = TreeNodeMap::new();
  let mut changed = false;

  for (name, child) in &tree.children {
    let Some(m) = filter.apply(at, name, child.is_dir) else {
      changed = true;
      continue;
    };
    let filtered = filter_node(child, filter, m.next);
    if m.volatile && filtered.is_dir && !filtered.has_children() {
      changed = true;
      continue;
    }
    if m.name != *name || filtered.hash.is_none() || filtered.hash != child.hash {
      changed = true;
    }
    children.insert(m.name, filtered);
  }

  TreeNode {
    is_dir: true,
    is_exe: false,
    is_link: tree.is_link,
    children,
    mtime_ticks: tree.mtime_ticks,
    hash: if changed { None } else { tree.hash.clone() },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::hash::{HashKind, hash_bytes};

  fn file(content: &str) -> TreeNode {
    TreeNode::file(false, 0).with_hash(hash_bytes(content.as_bytes(), HashKind::File))
  }

  fn dir(entries: Vec<(&str, TreeNode)>) -> TreeNode {
    TreeNode::dir(entries.into_iter().map(|(n, t)| (n.to_string(), t)).collect())
  }

  #[test]
  fn split_path_ignores_empty_segments() {
    assert!(split_path("/").is_empty());
    assert!(split_path("").is_empty());
    assert_eq!(split_path("/a/b/"), vec!["a", "b"]);
    assert_eq!(split_path("a//./b"), vec!["a", "b"]);
  }

  #[test]
  fn prepend_wraps_deepest_first() {
    let tree = dir(vec![("x.txt", file("x"))]);
    let wrapped = prepend_path("/out/sub", tree.clone());
    assert!(wrapped.is_link);
    assert!(wrapped.hash.is_none());
    let sub = walk_path("out/sub", &wrapped).unwrap();
    assert_eq!(sub, &tree);
  }

  #[test]
  fn prepend_root_is_identity() {
    let tree = dir(vec![("x.txt", file("x"))]);
    assert_eq!(prepend_path("/", tree.clone()), tree);
  }

  #[test]
  fn walk_path_stops_at_missing_or_file() {
    let tree = dir(vec![("a", dir(vec![("f", file("f"))]))]);
    assert!(walk_path("a", &tree).is_some());
    assert!(walk_path("a/f", &tree).is_some());
    assert!(walk_path("a/f/g", &tree).is_none());
    assert!(walk_path("b", &tree).is_none());
    assert_eq!(walk_path("/", &tree), Some(&tree));
  }

  #[test]
  fn merge_disjoint_is_union() {
    let a = dir(vec![("a.txt", file("a")), ("d", dir(vec![("x", file("x"))]))]);
    let b = dir(vec![("b.txt", file("b")), ("d", dir(vec![("y", file("y"))]))]);
    let merged = merge_trees2(&a, &b, "").unwrap();
    assert_eq!(merged.file_paths(), vec!["a.txt", "b.txt", "d/x", "d/y"]);
    assert!(merged.hash.is_none());
  }

  #[test]
  fn merge_keeps_link_flag_of_first() {
    let linked = prepend_path("/sub", dir(vec![("a", file("a"))]));
    let plain = dir(vec![("b", file("b"))]);

    assert!(merge_trees2(&linked, &plain, "").unwrap().is_link);
    assert!(!merge_trees2(&plain, &linked, "").unwrap().is_link);
  }

  #[test]
  fn merge_file_collision_keeps_second() {
    let a = dir(vec![("f", file("first"))]);
    let b = dir(vec![("f", file("second"))]);
    let merged = merge_trees2(&a, &b, "").unwrap();
    assert_eq!(merged.children["f"].hash, b.children["f"].hash);
  }

  #[test]
  fn merge_file_against_dir_conflicts() {
    let a = dir(vec![("p", dir(vec![("q", file("file"))]))]);
    let b = dir(vec![("p", dir(vec![("q", dir(vec![]))]))]);
    let err = merge_trees2(&a, &b, "").unwrap_err();
    match err {
      TreeError::MergeConflict { path } => assert_eq!(path, "p/q"),
      other => panic!("unexpected error {:?}", other),
    }
  }

  #[test]
  fn merge_list_edge_cases() {
    let empty = merge_trees(&[]).unwrap();
    assert!(empty.is_dir);
    assert!(!empty.has_children());

    let single = dir(vec![("f", file("f"))]).with_hash(hash_bytes(b"d", HashKind::Dir));
    assert_eq!(merge_trees(std::slice::from_ref(&single)).unwrap(), single);

    let three = merge_trees(&[
      dir(vec![("a", file("a"))]),
      dir(vec![("b", file("b"))]),
      dir(vec![("a", file("a2"))]),
    ])
    .unwrap();
    assert_eq!(three.file_paths(), vec!["a", "b"]);
    assert_eq!(three.children["a"].hash, file("a2").hash);
  }

  fn sample() -> TreeNode {
    dir(vec![(
      "data",
      dir(vec![
        ("t1.txt", file("t1")),
        ("j1.js", file("j1")),
        (
          "dir1",
          dir(vec![
            ("t11.txt", file("t11")),
            ("dir1txt", dir(vec![("t111.txt", file("t111"))])),
            ("dir1js", dir(vec![("j11i.js", file("j11i"))])),
          ]),
        ),
      ]),
    )])
  }

  #[test]
  fn apply_filter_prunes_empty_wildcard_branches() {
    let filtered = apply_filter(&sample(), &NameFilter::from_glob("**/*.txt").unwrap());
    assert_eq!(
      filtered.file_paths(),
      vec!["data/dir1/dir1txt/t111.txt", "data/dir1/t11.txt", "data/t1.txt"]
    );
    assert!(walk_path("data/dir1/dir1js", &filtered).is_none());
  }

  #[test]
  fn apply_filter_keeps_file_hashes_and_resets_changed_dirs() {
    let mut tree = sample();
    tree.hash = Some(hash_bytes(b"root", HashKind::Dir));
    let filtered = apply_filter(&tree, &NameFilter::from_glob("**/*.txt").unwrap());
    assert!(filtered.hash.is_none());
    assert_eq!(
      walk_path("data/t1.txt", &filtered).unwrap().hash,
      walk_path("data/t1.txt", &tree).unwrap().hash
    );
  }

  #[test]
  fn apply_filter_keeps_hash_when_nothing_changes() {
    let mut leaf = dir(vec![("a", file("a"))]);
    leaf.hash = Some(hash_bytes(b"leaf", HashKind::Dir));
    let filtered = apply_filter(&leaf, &NameFilter::any());
    assert_eq!(filtered.hash, leaf.hash);
  }

  #[test]
  fn apply_filter_prunes_only_directories_under_volatile_match() {
    let tree = dir(vec![
      ("x", file("x")),
      ("d", dir(vec![("foo", file("foo"))])),
      ("e", dir(vec![("bar", file("bar"))])),
    ]);
    let filtered = apply_filter(&tree, &NameFilter::from_glob("*/foo").unwrap());
    assert_eq!(filtered.file_paths(), vec!["d/foo", "x"]);
    assert!(walk_path("e", &filtered).is_none());
  }
}
