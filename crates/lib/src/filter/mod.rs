//! Name filters: compiled glob predicates over path segments.
//!
//! A filter is applied to one path segment at a time. On a match it yields
//! the (possibly renamed) segment name, the filter to apply to that entry's
//! children, and whether the match is *volatile*: meaningful only if the
//! subtree beneath it ends up non-empty.
//!
//! Compiled filters are stored as tagged nodes in an arena and refer to each
//! other by `FilterId`, so recursive wildcards (`**`) and alternations are
//! plain data that can be inspected and printed.
//!
//! # Submodules
//!
//! - [`compile`] - glob strings and glob arrays to filter graphs
//! - [`pattern`] - single-segment `?`/`*` matching

pub mod compile;
pub mod pattern;

use std::fmt;

pub use compile::{CONTINUE_MARKER, GlobItem};
pub use pattern::SegmentPattern;

/// Errors from compiling globs.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
  #[error("invalid glob pattern {pattern:?}: {source}")]
  Pattern {
    pattern: String,
    #[source]
    source: regex::Error,
  },
}

/// Index of a node inside a `NameFilter` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterId(u32);

impl FilterId {
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

impl fmt::Display for FilterId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// One compiled filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNode {
  /// Never matches.
  Nothing,
  /// Matches every name and keeps matching everything below it.
  Any,
  /// Matches any single segment, then continues with `next`.
  Star { next: FilterId },
  /// Matches any number of directory levels, then defers to `next` at the
  /// first non-directory entry.
  DoubleStar { next: FilterId },
  /// Matches segments accepted by `pattern`, then continues with `next`.
  Pattern { pattern: SegmentPattern, next: FilterId },
  /// First matching alternative wins.
  Union(Vec<FilterId>),
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMatch {
  /// Name to record the entry under.
  pub name: String,
  /// Filter to apply to the entry's children.
  pub next: FilterId,
  /// The match only counts if the filtered subtree is non-empty.
  pub volatile: bool,
}

/// A compiled filter graph with a designated root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFilter {
  nodes: Vec<FilterNode>,
  root: FilterId,
}

impl NameFilter {
  /// Id of the shared never-matching node.
  pub const NOTHING: FilterId = FilterId(0);
  /// Id of the shared match-everything node.
  pub const ANY: FilterId = FilterId(1);

  fn empty_arena() -> Vec<FilterNode> {
    vec![FilterNode::Nothing, FilterNode::Any]
  }

  /// A filter that matches nothing.
  pub fn nothing() -> Self {
    Self {
      nodes: Self::empty_arena(),
      root: Self::NOTHING,
    }
  }

  /// A filter that matches everything at every depth.
  pub fn any() -> Self {
    Self {
      nodes: Self::empty_arena(),
      root: Self::ANY,
    }
  }

  pub fn root(&self) -> FilterId {
    self.root
  }

  pub fn node(&self, id: FilterId) -> &FilterNode {
    &self.nodes[id.index()]
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn matches_nothing(&self) -> bool {
    self.root == Self::NOTHING
  }

  pub(crate) fn push(&mut self, node: FilterNode) -> FilterId {
    let id = FilterId(self.nodes.len() as u32);
    self.nodes.push(node);
    id
  }

  pub(crate) fn set_root(&mut self, root: FilterId) {
    self.root = root;
  }

  /// Apply the filter node `at` to one entry.
  pub fn apply(&self, at: FilterId, name: &str, is_dir: bool) -> Option<FilterMatch> {
    match self.node(at) {
      FilterNode::Nothing => None,
      FilterNode::Any => Some(FilterMatch {
        name: name.to_string(),
        next: Self::ANY,
        volatile: false,
      }),
      FilterNode::Star { next } => Some(FilterMatch {
        name: name.to_string(),
        next: *next,
        volatile: true,
      }),
      FilterNode::DoubleStar { next } => {
        if is_dir {
          Some(FilterMatch {
            name: name.to_string(),
            next: at,
            volatile: true,
          })
        } else {
          self.apply(*next, name, false)
        }
      }
      FilterNode::Pattern { pattern, next } => pattern.matches(name).then(|| FilterMatch {
        name: name.to_string(),
        next: *next,
        volatile: false,
      }),
      FilterNode::Union(alternatives) => alternatives.iter().find_map(|alt| self.apply(*alt, name, is_dir)),
    }
  }

  /// Apply the root filter to one entry.
  pub fn apply_root(&self, name: &str, is_dir: bool) -> Option<FilterMatch> {
    self.apply(self.root, name, is_dir)
  }

  /// Whether a relative path would be selected: every segment but the last
  /// is treated as a directory, the last as a file unless `leaf_is_dir`.
  pub fn matches_path(&self, path: &str, leaf_is_dir: bool) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut at = self.root;
    for (index, segment) in segments.iter().enumerate() {
      let is_dir = index + 1 < segments.len() || leaf_is_dir;
      match self.apply(at, segment, is_dir) {
        Some(m) => at = m.next,
        None => return false,
      }
    }
    !segments.is_empty()
  }
}

impl Default for NameFilter {
  fn default() -> Self {
    Self::any()
  }
}
