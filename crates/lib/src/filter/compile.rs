//! Compilation of glob strings and glob arrays into filter graphs.
//!
//! - A path pattern `a/b/c` compiles right to left: `c` becomes the
//!   continuation of `b`, which becomes the continuation of `a`.
//! - A glob array whose first element ends in `/...` is a *sequence*: each
//!   element applies to the next path depth.
//! - Any other glob array is an *alternation*: every element compiles against
//!   the same continuation and the first match wins.

use serde::{Deserialize, Serialize};

use super::{FilterError, FilterId, FilterNode, NameFilter, SegmentPattern};

/// Suffix marking a glob array as an ordered sequence.
pub const CONTINUE_MARKER: &str = "/...";

/// One element of a glob array: a pattern or a nested array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GlobItem {
  Pattern(String),
  Group(Vec<GlobItem>),
}

impl GlobItem {
  pub fn pattern(pattern: impl Into<String>) -> Self {
    GlobItem::Pattern(pattern.into())
  }
}

impl From<&str> for GlobItem {
  fn from(pattern: &str) -> Self {
    GlobItem::Pattern(pattern.to_string())
  }
}

pub fn has_continue_marker(pattern: &str) -> bool {
  pattern.ends_with(CONTINUE_MARKER)
}

pub fn strip_continue_marker(pattern: &str) -> &str {
  pattern.strip_suffix(CONTINUE_MARKER).unwrap_or(pattern)
}

fn is_sequence(items: &[GlobItem]) -> bool {
  matches!(items.first(), Some(GlobItem::Pattern(p)) if has_continue_marker(p))
}

impl NameFilter {
  /// Compile a single path pattern such as `**/*.txt`.
  pub fn from_glob(pattern: &str) -> Result<Self, FilterError> {
    let mut filter = NameFilter::nothing();
    let root = filter.compile_path(pattern, NameFilter::NOTHING)?;
    filter.set_root(root);
    Ok(filter)
  }

  /// Compile a glob array.
  pub fn from_glob_array(items: &[GlobItem]) -> Result<Self, FilterError> {
    let mut filter = NameFilter::nothing();
    let root = filter.compile_array(items, NameFilter::NOTHING)?;
    filter.set_root(root);
    Ok(filter)
  }

  fn compile_segment(&mut self, segment: &str, next: FilterId) -> Result<FilterId, FilterError> {
    let id = match segment {
      "" | "*" if next == NameFilter::NOTHING => NameFilter::ANY,
      "" | "*" => self.push(FilterNode::Star { next }),
      "**" => self.push(FilterNode::DoubleStar { next }),
      _ => self.push(FilterNode::Pattern {
        pattern: SegmentPattern::new(segment)?,
        next,
      }),
    };
    Ok(id)
  }

  fn compile_path(&mut self, pattern: &str, next: FilterId) -> Result<FilterId, FilterError> {
    pattern
      .split('/')
      .rev()
      .try_fold(next, |next, segment| self.compile_segment(segment, next))
  }

  fn compile_item(&mut self, item: &GlobItem, next: FilterId) -> Result<FilterId, FilterError> {
    match item {
      GlobItem::Pattern(pattern) => self.compile_path(strip_continue_marker(pattern), next),
      GlobItem::Group(items) => self.compile_array(items, next),
    }
  }

  fn compile_array(&mut self, items: &[GlobItem], next: FilterId) -> Result<FilterId, FilterError> {
    if is_sequence(items) {
      return items.iter().rev().try_fold(next, |next, item| self.compile_item(item, next));
    }

    let alternatives = items
      .iter()
      .map(|item| self.compile_item(item, next))
      .collect::<Result<Vec<_>, _>>()?;
    let id = match alternatives.len() {
      0 => NameFilter::NOTHING,
      1 => alternatives[0],
      _ => self.push(FilterNode::Union(alternatives)),
    };
    Ok(id)
  }
}
