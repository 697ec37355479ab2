//! Single-segment wildcard patterns.
//!
//! `?` matches one character and `*` matches any run of characters; every
//! other character is literal. A pattern is translated into an anchored
//! regular expression and never sees a `/`, since it is applied to one path
//! segment at a time.

use std::fmt;

use regex::Regex;

use super::FilterError;

/// Translate a segment glob into an anchored regular expression source.
pub fn glob_to_regex(glob: &str) -> String {
  let mut source = String::with_capacity(glob.len() + 8);
  // Names may contain newlines; `.` has to cover them too.
  source.push_str("(?s)^");
  let mut literal = [0u8; 4];
  for c in glob.chars() {
    match c {
      '?' => source.push('.'),
      '*' => source.push_str(".*"),
      other => source.push_str(&regex::escape(other.encode_utf8(&mut literal))),
    }
  }
  source.push('$');
  source
}

/// A compiled segment pattern such as `*.txt` or `n?sc?r`.
#[derive(Clone)]
pub struct SegmentPattern {
  source: String,
  regex: Regex,
}

impl SegmentPattern {
  pub fn new(glob: &str) -> Result<Self, FilterError> {
    let regex = Regex::new(&glob_to_regex(glob)).map_err(|source| FilterError::Pattern {
      pattern: glob.to_string(),
      source,
    })?;
    Ok(Self {
      source: glob.to_string(),
      regex,
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn matches(&self, name: &str) -> bool {
    self.regex.is_match(name)
  }
}

impl PartialEq for SegmentPattern {
  fn eq(&self, other: &Self) -> bool {
    self.source == other.source
  }
}

impl Eq for SegmentPattern {}

impl fmt::Debug for SegmentPattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}", self.source)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pattern(glob: &str) -> SegmentPattern {
    SegmentPattern::new(glob).unwrap()
  }

  #[test]
  fn translates_wildcards_and_escapes_the_rest() {
    assert_eq!(glob_to_regex("*.js"), r"(?s)^.*\.js$");
    assert_eq!(glob_to_regex("a?b"), "(?s)^a.b$");
    assert_eq!(glob_to_regex("a+(b)"), r"(?s)^a\+\(b\)$");
  }

  #[test]
  fn literal_names_match_exactly() {
    let p = pattern("foobar");
    assert!(p.matches("foobar"));
    assert!(!p.matches("foo"));
    assert!(!p.matches("ob"));
    assert!(!p.matches(""));
    assert!(!p.matches("myfoobar"));
    assert!(!p.matches("foobarnice"));
  }

  #[test]
  fn regex_metacharacters_are_literal() {
    let p = pattern("f$oo.b^ar");
    assert!(p.matches("f$oo.b^ar"));
    assert!(!p.matches("f$ooxb^ar"));
    assert!(pattern("a+(b)").matches("a+(b)"));
    assert!(!pattern("a+").matches("aa"));
    assert!(pattern("[x]{2}").matches("[x]{2}"));
    assert!(!pattern("[x]{2}").matches("xx"));
    assert!(pattern(r"a\b").matches(r"a\b"));
  }

  #[test]
  fn question_mark_matches_one_char() {
    let p = pattern("foo?ar");
    assert!(p.matches("foobar"));
    assert!(p.matches("foocar"));
    assert!(p.matches("foo.ar"));
    assert!(!p.matches("fooar"));

    let p = pattern("n?sc?r");
    assert!(p.matches("nascar"));
    assert!(p.matches("nosc.r"));
    assert!(!p.matches("nasca"));
    assert!(pattern("?").matches("é"));
  }

  #[test]
  fn star_matches_any_run() {
    let p = pattern("*.js");
    assert!(p.matches("foo.js"));
    assert!(p.matches("$.js"));
    assert!(p.matches(".js"));
    assert!(!p.matches("foo.cs"));
    assert!(!p.matches("foo.json"));
    assert!(pattern("a*").matches("a\nb"));
  }

  #[test]
  fn star_backtracks() {
    let p = pattern("a*b*c");
    assert!(p.matches("abc"));
    assert!(p.matches("aXbYbZc"));
    assert!(!p.matches("aXbY"));
    assert!(pattern("**x").matches("abx"));
  }

  #[test]
  fn patterns_compare_by_source() {
    assert_eq!(pattern("*.rs"), pattern("*.rs"));
    assert_ne!(pattern("*.rs"), pattern("*.toml"));
    assert_eq!(format!("{:?}", pattern("*.rs")), "\"*.rs\"");
  }
}
