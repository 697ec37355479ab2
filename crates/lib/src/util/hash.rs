//! Hashing utilities for content-addressed storage.
//!
//! This module provides:
//! - `Hash`: a kind-tagged digest (`"<Kind>-<hex>"`) identifying every stored object
//! - `hash_bytes()` / `hash_reader()`: digests over raw content
//! - `hash_structured()`: digests over a structural serialization of JSON data,
//!   driven by a `HashSpec` describing which fields to include and in what order

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Separator placed between the kind tag and the hex digest.
const KIND_SEPARATOR: char = '-';

/// Separator joining structural tokens before digesting.
const TOKEN_SEPARATOR: &str = "/";

/// Error during hashing.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("invalid hash kind: {0:?}")]
  InvalidKind(String),

  #[error("malformed hash: {0:?}")]
  Malformed(String),

  #[error("expected a primitive value at {path}, found {found}")]
  NotPrimitive { path: String, found: &'static str },

  #[error("expected {expected} at {path}, found {found}")]
  Shape {
    path: String,
    expected: &'static str,
    found: &'static str,
  },

  #[error("failed to read hash input: {0}")]
  Io(#[from] std::io::Error),
}

/// The kind of object a hash identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashKind {
  /// Regular file.
  File,
  /// Executable file.
  Exec,
  /// Directory produced by scanning.
  Dir,
  /// Directory synthesized by a rename or relocation.
  Link,
  /// Task definition.
  Task,
}

impl HashKind {
  pub fn tag(self) -> char {
    match self {
      HashKind::File => 'F',
      HashKind::Exec => 'X',
      HashKind::Dir => 'D',
      HashKind::Link => 'L',
      HashKind::Task => 'T',
    }
  }

  /// Parse a kind tag. Lowercase tags are accepted and normalized.
  pub fn from_tag(tag: char) -> Result<Self, HashError> {
    match tag.to_ascii_uppercase() {
      'F' => Ok(HashKind::File),
      'X' => Ok(HashKind::Exec),
      'D' => Ok(HashKind::Dir),
      'L' => Ok(HashKind::Link),
      'T' => Ok(HashKind::Task),
      _ => Err(HashError::InvalidKind(tag.to_string())),
    }
  }

  pub fn is_directory(self) -> bool {
    matches!(self, HashKind::Dir | HashKind::Link)
  }

  pub fn for_file(is_exe: bool) -> Self {
    if is_exe { HashKind::Exec } else { HashKind::File }
  }

  pub fn for_dir(is_link: bool) -> Self {
    if is_link { HashKind::Link } else { HashKind::Dir }
  }
}

impl FromStr for HashKind {
  type Err = HashError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
      (Some(tag), None) => HashKind::from_tag(tag),
      _ => Err(HashError::InvalidKind(s.to_string())),
    }
  }
}

impl fmt::Display for HashKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.tag())
  }
}

/// A kind-tagged content hash, e.g. `"D-3f2a..."`.
///
/// Hashes are the on-disk and in-memory identifier of every object in the
/// repository. They are only constructed by hashing or by `Hash::parse`, so
/// the kind tag is always valid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash(String);

impl Hash {
  pub fn parse(value: &str) -> Result<Self, HashError> {
    let mut chars = value.chars();
    let tag = chars.next().ok_or_else(|| HashError::Malformed(value.to_string()))?;
    HashKind::from_tag(tag)?;
    let rest = chars.as_str();
    let digest = rest
      .strip_prefix(KIND_SEPARATOR)
      .ok_or_else(|| HashError::Malformed(value.to_string()))?;
    if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
      return Err(HashError::Malformed(value.to_string()));
    }
    Ok(Hash(format!("{}{}{}", tag.to_ascii_uppercase(), KIND_SEPARATOR, digest)))
  }

  fn from_digest(kind: HashKind, digest: &[u8]) -> Self {
    Hash(format!("{}{}{}", kind.tag(), KIND_SEPARATOR, hex::encode(digest)))
  }

  pub fn kind(&self) -> HashKind {
    // The first character was validated on construction.
    self
      .0
      .chars()
      .next()
      .and_then(|c| HashKind::from_tag(c).ok())
      .unwrap_or(HashKind::File)
  }

  pub fn digest(&self) -> &str {
    &self.0[2..]
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_directory(&self) -> bool {
    self.kind().is_directory()
  }
}

impl fmt::Display for Hash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl AsRef<str> for Hash {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl TryFrom<String> for Hash {
  type Error = HashError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Hash::parse(&value)
  }
}

impl From<Hash> for String {
  fn from(hash: Hash) -> Self {
    hash.0
  }
}

impl FromStr for Hash {
  type Err = HashError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Hash::parse(s)
  }
}

/// True if the hash identifies a directory (kind `D` or `L`).
pub fn is_directory_kind(hash: &Hash) -> bool {
  hash.is_directory()
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8], kind: HashKind) -> Hash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  Hash::from_digest(kind, &hasher.finalize())
}

/// Hash everything readable from `reader`.
pub async fn hash_reader<R>(mut reader: R, kind: HashKind) -> Result<Hash, HashError>
where
  R: AsyncRead + Unpin,
{
  let mut hasher = Sha256::new();
  let mut buffer = vec![0u8; 8192];

  loop {
    let bytes_read = reader.read(&mut buffer).await?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(Hash::from_digest(kind, &hasher.finalize()))
}

/// Describes how a value is serialized for structural hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashSpec {
  /// A primitive value.
  Value,
  /// Array elements in order, each primitive or following the sub-spec.
  Array(Option<Box<HashSpec>>),
  /// Map entries sorted by key, values primitive or following the sub-spec.
  Map(Option<Box<HashSpec>>),
  /// Object fields in the given order.
  Fields(Vec<(String, HashSpec)>),
}

impl HashSpec {
  pub fn array() -> Self {
    HashSpec::Array(None)
  }

  pub fn map() -> Self {
    HashSpec::Map(None)
  }

  pub fn array_of(spec: HashSpec) -> Self {
    HashSpec::Array(Some(Box::new(spec)))
  }

  pub fn fields<I, K>(fields: I) -> Self
  where
    I: IntoIterator<Item = (K, HashSpec)>,
    K: Into<String>,
  {
    HashSpec::Fields(fields.into_iter().map(|(k, s)| (k.into(), s)).collect())
  }
}

fn value_type(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

fn push_primitive(value: Option<&Value>, path: &str, out: &mut Vec<String>) -> Result<(), HashError> {
  let token = match value {
    None => "NONE".to_string(),
    Some(Value::Null) => "NULL".to_string(),
    Some(Value::Bool(true)) => "T".to_string(),
    Some(Value::Bool(false)) => "F".to_string(),
    Some(Value::Number(n)) => n.to_string(),
    Some(Value::String(s)) => s.clone(),
    Some(other) => {
      return Err(HashError::NotPrimitive {
        path: path.to_string(),
        found: value_type(other),
      });
    }
  };
  out.push(token);
  Ok(())
}

fn push_element(spec: Option<&HashSpec>, value: Option<&Value>, path: &str, out: &mut Vec<String>) -> Result<(), HashError> {
  match spec {
    Some(spec) => push_tokens(spec, value, path, out),
    None => push_primitive(value, path, out),
  }
}

fn push_tokens(spec: &HashSpec, value: Option<&Value>, path: &str, out: &mut Vec<String>) -> Result<(), HashError> {
  if let HashSpec::Value = spec {
    return push_primitive(value, path, out);
  }

  // Absent and null containers hash like primitives.
  let value = match value {
    None | Some(Value::Null) => return push_primitive(value, path, out),
    Some(value) => value,
  };

  match (spec, value) {
    (HashSpec::Array(sub), Value::Array(items)) => {
      for (index, item) in items.iter().enumerate() {
        push_element(sub.as_deref(), Some(item), &format!("{}[{}]", path, index), out)?;
      }
      Ok(())
    }
    (HashSpec::Map(sub), Value::Object(map)) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      for key in keys {
        out.push(key.clone());
        push_element(sub.as_deref(), map.get(key), &format!("{}.{}", path, key), out)?;
      }
      Ok(())
    }
    (HashSpec::Fields(fields), Value::Object(map)) => {
      out.push("{".to_string());
      for (key, field_spec) in fields {
        out.push(key.clone());
        push_tokens(field_spec, map.get(key), &format!("{}.{}", path, key), out)?;
      }
      out.push("}".to_string());
      Ok(())
    }
    (HashSpec::Array(_), other) => Err(HashError::Shape {
      path: path.to_string(),
      expected: "array",
      found: value_type(other),
    }),
    (_, other) => Err(HashError::Shape {
      path: path.to_string(),
      expected: "object",
      found: value_type(other),
    }),
  }
}

/// Serialize `data` into the token stream that `hash_structured` digests.
pub fn structured_tokens(spec: &HashSpec, data: &Value) -> Result<Vec<String>, HashError> {
  let mut tokens = Vec::new();
  push_tokens(spec, Some(data), "$", &mut tokens)?;
  Ok(tokens)
}

/// Compute a digest over a structural serialization of `data`.
///
/// Map entries are emitted sorted by key, which is what makes directory
/// hashes independent of scan order.
pub fn hash_structured(spec: &HashSpec, data: &Value, kind: HashKind) -> Result<Hash, HashError> {
  let tokens = structured_tokens(spec, data)?;
  Ok(hash_bytes(tokens.join(TOKEN_SEPARATOR).as_bytes(), kind))
}
