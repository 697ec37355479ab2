//! Evaluation settings.

use std::env;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::consts::{NO_CACHE_ENV, PARALLELISM_ENV, TIMEOUT_ENV};

/// Settings for one [`Evaluator`](crate::eval::Evaluator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalConfig {
  /// Maximum number of commands running at once.
  pub parallelism: usize,
  /// Consult memo records before running a command.
  pub use_cache: bool,
  /// Per-command deadline.
  pub timeout: Option<Duration>,
}

impl Default for EvalConfig {
  fn default() -> Self {
    Self {
      parallelism: thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1),
      use_cache: true,
      timeout: None,
    }
  }
}

fn parse_positive(name: &str) -> Option<u64> {
  let value = env::var(name).ok()?;
  match value.trim().parse::<u64>() {
    Ok(n) if n > 0 => Some(n),
    _ => {
      warn!(var = name, value = %value, "ignoring invalid value");
      None
    }
  }
}

fn parse_flag(name: &str) -> bool {
  env::var(name)
    .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
    .unwrap_or(false)
}

impl EvalConfig {
  /// Defaults overridden by `FFTT_PARALLELISM`, `FFTT_TIMEOUT_SECS` and
  /// `FFTT_NO_CACHE`. Unparseable values are ignored with a warning.
  pub fn from_env() -> Self {
    let mut config = Self::default();
    if let Some(n) = parse_positive(PARALLELISM_ENV) {
      config.parallelism = usize::try_from(n).unwrap_or(usize::MAX);
    }
    if let Some(secs) = parse_positive(TIMEOUT_ENV) {
      config.timeout = Some(Duration::from_secs(secs));
    }
    if parse_flag(NO_CACHE_ENV) {
      config.use_cache = false;
    }
    config
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  pub fn with_cache(mut self, use_cache: bool) -> Self {
    self.use_cache = use_cache;
    self
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }
}
