//! Implementation of the `fftt build` command.
//!
//! Loads a build file, evaluates one task and points `<build root>/latest` at
//! the tag directory holding the output links of this build.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use fftt_lib::config::EvalConfig;
use fftt_lib::consts::LATEST_LINK;
use fftt_lib::eval::{EvalReport, Evaluator, TaskOutcome};
use fftt_lib::graph::BuildGraph;
use fftt_lib::platform::link::replace_symlink;
use fftt_lib::repo::Repository;
use fftt_lib::runner::{ContainerRunner, LocalRunner, Runner};

use super::runtime;
use crate::output::{OutputFormat, format_duration, print_json, print_stat, print_success, print_warning};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum RunnerKind {
  /// Child processes on this machine
  #[default]
  Local,
  /// `docker run` with the task's image
  Container,
}

impl RunnerKind {
  fn runner(self) -> Arc<dyn Runner> {
    match self {
      RunnerKind::Local => Arc::new(LocalRunner::new()),
      RunnerKind::Container => Arc::new(ContainerRunner::new()),
    }
  }
}

pub struct BuildArgs {
  pub task: Option<String>,
  pub file: PathBuf,
  pub tag: Option<String>,
  pub no_cache: bool,
  pub jobs: Option<usize>,
  pub runner: RunnerKind,
  pub timeout: Option<u64>,
}

impl BuildArgs {
  /// Environment defaults with command-line flags on top.
  fn config(&self) -> EvalConfig {
    let mut config = EvalConfig::from_env();
    if let Some(jobs) = self.jobs {
      config = config.with_parallelism(jobs);
    }
    if self.no_cache {
      config = config.with_cache(false);
    }
    if let Some(secs) = self.timeout {
      config = config.with_timeout(Some(Duration::from_secs(secs)));
    }
    config
  }
}

#[derive(Serialize)]
struct BuildSummary {
  task: String,
  hash: String,
  tag: String,
  path: PathBuf,
  outcomes: BTreeMap<String, String>,
}

impl BuildSummary {
  fn new(report: &EvalReport, tag: &str, path: PathBuf) -> Self {
    Self {
      task: report.target.clone(),
      hash: report.hash.to_string(),
      tag: tag.to_string(),
      path,
      outcomes: report.outcomes.iter().map(|(id, o)| (id.clone(), o.to_string())).collect(),
    }
  }
}

fn default_tag() -> String {
  humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}

pub fn cmd_build(args: BuildArgs, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  runtime()?.block_on(build(args, output, start))
}

async fn build(args: BuildArgs, output: OutputFormat, start: Instant) -> Result<()> {
  let file = dunce::canonicalize(&args.file).with_context(|| format!("Build file not found: {}", args.file.display()))?;
  let graph = BuildGraph::load(&file)
    .await
    .with_context(|| format!("Failed to load build file: {}", file.display()))?;

  let task = args
    .task
    .clone()
    .or_else(|| graph.default_task.clone())
    .context("No task given and the build file names no default")?;
  let tag = args.tag.clone().unwrap_or_else(default_tag);

  let repo = Repository::open(&graph.repo_root)
    .await
    .with_context(|| format!("Failed to open repository: {}", graph.repo_root.display()))?;
  let tag_dir = repo.tag_path(&tag);

  let evaluator = Evaluator::new(repo, args.runner.runner(), args.config());
  let report = evaluator
    .evaluate(&graph, &task, &tag)
    .await
    .with_context(|| format!("Build of {} failed", task))?;

  let latest = graph.build_root.join(LATEST_LINK);
  match replace_symlink(&tag_dir, &latest).await {
    Ok(()) => info!(link = ?latest, tag = %tag, "updated latest link"),
    Err(e) => print_warning(&format!("Failed to update {}: {}", latest.display(), e)),
  }

  let path = tag_dir.join(&task);
  if output.is_json() {
    print_json(&BuildSummary::new(&report, &tag, path))?;
  } else {
    print_success(&format!("Built {}", task));
    print_stat("Output", report.hash.as_str());
    print_stat("Path", &path.display().to_string());
    print_stat("Tag", &tag);
    print_stat("Executed", &report.count(TaskOutcome::Executed).to_string());
    print_stat("Cached", &report.count(TaskOutcome::Cached).to_string());
    print_stat("Aggregated", &report.count(TaskOutcome::Aggregated).to_string());
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
