mod build;
mod checkout;
mod show;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fftt_lib::consts::GRAPH_FILE;
use fftt_lib::graph::BuildGraph;
use fftt_lib::repo::Repository;

pub use build::{BuildArgs, RunnerKind, cmd_build};
pub use checkout::cmd_checkout;
pub use show::cmd_show;

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}

/// Repository named on the command line, else the one configured by the
/// build file in the current directory, else `./repo`.
async fn open_repo(repo: Option<PathBuf>) -> Result<Repository> {
  let root = match repo {
    Some(root) => root,
    None if Path::new(GRAPH_FILE).exists() => {
      BuildGraph::load(Path::new(GRAPH_FILE))
        .await
        .with_context(|| format!("Failed to load {}", GRAPH_FILE))?
        .repo_root
    }
    None => PathBuf::from("repo"),
  };
  Repository::open(&root)
    .await
    .with_context(|| format!("Failed to open repository: {}", root.display()))
}
