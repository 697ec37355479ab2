use std::path::PathBuf;

use anyhow::{Context, Result};

use fftt_lib::util::hash::Hash;

use super::{open_repo, runtime};

/// Materialize `hash` under the repository's `mnt` directory and print the
/// resulting path.
pub fn cmd_checkout(hash: &str, repo: Option<PathBuf>) -> Result<()> {
  let hash = Hash::parse(hash).with_context(|| format!("Invalid hash: {}", hash))?;

  runtime()?.block_on(async {
    let repo = open_repo(repo).await?;
    let path = repo
      .check_out_tree(&hash)
      .await
      .with_context(|| format!("Failed to check out {}", hash))?;
    println!("{}", path.display());
    Ok::<_, anyhow::Error>(())
  })
}
