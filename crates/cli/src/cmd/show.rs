//! Implementation of the `fftt show` command.
//!
//! Directories are listed one file per line with hash and size; file objects
//! are written to stdout unchanged.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use fftt_lib::repo::Repository;
use fftt_lib::tree::TreeNode;
use fftt_lib::util::hash::Hash;

use super::{open_repo, runtime};
use crate::output::{OutputFormat, format_bytes, print_info, print_json};

/// `(path, hash)` for every file below `node`, in path order.
fn file_hashes(node: &TreeNode, prefix: &str, out: &mut Vec<(String, Hash)>) {
  for (name, child) in &node.children {
    let path = if prefix.is_empty() {
      name.clone()
    } else {
      format!("{}/{}", prefix, name)
    };
    if child.is_dir {
      file_hashes(child, &path, out);
    } else if let Some(hash) = &child.hash {
      out.push((path, hash.clone()));
    }
  }
}

async fn object_size(repo: &Repository, hash: &Hash) -> Option<u64> {
  tokio::fs::metadata(repo.object_path(hash)).await.ok().map(|m| m.len())
}

pub fn cmd_show(hash: &str, repo: Option<PathBuf>, output: OutputFormat) -> Result<()> {
  let hash = Hash::parse(hash).with_context(|| format!("Invalid hash: {}", hash))?;

  runtime()?.block_on(async {
    let repo = open_repo(repo).await?;

    if !hash.is_directory() {
      let bytes = repo
        .read_file_object(&hash)
        .await
        .with_context(|| format!("Failed to read {}", hash))?;
      std::io::stdout().write_all(&bytes).context("Failed to write to stdout")?;
      return Ok(());
    }

    let tree = repo
      .extract_tree(&hash)
      .await
      .with_context(|| format!("Failed to read tree {}", hash))?;
    let mut files = Vec::new();
    file_hashes(&tree, "", &mut files);

    if output.is_json() {
      let listing: BTreeMap<String, String> = files.into_iter().map(|(p, h)| (p, h.to_string())).collect();
      return print_json(&listing);
    }

    if files.is_empty() {
      print_info("Empty tree");
    }
    for (path, file_hash) in &files {
      let size = object_size(&repo, file_hash).await.map(format_bytes).unwrap_or_default();
      println!("{}  {:>9}  {}", file_hash, size, path);
    }
    Ok(())
  })
}
