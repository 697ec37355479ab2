mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fftt_lib::consts::GRAPH_FILE;

use crate::cmd::{BuildArgs, RunnerKind};
use crate::output::{OutputFormat, print_error};

/// fftt - content-addressed build engine
#[derive(Parser)]
#[command(name = "fftt")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (RUST_LOG takes precedence)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Evaluate a task of a build file
  Build {
    /// Task to build (default: the build file's default task)
    task: Option<String>,

    /// Build file
    #[arg(short, long, default_value = GRAPH_FILE)]
    file: PathBuf,

    /// Tag naming this build's output links (default: current time)
    #[arg(long)]
    tag: Option<String>,

    /// Run every command even when a memo record exists
    #[arg(long)]
    no_cache: bool,

    /// Maximum number of commands running at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Where commands run
    #[arg(long, value_enum, default_value_t)]
    runner: RunnerKind,

    /// Per-command deadline in seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Materialize a stored object and print its path
  Checkout {
    hash: String,

    /// Repository root (default: from the build file, else ./repo)
    #[arg(short, long)]
    repo: Option<PathBuf>,
  },

  /// Print a stored tree listing or a file's contents
  Show {
    hash: String,

    /// Repository root (default: from the build file, else ./repo)
    #[arg(short, long)]
    repo: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn init_logging(verbose: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Commands::Build {
      task,
      file,
      tag,
      no_cache,
      jobs,
      runner,
      timeout,
      output,
    } => cmd::cmd_build(
      BuildArgs {
        task,
        file,
        tag,
        no_cache,
        jobs,
        runner,
        timeout,
      },
      output,
    ),
    Commands::Checkout { hash, repo } => cmd::cmd_checkout(&hash, repo),
    Commands::Show { hash, repo, output } => cmd::cmd_show(&hash, repo, output),
  }
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  if let Err(e) = run(cli) {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}
