mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::OutputFormat;

/// xform - transform pipeline inspector
#[derive(Parser)]
#[command(name = "xform")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Register a pipeline definition and show how streams flow through it
  Plan {
    /// Path to the pipeline definition (JSON)
    #[arg(default_value = "pipeline.json")]
    definition: PathBuf,
  },

  /// List the artifacts under a transform output root
  Inspect {
    /// Output root to inspect
    root: PathBuf,
  },

  /// Show per-entry changes of the jars under a directory
  Changes {
    /// Directory containing jars
    root: PathBuf,

    /// Zip cache directory (default: XFORM_ZIP_CACHE or <build>/intermediates/zip-cache)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// List every entry as new, ignoring the cache
    #[arg(long)]
    full: bool,

    /// Update the cache once changes are computed
    #[arg(long)]
    commit: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Plan { definition } => cmd::cmd_plan(&definition, cli.output),
    Commands::Inspect { root } => cmd::cmd_inspect(&root, cli.output),
    Commands::Changes {
      root,
      cache,
      full,
      commit,
    } => cmd::cmd_changes(&root, cache, full, commit, cli.output),
  }
}
