mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::LoadArgs;
use crate::output::print_error;

/// deptrack - incremental loader for compiler dependency reports
#[derive(Parser)]
#[command(name = "deptrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Load the dependency reports of the targets in a manifest
  Load {
    /// Path to the targets manifest (JSON)
    targets: PathBuf,

    /// Execution root that local report paths are relative to
    #[arg(long, default_value = ".")]
    exec_root: PathBuf,

    /// Content-addressed directory holding remote report blobs
    #[arg(long)]
    remote_dir: Option<PathBuf>,

    /// Number of reports decoded in parallel (default: available CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Fingerprint local reports by content hash instead of mtime and size
    #[arg(long)]
    content_fingerprints: bool,

    /// Cancel the load if it runs longer than this (e.g. "30s", "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Print the dependencies of a target
  Show {
    /// Target label
    label: String,

    /// Aspect applied to the target (repeatable)
    #[arg(long = "aspect")]
    aspects: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show stored state and cache usage
  Status {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Forget all stored dependency state
  Clear,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Load {
      targets,
      exec_root,
      remote_dir,
      jobs,
      content_fingerprints,
      timeout,
      json,
    } => cmd::cmd_load(LoadArgs {
      targets,
      exec_root,
      remote_dir,
      jobs,
      content_fingerprints,
      timeout,
      json,
    }),
    Commands::Show { label, aspects, json } => cmd::cmd_show(&label, aspects, json),
    Commands::Status { json } => cmd::cmd_status(cli.verbose, json),
    Commands::Clear => cmd::cmd_clear(),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
