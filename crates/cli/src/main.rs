mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nativedeps_lib::config::{ConfigError, SolverSelection};

use crate::cmd::GlobalArgs;
use crate::output::OutputFormat;

/// nativedeps - fetch, patch and build native dependencies
#[derive(Parser)]
#[command(name = "nativedeps")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Pipeline configuration file [default: nativedeps.toml, env: NATIVEDEPS_CONFIG]
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Work tree root [default: the config's `root`, env: NATIVEDEPS_ROOT]
  #[arg(long, global = true)]
  root: Option<PathBuf>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short = 'o', long, global = true, value_enum, default_value = "text")]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Check requirements, then fetch, patch and build every selected component
  Build {
    /// Solver backends to build: default or all [env: NATIVEDEPS_SOLVERS]
    #[arg(long, value_parser = parse_selection)]
    solvers: Option<SolverSelection>,

    /// Maximum number of targets running at once [env: NATIVEDEPS_JOBS]
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Keep building independent targets after a failure
    #[arg(short, long)]
    keep_going: bool,
  },

  /// Remove sources, artifacts and sentinels, returning to the pre-fetch state
  Clean {
    /// Only clean these components
    components: Vec<String>,

    /// Keep downloaded archives
    #[arg(long)]
    keep_downloads: bool,

    /// Show what would be removed without removing it
    #[arg(long)]
    dry_run: bool,
  },

  /// Run the host requirement check only
  Check {
    /// Solver selection whose requirements are checked
    #[arg(long, value_parser = parse_selection)]
    solvers: Option<SolverSelection>,
  },

  /// Show the state of every component
  Status {
    /// Solver selection staleness is judged against
    #[arg(long, value_parser = parse_selection)]
    solvers: Option<SolverSelection>,
  },

  /// Show what build would run, without running anything
  Plan {
    /// Solver selection to plan for
    #[arg(long, value_parser = parse_selection)]
    solvers: Option<SolverSelection>,
  },

  /// Write a sample nativedeps.toml and a patches directory
  Init {
    /// Directory to initialize
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Overwrite an existing configuration
    #[arg(short, long)]
    force: bool,
  },
}

fn parse_selection(value: &str) -> Result<SolverSelection, ConfigError> {
  value.parse()
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let args = GlobalArgs {
    config: cli.config,
    root: cli.root,
    verbose: cli.verbose,
    output: cli.output,
  };

  match cli.command {
    Commands::Build {
      solvers,
      jobs,
      keep_going,
    } => cmd::cmd_build(&args, solvers, jobs, keep_going),
    Commands::Clean {
      components,
      keep_downloads,
      dry_run,
    } => cmd::cmd_clean(&args, components, keep_downloads, dry_run),
    Commands::Check { solvers } => cmd::cmd_check(&args, solvers),
    Commands::Status { solvers } => cmd::cmd_status(&args, solvers),
    Commands::Plan { solvers } => cmd::cmd_plan(&args, solvers),
    Commands::Init { path, force } => cmd::cmd_init(&path, force, args.output),
  }
}
