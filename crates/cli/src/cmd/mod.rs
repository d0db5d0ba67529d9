mod build;
mod check;
mod clean;
mod init;
mod plan;
mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use nativedeps_lib::config::{PipelineConfig, resolve_config_path, resolve_root};
use nativedeps_lib::lock::{LockMode, WorkTreeLock};
use nativedeps_lib::paths::Layout;

use crate::output::OutputFormat;

pub use build::cmd_build;
pub use check::cmd_check;
pub use clean::cmd_clean;
pub use init::cmd_init;
pub use plan::cmd_plan;
pub use status::cmd_status;

/// Flags shared by every subcommand.
pub struct GlobalArgs {
  pub config: Option<PathBuf>,
  pub root: Option<PathBuf>,
  pub verbose: bool,
  pub output: OutputFormat,
}

/// A loaded configuration and the work tree it operates on.
pub struct Pipeline {
  pub config: PipelineConfig,
  pub layout: Layout,
}

impl Pipeline {
  pub fn load(args: &GlobalArgs) -> Result<Self> {
    let path = resolve_config_path(args.config.as_deref());
    let config =
      PipelineConfig::load(&path).with_context(|| format!("Failed to load configuration: {}", path.display()))?;

    let root = resolve_root(&config, args.root.as_deref());
    let root = std::path::absolute(&root).with_context(|| format!("Invalid work tree root: {}", root.display()))?;
    debug!(config = %path.display(), root = %root.display(), components = config.components.len(), "loaded pipeline");

    Ok(Self {
      config,
      layout: Layout::new(root),
    })
  }

  pub fn lock(&self, mode: LockMode, command: &str) -> Result<WorkTreeLock> {
    WorkTreeLock::acquire(&self.layout, mode, command).context("Failed to acquire work tree lock")
  }
}
