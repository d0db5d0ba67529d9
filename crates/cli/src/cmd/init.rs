//! Implementation of the `nativedeps init` command.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use nativedeps_lib::init::{InitOptions, init};

use crate::output::{OutputFormat, print_json, symbols};

/// Write a sample `nativedeps.toml` and an empty `patches/` directory into
/// `path`.
///
/// # Errors
///
/// Returns an error if the configuration already exists and `force` is not
/// set, or on permission problems.
pub fn cmd_init(path: &Path, force: bool, output: OutputFormat) -> Result<()> {
  let options = InitOptions {
    dir: path.to_path_buf(),
    force,
  };

  let result = init(&options).context("Failed to initialize configuration")?;

  if output.is_json() {
    return print_json(&serde_json::json!({
      "config": result.config_path,
      "patches": result.patches_dir,
    }));
  }

  println!(
    "{} {}",
    symbols::SUCCESS.green(),
    "Initialized nativedeps configuration!".green().bold()
  );
  println!();
  println!("  {} Config:  {}", symbols::ARROW, result.config_path.display());
  println!("  {} Patches: {}", symbols::ARROW, result.patches_dir.display());
  println!();
  println!("Next steps:");
  println!("  1. Pin each source with its sha256");
  println!("  2. Run: nativedeps check");
  println!("  3. Run: nativedeps build");

  Ok(())
}
