//! Implementation of the `nativedeps clean` command.

use std::time::Instant;

use anyhow::{Context, Result};

use nativedeps_lib::clean::{CleanOptions, clean};
use nativedeps_lib::lock::LockMode;

use super::{GlobalArgs, Pipeline};
use crate::output::{format_bytes, format_duration, print_info, print_json, print_stat, print_success, symbols};

pub fn cmd_clean(args: &GlobalArgs, components: Vec<String>, keep_downloads: bool, dry_run: bool) -> Result<()> {
  let start = Instant::now();

  let pipeline = Pipeline::load(args)?;
  let _lock = pipeline.lock(LockMode::Exclusive, "clean")?;

  let options = CleanOptions {
    components,
    keep_downloads,
    dry_run,
  };
  let report = clean(&pipeline.config, &pipeline.layout, &options).context("Clean failed")?;

  if args.output.is_json() {
    print_json(&report)?;
    return Ok(());
  }

  if report.removed.is_empty() {
    print_info("Nothing to clean");
    return Ok(());
  }

  let verb = if dry_run { "Would remove" } else { "Removed" };
  for path in &report.removed {
    println!("  {} {} {}", symbols::SKIPPED, verb, path.display());
  }
  println!();
  if dry_run {
    print_info("Dry run - no changes made");
  } else {
    print_success("Clean complete!");
  }
  print_stat("Paths", &report.removed.len().to_string());
  print_stat("Space freed", &format_bytes(report.bytes_freed));
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
