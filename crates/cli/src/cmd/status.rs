//! Status command implementation.
//!
//! Shows each component's lifecycle state from its sentinels, flags stale and
//! partially patched components, and the core's exported artifacts.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use nativedeps_lib::config::{ComponentRole, SolverSelection, resolve_selection};
use nativedeps_lib::execute::status::{ComponentState, ComponentStatus, component_status};
use nativedeps_lib::lock::LockMode;

use super::{GlobalArgs, Pipeline};
use crate::output::{format_timestamp, print_json, print_stat, print_warning, symbols};

#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
  root: &'a std::path::Path,
  selection: SolverSelection,
  components: &'a [ComponentStatus],
}

pub fn cmd_status(args: &GlobalArgs, solvers: Option<SolverSelection>) -> Result<()> {
  let pipeline = Pipeline::load(args)?;
  let selection = resolve_selection(solvers)?;
  let _lock = pipeline.lock(LockMode::Shared, "status")?;

  let statuses = component_status(&pipeline.config, &pipeline.layout, selection).context("Failed to read status")?;

  if args.output.is_json() {
    return print_json(&StatusOutput {
      root: pipeline.layout.root(),
      selection,
      components: &statuses,
    });
  }

  print_stat("Work tree", &pipeline.layout.root().display().to_string());
  print_stat("Solvers", &selection.to_string());
  println!();

  for status in &statuses {
    print_component(status, args.verbose);
  }

  if statuses.iter().any(|s| s.patch_partial) {
    println!();
    print_warning("Partially patched components must be cleaned before the next build");
  }

  Ok(())
}

fn print_component(status: &ComponentStatus, verbose: bool) {
  let symbol = match status.state {
    ComponentState::Built if !status.stale => symbols::SUCCESS
      .if_supports_color(Stream::Stdout, |s| s.green())
      .to_string(),
    ComponentState::Absent => symbols::SKIPPED.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
    _ => symbols::PENDING.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
  };

  let mut flags = vec![status.role.to_string()];
  if status.optional {
    flags.push("optional".to_string());
  }
  if !status.selected {
    flags.push("not selected".to_string());
  }
  if status.stale {
    flags.push("stale".to_string());
  }
  if status.patch_partial {
    flags.push("patch-partial".to_string());
  }

  println!(
    "  {} {:<12} {:<8} {}",
    symbol,
    status.name,
    status.state.to_string(),
    format!("({})", flags.join(", ")).if_supports_color(Stream::Stdout, |s| s.dimmed())
  );

  if verbose && let Some(updated) = status.updated_at_unix {
    println!("      updated {}", format_timestamp(updated));
  }
  if verbose || status.role == ComponentRole::Core {
    for artifact in &status.artifacts {
      println!("      {} {}", symbols::ARROW, artifact.display());
    }
  }
}
