//! Implementation of the `nativedeps build` command.
//!
//! Declares the target graph for the solver selection, realizes it on the
//! host and prints the core's exported artifacts. Any failed target makes the
//! command exit non-zero after naming the target.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use nativedeps_lib::action::HostRunner;
use nativedeps_lib::config::{SolverSelection, resolve_jobs, resolve_selection};
use nativedeps_lib::execute::status::component_status;
use nativedeps_lib::execute::{BuildReport, ExecuteConfig, declare_targets, realize};
use nativedeps_lib::lock::LockMode;

use super::{GlobalArgs, Pipeline};
use crate::output::{format_duration, print_error, print_info, print_json, print_stat, print_success, symbols};

#[derive(Debug, Serialize)]
struct BuildOutput {
  selection: SolverSelection,
  success: bool,
  executed: Vec<String>,
  up_to_date: Vec<String>,
  failed: Vec<FailedTarget>,
  skipped: Vec<SkippedTarget>,
  /// Exported files of the core component.
  artifacts: Vec<PathBuf>,
  duration_ms: u128,
}

#[derive(Debug, Serialize)]
struct FailedTarget {
  target: String,
  error: String,
}

#[derive(Debug, Serialize)]
struct SkippedTarget {
  target: String,
  reason: String,
}

pub fn cmd_build(
  args: &GlobalArgs,
  solvers: Option<SolverSelection>,
  jobs: Option<usize>,
  keep_going: bool,
) -> Result<()> {
  let start = Instant::now();

  let pipeline = Pipeline::load(args)?;
  let selection = resolve_selection(solvers)?;
  let jobs = resolve_jobs(jobs)?;
  let _lock = pipeline.lock(LockMode::Exclusive, "build")?;

  let graph =
    declare_targets(&pipeline.config, &pipeline.layout, selection).context("Failed to declare build targets")?;

  let runner = Arc::new(HostRunner::new(jobs));
  let config = ExecuteConfig { jobs, keep_going };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(realize(&graph, runner, &config)).context("Build failed")?;

  let artifacts = if report.is_success() {
    core_artifacts(&pipeline, selection)?
  } else {
    Vec::new()
  };

  if args.output.is_json() {
    print_json(&summarize(&report, selection, artifacts, start))?;
  } else {
    print_report(&report, &artifacts, args.verbose, start);
  }

  if let Some((target, _)) = report.first_failure() {
    bail!("target {} failed", target);
  }
  if !report.is_success() {
    bail!("{} target(s) were skipped", report.skipped.len());
  }
  Ok(())
}

fn core_artifacts(pipeline: &Pipeline, selection: SolverSelection) -> Result<Vec<PathBuf>> {
  let Some(core) = pipeline.config.core() else {
    return Ok(Vec::new());
  };
  let statuses = component_status(&pipeline.config, &pipeline.layout, selection).context("Failed to read status")?;
  Ok(
    statuses
      .into_iter()
      .find(|s| s.name == core.name)
      .map(|s| s.artifacts)
      .unwrap_or_default(),
  )
}

fn summarize(report: &BuildReport, selection: SolverSelection, artifacts: Vec<PathBuf>, start: Instant) -> BuildOutput {
  BuildOutput {
    selection,
    success: report.is_success(),
    executed: report.executed.iter().map(ToString::to_string).collect(),
    up_to_date: report.up_to_date.iter().map(ToString::to_string).collect(),
    failed: report
      .failed
      .iter()
      .map(|(id, err)| FailedTarget {
        target: id.to_string(),
        error: err.to_string(),
      })
      .collect(),
    skipped: report
      .skipped
      .iter()
      .map(|(id, reason)| SkippedTarget {
        target: id.to_string(),
        reason: reason.to_string(),
      })
      .collect(),
    artifacts,
    duration_ms: start.elapsed().as_millis(),
  }
}

fn print_report(report: &BuildReport, artifacts: &[PathBuf], verbose: bool, start: Instant) {
  for id in &report.executed {
    let summary = report.outputs.get(id).map(|o| o.summary.as_str()).unwrap_or_default();
    println!(
      "  {} {} {}",
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
      id,
      summary.if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }
  if verbose {
    for id in &report.up_to_date {
      println!(
        "  {} {} {}",
        symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
        id,
        "up to date".if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    }
  }
  for (id, reason) in &report.skipped {
    println!(
      "  {} {} {}",
      symbols::SKIPPED.if_supports_color(Stream::Stdout, |s| s.yellow()),
      id,
      format!("skipped: {}", reason).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }
  for (id, err) in &report.failed {
    print_error(&format!("{} failed: {}", id, err));
  }

  println!();
  if report.is_success() {
    if report.executed.is_empty() {
      print_info("Everything is up to date");
    } else {
      print_success("Build complete!");
    }
    for artifact in artifacts {
      println!("  {} {}", symbols::ARROW, artifact.display());
    }
  }
  print_stat("Executed", &report.executed.len().to_string());
  print_stat("Up to date", &report.up_to_date.len().to_string());
  if !report.is_success() {
    print_stat("Failed", &report.failed.len().to_string());
    print_stat("Skipped", &report.skipped.len().to_string());
  }
  print_stat("Duration", &format_duration(start.elapsed()));
}
