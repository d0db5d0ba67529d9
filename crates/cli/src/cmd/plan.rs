//! Implementation of the `nativedeps plan` command.
//!
//! Evaluates every target against its sentinel and prints the execution
//! waves without running anything.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use nativedeps_lib::config::{SolverSelection, resolve_selection};
use nativedeps_lib::execute::{PlanState, declare_targets, plan};
use nativedeps_lib::lock::LockMode;

use super::{GlobalArgs, Pipeline};
use crate::output::{print_info, print_json, print_stat, symbols};

pub fn cmd_plan(args: &GlobalArgs, solvers: Option<SolverSelection>) -> Result<()> {
  let pipeline = Pipeline::load(args)?;
  let selection = resolve_selection(solvers)?;
  let _lock = pipeline.lock(LockMode::Shared, "plan")?;

  let graph = declare_targets(&pipeline.config, &pipeline.layout, selection).context("Failed to declare targets")?;
  let plan = plan(&graph).context("Failed to plan targets")?;

  if args.output.is_json() {
    return print_json(&plan);
  }

  for (index, wave) in plan.waves.iter().enumerate() {
    println!("Wave {}:", index + 1);
    for entry in wave {
      let (symbol, label) = match entry.state {
        PlanState::UpToDate => (
          symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
          "up-to-date",
        ),
        PlanState::Pending => (
          symbols::PENDING.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
          "pending",
        ),
        PlanState::AlwaysRuns => (
          symbols::PENDING.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
          "runs",
        ),
      };
      println!(
        "  {} {:<18} {}",
        symbol,
        entry.target.to_string(),
        label.if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
      if args.verbose && !entry.prerequisites.is_empty() {
        let prereqs: Vec<String> = entry.prerequisites.iter().map(ToString::to_string).collect();
        println!("      after {}", prereqs.join(", "));
      }
    }
  }

  println!();
  let pending = plan.pending();
  if pending == 0 {
    print_info("Nothing to do; every target is up to date");
  } else {
    print_info(&format!("{} target(s) would run", pending));
  }
  print_stat("Solvers", &selection.to_string());

  Ok(())
}
