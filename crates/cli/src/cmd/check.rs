//! Implementation of the `nativedeps check` command.
//!
//! Runs only the host requirement check of the selected pipeline and
//! reports every requirement, met or not.

use anyhow::{Context, Result, bail};
use owo_colors::{OwoColorize, Stream};

use nativedeps_lib::action::Action;
use nativedeps_lib::config::{SolverSelection, resolve_selection};
use nativedeps_lib::execute::declare_targets;
use nativedeps_lib::requirements::check_requirements;
use nativedeps_lib::target::TargetId;

use super::{GlobalArgs, Pipeline};
use crate::output::{print_json, print_success, symbols};

pub fn cmd_check(args: &GlobalArgs, solvers: Option<SolverSelection>) -> Result<()> {
  let pipeline = Pipeline::load(args)?;
  let selection = resolve_selection(solvers)?;

  // the graph adds the implicit requirements, such as `patch`
  let graph = declare_targets(&pipeline.config, &pipeline.layout, selection).context("Failed to declare targets")?;
  let requirements = match graph.get(&TargetId::Requirements).map(|t| &t.action) {
    Some(Action::CheckRequirements(requirements)) => requirements.clone(),
    _ => Vec::new(),
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(check_requirements(&requirements, None));

  if args.output.is_json() {
    print_json(&report)?;
  } else {
    for result in &report.results {
      if result.satisfied {
        println!(
          "  {} {}",
          symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
          result.message()
        );
      } else {
        println!(
          "  {} {}",
          symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
          result.message().if_supports_color(Stream::Stdout, |s| s.red())
        );
      }
    }
  }

  let unmet = report.results.iter().filter(|r| !r.satisfied).count();
  if unmet > 0 {
    bail!("{} host requirement(s) not met", unmet);
  }
  if !args.output.is_json() {
    println!();
    print_success(&format!("All {} requirement(s) met", report.results.len()));
  }
  Ok(())
}
