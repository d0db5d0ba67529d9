//! Target graph realization.
//!
//! Targets run wave by wave. Inside a wave, targets whose sentinel is still
//! valid are skipped as up to date, the rest run concurrently on a `JoinSet`
//! bounded by a semaphore of `jobs` permits. A sentinel is written only after
//! its action succeeded. Dependents of a failed target are skipped; without
//! `keep_going` no wave starts after one that had a failure.

pub mod dag;
pub mod pipeline;
pub mod status;
pub mod types;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::action::{ActionError, ActionOutput, ActionRunner};
use crate::sentinel::{self, Sentinel};
use crate::target::{Target, TargetId};

pub use dag::TargetGraph;
pub use pipeline::declare_targets;
pub use types::{BuildReport, ExecuteConfig, ExecuteError, Plan, PlanEntry, PlanState, SkipReason};

/// Satisfaction of one target given the current stamps of its prerequisites.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Satisfaction {
  /// Valid sentinel; carries its stamp.
  Satisfied(String),
  /// Must run. `stale` is set when an outdated sentinel exists.
  Unsatisfied { stale: bool },
  /// No sentinel; runs whenever the graph has work.
  Phony,
}

/// Current stamps of `target`'s sentineled prerequisites, or `None` if one of
/// them has no stamp yet.
fn prerequisite_stamps(
  graph: &TargetGraph,
  target: &Target,
  stamps: &HashMap<TargetId, String>,
) -> Option<BTreeMap<String, String>> {
  let mut current = BTreeMap::new();
  for prereq in &target.prerequisites {
    let has_sentinel = graph.get(prereq).is_some_and(|t| t.sentinel.is_some());
    if !has_sentinel {
      continue;
    }
    current.insert(prereq.to_string(), stamps.get(prereq)?.clone());
  }
  Some(current)
}

fn evaluate(graph: &TargetGraph, target: &Target, stamps: &HashMap<TargetId, String>) -> Satisfaction {
  let Some(path) = &target.sentinel else {
    return Satisfaction::Phony;
  };
  let Some(recorded) = Sentinel::read_lenient(path) else {
    return Satisfaction::Unsatisfied { stale: path.exists() };
  };

  let satisfied = prerequisite_stamps(graph, target, stamps).is_some_and(|current| {
    recorded.matches(&target.fingerprint, &current)
      && target.output_dir.as_deref().is_none_or(|dir| recorded.verify_output(dir))
  });

  if satisfied {
    Satisfaction::Satisfied(recorded.stamp)
  } else {
    Satisfaction::Unsatisfied { stale: true }
  }
}

/// Evaluate every target without running anything.
///
/// A target is pending when its own sentinel is invalid or any prerequisite
/// is pending. Phony targets are reported as always running, unless nothing
/// else is pending, in which case they are up to date as well.
pub fn plan(graph: &TargetGraph) -> Result<Plan, ExecuteError> {
  let mut stamps = HashMap::new();
  let mut waves = Vec::new();

  for wave in graph.waves()? {
    let mut entries = Vec::with_capacity(wave.len());
    for id in wave {
      let Some(target) = graph.get(&id) else {
        continue;
      };
      let state = match evaluate(graph, target, &stamps) {
        Satisfaction::Satisfied(stamp) => {
          stamps.insert(id.clone(), stamp);
          PlanState::UpToDate
        }
        Satisfaction::Unsatisfied { .. } => PlanState::Pending,
        Satisfaction::Phony => PlanState::AlwaysRuns,
      };
      entries.push(PlanEntry {
        prerequisites: graph.prerequisites(&id),
        target: id,
        state,
      });
    }
    waves.push(entries);
  }

  let mut plan = Plan { waves };
  if plan.pending() == 0 {
    for entry in plan.waves.iter_mut().flatten() {
      entry.state = PlanState::UpToDate;
    }
  }
  Ok(plan)
}

/// Realize every target of `graph` that is not satisfied.
///
/// Returns `Err` only when the graph itself cannot be scheduled; target
/// failures are reported in the [`BuildReport`].
pub async fn realize<R: ActionRunner>(
  graph: &TargetGraph,
  runner: Arc<R>,
  config: &ExecuteConfig,
) -> Result<BuildReport, ExecuteError> {
  let waves = graph.waves()?;
  let mut report = BuildReport::default();

  if plan(graph)?.pending() == 0 {
    info!(targets = graph.len(), "all targets up to date");
    report.up_to_date = waves.into_iter().flatten().collect();
    return Ok(report);
  }

  info!(targets = graph.len(), waves = waves.len(), jobs = config.jobs, "realizing targets");

  let semaphore = Arc::new(Semaphore::new(config.jobs.max(1)));
  let mut stamps: HashMap<TargetId, String> = HashMap::new();
  let mut failed: HashSet<TargetId> = HashSet::new();
  let mut aborted = false;

  for (wave_idx, wave) in waves.into_iter().enumerate() {
    debug!(wave = wave_idx, targets = wave.len(), "executing wave");
    let mut ready = Vec::new();

    for id in wave {
      let Some(target) = graph.get(&id) else {
        continue;
      };

      if let Some(dep) = target.prerequisites.iter().find(|p| failed.contains(*p)) {
        warn!(target = %id, failed_dep = %dep, "skipping target due to failed dependency");
        report.skipped.insert(id.clone(), SkipReason::FailedDependency(dep.clone()));
        failed.insert(id);
        continue;
      }
      if aborted {
        report.skipped.insert(id.clone(), SkipReason::Aborted);
        failed.insert(id);
        continue;
      }

      match evaluate(graph, target, &stamps) {
        Satisfaction::Satisfied(stamp) => {
          debug!(target = %id, "up to date");
          stamps.insert(id.clone(), stamp);
          report.up_to_date.push(id);
        }
        Satisfaction::Unsatisfied { stale } => {
          if stale && let Err(e) = discard_stale(target) {
            error!(target = %id, error = %e, "failed to discard stale output");
            report.failed.push((id.clone(), e));
            failed.insert(id);
            continue;
          }
          ready.push(target);
        }
        Satisfaction::Phony => ready.push(target),
      }
    }

    if ready.is_empty() {
      continue;
    }

    for (id, result) in execute_wave(&ready, Arc::clone(&runner), Arc::clone(&semaphore)).await {
      let outcome = match result {
        Ok(output) => graph
          .get(&id)
          .map(|target| record_completion(graph, target, &stamps).map(|stamp| (stamp, output)))
          .unwrap_or(Err(ExecuteError::TaskPanicked(id.clone()))),
        Err(e) => Err(e),
      };

      match outcome {
        Ok((stamp, output)) => {
          info!(target = %id, summary = %output.summary, "target complete");
          if let Some(stamp) = stamp {
            stamps.insert(id.clone(), stamp);
          }
          report.outputs.insert(id.clone(), output);
          report.executed.push(id);
        }
        Err(e) => {
          error!(target = %id, error = %e, "target failed");
          report.failed.push((id.clone(), e));
          failed.insert(id);
        }
      }
    }

    if !config.keep_going && !report.failed.is_empty() {
      aborted = true;
    }
  }

  info!(
    executed = report.executed.len(),
    up_to_date = report.up_to_date.len(),
    failed = report.failed.len(),
    skipped = report.skipped.len(),
    "realization complete"
  );

  Ok(report)
}

/// Remove an outdated sentinel and the outputs it vouched for.
fn discard_stale(target: &Target) -> Result<(), ExecuteError> {
  if let Some(path) = &target.sentinel {
    sentinel::remove(path).map_err(|source| ExecuteError::RemoveStale {
      path: path.clone(),
      source,
    })?;
  }
  for path in target.action.stale_outputs() {
    if path.exists() {
      debug!(target = %target.id, path = %path.display(), "removing stale output");
      std::fs::remove_dir_all(&path).map_err(|source| ExecuteError::RemoveStale { path, source })?;
    }
  }
  Ok(())
}

/// Write the sentinel of a target whose action just succeeded.
fn record_completion(
  graph: &TargetGraph,
  target: &Target,
  stamps: &HashMap<TargetId, String>,
) -> Result<Option<String>, ExecuteError> {
  let Some(path) = &target.sentinel else {
    return Ok(None);
  };

  let prerequisites = prerequisite_stamps(graph, target, stamps).unwrap_or_default();
  let mut sentinel = Sentinel::new(&target.id, &target.fingerprint, prerequisites);
  if let Some(dir) = &target.output_dir
    && dir.exists()
  {
    sentinel = sentinel.with_output_hash(dir)?;
  }
  sentinel.write(path)?;
  Ok(Some(sentinel.stamp))
}

/// Run one wave of targets in parallel.
async fn execute_wave<R: ActionRunner>(
  targets: &[&Target],
  runner: Arc<R>,
  semaphore: Arc<Semaphore>,
) -> Vec<(TargetId, Result<ActionOutput, ExecuteError>)> {
  let mut join_set = JoinSet::new();
  let mut task_ids = HashMap::new();

  for target in targets {
    let id = target.id.clone();
    let action = target.action.clone();
    let runner = Arc::clone(&runner);
    let semaphore = Arc::clone(&semaphore);

    info!(target = %id, action = action.kind(), "starting target");
    let handle = join_set.spawn(async move {
      let _permit = semaphore.acquire_owned().await.ok();
      runner.run(&action).await
    });
    task_ids.insert(handle.id(), id);
  }

  collect_join_results(join_set, task_ids).await
}

async fn collect_join_results(
  mut join_set: JoinSet<Result<ActionOutput, ActionError>>,
  mut task_ids: HashMap<tokio::task::Id, TargetId>,
) -> Vec<(TargetId, Result<ActionOutput, ExecuteError>)> {
  let mut results = Vec::new();

  while let Some(join_result) = join_set.join_next_with_id().await {
    match join_result {
      Ok((task_id, result)) => {
        if let Some(id) = task_ids.remove(&task_id) {
          results.push((id, result.map_err(ExecuteError::from)));
        }
      }
      Err(e) => {
        error!(error = %e, "target task panicked");
        if let Some(id) = task_ids.remove(&e.id()) {
          results.push((id.clone(), Err(ExecuteError::TaskPanicked(id))));
        }
      }
    }
  }

  results
}
