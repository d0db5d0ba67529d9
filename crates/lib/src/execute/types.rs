//! Types for target graph realization.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::action::{ActionError, ActionOutput};
use crate::sentinel::SentinelError;
use crate::target::TargetId;
use crate::util::hash::HashError;

/// Why a target did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "target", rename_all = "kebab-case")]
pub enum SkipReason {
  /// A prerequisite failed or was itself skipped.
  FailedDependency(TargetId),
  /// An earlier wave failed and `keep_going` was off.
  Aborted,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipReason::FailedDependency(id) => write!(f, "dependency {} failed", id),
      SkipReason::Aborted => f.write_str("aborted after an earlier failure"),
    }
  }
}

#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Action(#[from] ActionError),

  #[error(transparent)]
  Sentinel(#[from] SentinelError),

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("failed to remove stale output {}: {source}", path.display())]
  RemoveStale {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("dependency cycle detected")]
  CycleDetected,

  #[error("target {0} is declared twice")]
  DuplicateTarget(TargetId),

  #[error("target {target} requires unknown target {missing}")]
  UnknownPrerequisite { target: TargetId, missing: TargetId },

  #[error("task for {0} panicked")]
  TaskPanicked(TargetId),
}

/// Outcome of realizing a target graph.
#[derive(Debug, Default)]
pub struct BuildReport {
  /// Targets whose action ran and succeeded, in completion order.
  pub executed: Vec<TargetId>,
  /// Targets that were already satisfied.
  pub up_to_date: Vec<TargetId>,
  pub failed: Vec<(TargetId, ExecuteError)>,
  pub skipped: BTreeMap<TargetId, SkipReason>,
  pub outputs: BTreeMap<TargetId, ActionOutput>,
}

impl BuildReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  pub fn total(&self) -> usize {
    self.executed.len() + self.up_to_date.len() + self.failed.len() + self.skipped.len()
  }

  pub fn first_failure(&self) -> Option<&(TargetId, ExecuteError)> {
    self.failed.first()
  }
}

/// Configuration for realization.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of targets running at once.
  pub jobs: usize,
  /// Keep starting independent targets after a failure.
  pub keep_going: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      jobs: num_cpus(),
      keep_going: false,
    }
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Dry-run state of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanState {
  UpToDate,
  Pending,
  /// Has no sentinel; runs on every invocation.
  AlwaysRuns,
}

impl fmt::Display for PlanState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PlanState::UpToDate => f.write_str("up-to-date"),
      PlanState::Pending => f.write_str("pending"),
      PlanState::AlwaysRuns => f.write_str("always-runs"),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
  pub target: TargetId,
  pub state: PlanState,
  pub prerequisites: Vec<TargetId>,
}

/// What `build` would do, wave by wave.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
  pub waves: Vec<Vec<PlanEntry>>,
}

impl Plan {
  pub fn pending(&self) -> usize {
    self
      .waves
      .iter()
      .flatten()
      .filter(|e| e.state == PlanState::Pending)
      .count()
  }
}
