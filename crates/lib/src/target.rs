//! Targets: named, dependency-gated units of work.
//!
//! Every participating component contributes three targets, one per stage
//! (`fetch`, `patch`, `build`), chained in that order. A single
//! `requirements` target gates all of them.

use std::fmt;
use std::path::PathBuf;

use serde::{Serialize, Serializer};

use crate::action::Action;
use crate::util::hash::{HashError, hash_json};

/// A stage of a component's lifecycle.
///
/// The per-component state machine is `absent -> fetched -> patched -> built`;
/// each stage is the transition into the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
  Fetch,
  Patch,
  Build,
}

impl Stage {
  pub const ALL: [Stage; 3] = [Stage::Fetch, Stage::Patch, Stage::Build];

  pub fn as_str(self) -> &'static str {
    match self {
      Stage::Fetch => "fetch",
      Stage::Patch => "patch",
      Stage::Build => "build",
    }
  }

  /// The stage that must complete before this one.
  pub fn previous(self) -> Option<Stage> {
    match self {
      Stage::Fetch => None,
      Stage::Patch => Some(Stage::Fetch),
      Stage::Build => Some(Stage::Patch),
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Identifies a target in the graph.
///
/// Displayed as `requirements` or `<component>:<stage>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetId {
  Requirements,
  Stage { component: String, stage: Stage },
}

impl TargetId {
  pub fn stage(component: &str, stage: Stage) -> Self {
    TargetId::Stage {
      component: component.to_string(),
      stage,
    }
  }

  pub fn fetch(component: &str) -> Self {
    Self::stage(component, Stage::Fetch)
  }

  pub fn patch(component: &str) -> Self {
    Self::stage(component, Stage::Patch)
  }

  pub fn build(component: &str) -> Self {
    Self::stage(component, Stage::Build)
  }

  /// The component this target belongs to, if any.
  pub fn component(&self) -> Option<&str> {
    match self {
      TargetId::Requirements => None,
      TargetId::Stage { component, .. } => Some(component),
    }
  }
}

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TargetId::Requirements => f.write_str("requirements"),
      TargetId::Stage { component, stage } => write!(f, "{}:{}", component, stage),
    }
  }
}

impl Serialize for TargetId {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// A node of the target graph.
#[derive(Debug, Clone)]
pub struct Target {
  pub id: TargetId,
  /// Targets that must be satisfied before this one runs.
  pub prerequisites: Vec<TargetId>,
  /// What running the target does.
  pub action: Action,
  /// Where the completion sentinel lives. `None` means the target always runs
  /// and never records completion.
  pub sentinel: Option<PathBuf>,
  /// Directory whose content hash is recorded in the sentinel and verified
  /// before the target is considered satisfied.
  pub output_dir: Option<PathBuf>,
  /// SHA-256 of the serialized action.
  pub fingerprint: String,
}

impl Target {
  pub fn new(id: TargetId, prerequisites: Vec<TargetId>, action: Action) -> Result<Self, HashError> {
    let fingerprint = hash_json(&action)?;
    Ok(Self {
      id,
      prerequisites,
      action,
      sentinel: None,
      output_dir: None,
      fingerprint,
    })
  }

  pub fn with_sentinel(mut self, path: PathBuf) -> Self {
    self.sentinel = Some(path);
    self
  }

  pub fn with_output_dir(mut self, path: PathBuf) -> Self {
    self.output_dir = Some(path);
    self
  }
}
