//! Per-component state derived from sentinels and patch ledgers.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use walkdir::WalkDir;

use super::pipeline::declare_targets;
use super::types::{ExecuteError, PlanState};
use super::plan;
use crate::action::patch::PatchLedger;
use crate::config::{ComponentRole, PipelineConfig, SolverSelection};
use crate::paths::Layout;
use crate::sentinel::Sentinel;
use crate::target::{Stage, TargetId};

/// Lifecycle state: `absent -> fetched -> patched -> built`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
  Absent,
  Fetched,
  Patched,
  Built,
}

impl ComponentState {
  fn after(stage: Stage) -> Self {
    match stage {
      Stage::Fetch => ComponentState::Fetched,
      Stage::Patch => ComponentState::Patched,
      Stage::Build => ComponentState::Built,
    }
  }
}

impl fmt::Display for ComponentState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ComponentState::Absent => "absent",
      ComponentState::Fetched => "fetched",
      ComponentState::Patched => "patched",
      ComponentState::Built => "built",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
  pub name: String,
  pub role: ComponentRole,
  pub optional: bool,
  /// Takes part under the inspected solver selection.
  pub selected: bool,
  pub state: ComponentState,
  /// Some completed stage would be redone by the next `build`.
  pub stale: bool,
  /// The source tree holds a failed patch sequence.
  pub patch_partial: bool,
  /// Unix time of the last completed stage.
  pub updated_at_unix: Option<u64>,
  /// Exported files, for built components.
  pub artifacts: Vec<PathBuf>,
}

/// Status of every configured component, selected or not.
pub fn component_status(
  config: &PipelineConfig,
  layout: &Layout,
  selection: SolverSelection,
) -> Result<Vec<ComponentStatus>, ExecuteError> {
  let graph = declare_targets(config, layout, selection)?;
  let plan = plan(&graph)?;
  let pending: Vec<&TargetId> = plan
    .waves
    .iter()
    .flatten()
    .filter(|e| e.state == PlanState::Pending)
    .map(|e| &e.target)
    .collect();

  let mut statuses = Vec::with_capacity(config.components.len());
  for component in &config.components {
    let name = &component.name;

    let mut state = ComponentState::Absent;
    let mut updated_at_unix = None;
    for stage in Stage::ALL {
      let Some(sentinel) = Sentinel::read_lenient(&layout.sentinel_path(name, stage)) else {
        break;
      };
      state = ComponentState::after(stage);
      updated_at_unix = Some(sentinel.completed_at_unix);
    }

    let stale = state != ComponentState::Absent
      && Stage::ALL
        .iter()
        .filter(|stage| ComponentState::after(**stage) <= state)
        .any(|stage| pending.contains(&&TargetId::stage(name, *stage)));

    let patch_partial = PatchLedger::read(&layout.source_dir(name))
      .ok()
      .flatten()
      .is_some_and(|ledger| ledger.is_partial());

    let artifacts = if state == ComponentState::Built {
      list_files(&layout.artifact_dir(name))
    } else {
      Vec::new()
    };

    statuses.push(ComponentStatus {
      name: name.clone(),
      role: component.role,
      optional: component.optional,
      selected: selection.includes(component),
      state,
      stale,
      patch_partial,
      updated_at_unix,
      artifacts,
    });
  }

  Ok(statuses)
}

fn list_files(dir: &std::path::Path) -> Vec<PathBuf> {
  let mut files: Vec<PathBuf> = WalkDir::new(dir)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file())
    .map(|e| e.into_path())
    .collect();
  files.sort();
  files
}
