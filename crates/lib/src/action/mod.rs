//! Actions: what running a target does.
//!
//! An [`Action`] is plain data; its serialized form is the target's
//! fingerprint. Running actions goes through the [`ActionRunner`] capability
//! so the orchestrator can be driven by a fake runner in tests, while
//! [`HostRunner`] does the real work on the host.

pub mod archive;
pub mod build;
pub mod cmd;
pub mod fetch;
pub mod patch;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Requirement;
use crate::requirements::{RequirementError, check_requirements};

pub use build::{BuildError, BuildSpec, run_build};
pub use fetch::{FetchError, FetchSpec, fetch_archive};
pub use patch::{GnuPatch, PatchError, PatchFile, PatchSet, PatchTool, apply_patches};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
  CheckRequirements(Vec<Requirement>),
  Fetch(FetchSpec),
  ApplyPatches(PatchSet),
  Build(BuildSpec),
}

impl Action {
  pub fn kind(&self) -> &'static str {
    match self {
      Action::CheckRequirements(_) => "check-requirements",
      Action::Fetch(_) => "fetch",
      Action::ApplyPatches(_) => "patch",
      Action::Build(_) => "build",
    }
  }

  /// Paths to discard before re-running an action whose previous result is
  /// out of date.
  pub fn stale_outputs(&self) -> Vec<PathBuf> {
    match self {
      Action::Fetch(spec) => vec![spec.dest.clone()],
      Action::Build(spec) => vec![spec.out_dir.clone()],
      Action::CheckRequirements(_) | Action::ApplyPatches(_) => Vec::new(),
    }
  }
}

/// What a successful action reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionOutput {
  pub summary: String,
  /// Paths the action produced.
  pub paths: Vec<PathBuf>,
}

impl ActionOutput {
  pub fn new(summary: impl Into<String>) -> Self {
    Self {
      summary: summary.into(),
      paths: Vec::new(),
    }
  }

  pub fn with_paths(mut self, paths: Vec<PathBuf>) -> Self {
    self.paths = paths;
    self
  }
}

#[derive(Debug, Error)]
pub enum ActionError {
  #[error(transparent)]
  Requirements(#[from] RequirementError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Patch(#[from] PatchError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error("action task failed: {0}")]
  Task(String),

  /// Raised by runners other than [`HostRunner`].
  #[error("{0}")]
  Other(String),
}

/// Executes actions.
pub trait ActionRunner: Send + Sync + 'static {
  fn run(&self, action: &Action) -> impl Future<Output = Result<ActionOutput, ActionError>> + Send;
}

/// Runs actions on the host: `which` and the shell for requirements,
/// HTTP or local files for fetches, a [`PatchTool`] for patches and the shell
/// for builds.
#[derive(Clone)]
pub struct HostRunner {
  jobs: usize,
  shell: Option<String>,
  patch_tool: Arc<dyn PatchTool>,
}

impl std::fmt::Debug for HostRunner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HostRunner")
      .field("jobs", &self.jobs)
      .field("shell", &self.shell)
      .finish_non_exhaustive()
  }
}

impl HostRunner {
  /// `jobs` is exported to build steps as `JOBS`.
  pub fn new(jobs: usize) -> Self {
    Self {
      jobs: jobs.max(1),
      shell: None,
      patch_tool: Arc::new(GnuPatch::default()),
    }
  }

  pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
    self.shell = Some(shell.into());
    self
  }

  pub fn with_patch_tool(mut self, tool: Arc<dyn PatchTool>) -> Self {
    self.patch_tool = tool;
    self
  }
}

impl ActionRunner for HostRunner {
  async fn run(&self, action: &Action) -> Result<ActionOutput, ActionError> {
    match action {
      Action::CheckRequirements(requirements) => {
        let report = check_requirements(requirements, self.shell.as_deref())
          .await
          .into_result()?;
        Ok(ActionOutput::new(format!(
          "{} requirement(s) met",
          report.results.len()
        )))
      }

      Action::Fetch(spec) => {
        let entries = fetch_archive(spec).await?;
        Ok(ActionOutput::new(format!("unpacked {} entries", entries)).with_paths(vec![spec.dest.clone()]))
      }

      Action::ApplyPatches(set) => {
        let set = set.clone();
        let tool = Arc::clone(&self.patch_tool);
        let summary = tokio::task::spawn_blocking(move || apply_patches(&set, tool.as_ref()))
          .await
          .map_err(|e| ActionError::Task(e.to_string()))??;
        Ok(ActionOutput::new(format!(
          "applied {}, already applied {}",
          summary.applied, summary.skipped
        )))
      }

      Action::Build(spec) => {
        let artifacts = run_build(spec, self.jobs, self.shell.as_deref()).await?;
        Ok(ActionOutput::new(format!("exported {} artifact(s)", artifacts.len())).with_paths(artifacts))
      }
    }
  }
}
