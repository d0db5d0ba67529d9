//! Patch application with an explicit ledger.
//!
//! Every patched tree carries `.nativedeps-patches.json`, rewritten after each
//! applied patch. A patch whose name and content hash match the ledger entry
//! at the same position is already applied and skipped, so applying a
//! sequence twice equals applying it once. A rejected patch stops the
//! sequence and leaves the ledger in the `partial` state, which later runs
//! refuse to build on until the tree is cleaned.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{LEDGER_VERSION, PATCH_LEDGER_FILE, STDERR_TAIL_LINES};

/// One patch of a component, with the hash of its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchFile {
  pub name: String,
  pub path: PathBuf,
  pub sha256: String,
}

/// The ordered patches of one component and the tree they apply to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
  pub component: String,
  pub tree: PathBuf,
  /// `-p` level for the patch tool.
  pub strip: u32,
  pub patches: Vec<PatchFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
  Complete,
  Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
  pub name: String,
  pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPatch {
  pub name: String,
  pub reason: String,
}

/// Record of the patches applied to a tree, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchLedger {
  pub version: u32,
  pub status: LedgerStatus,
  pub applied: Vec<LedgerEntry>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failed: Option<FailedPatch>,
}

impl Default for PatchLedger {
  fn default() -> Self {
    Self {
      version: LEDGER_VERSION,
      status: LedgerStatus::Complete,
      applied: Vec::new(),
      failed: None,
    }
  }
}

impl PatchLedger {
  pub fn path(tree: &Path) -> PathBuf {
    tree.join(PATCH_LEDGER_FILE)
  }

  /// Read a tree's ledger; `Ok(None)` when the tree was never patched.
  pub fn read(tree: &Path) -> Result<Option<Self>, PatchError> {
    let path = Self::path(tree);
    let content = match std::fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(PatchError::Ledger { path, source }),
    };
    serde_json::from_str(&content)
      .map(Some)
      .map_err(|e| PatchError::Ledger {
        path,
        source: io::Error::other(e),
      })
  }

  fn write(&self, tree: &Path) -> Result<(), PatchError> {
    let path = Self::path(tree);
    let content = serde_json::to_string_pretty(self).map_err(|e| PatchError::Ledger {
      path: path.clone(),
      source: io::Error::other(e),
    })?;
    std::fs::write(&path, format!("{}\n", content)).map_err(|source| PatchError::Ledger { path, source })
  }

  pub fn is_partial(&self) -> bool {
    self.status == LedgerStatus::Partial
  }
}

#[derive(Debug, Error)]
pub enum PatchError {
  #[error("patch '{patch}' does not apply to {component}:\n{reason}")]
  Conflict {
    component: String,
    patch: String,
    reason: String,
  },

  #[error(
    "source tree of {component} is partially patched (failed at '{failed}'); run `nativedeps clean {component}` first"
  )]
  PartialTree { component: String, failed: String },

  #[error(
    "source tree of {component} was patched with a different patch list (position {position}: '{recorded}'); \
     run `nativedeps clean {component}` first"
  )]
  LedgerMismatch {
    component: String,
    position: usize,
    recorded: String,
  },

  #[error("source tree {} does not exist", path.display())]
  MissingTree { path: PathBuf },

  #[error("failed to run patch tool for '{patch}': {source}")]
  Tool {
    patch: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to access patch ledger {}: {source}", path.display())]
  Ledger {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// What happened when a tool tried one patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
  Applied,
  /// The patch does not apply; carries the tool's explanation.
  Rejected(String),
}

/// Applies a single patch file to a tree.
pub trait PatchTool: Send + Sync {
  fn apply(&self, tree: &Path, patch: &Path, strip: u32) -> io::Result<ToolOutcome>;
}

/// GNU `patch`, run as `patch -p<strip> --forward --batch -i <file>`.
///
/// A `--dry-run` pass precedes the real one so a rejected patch leaves the
/// tree untouched.
#[derive(Debug, Clone)]
pub struct GnuPatch {
  program: String,
}

impl Default for GnuPatch {
  fn default() -> Self {
    Self {
      program: "patch".to_string(),
    }
  }
}

impl GnuPatch {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
    }
  }

  fn run(&self, tree: &Path, patch: &Path, strip: u32, dry_run: bool) -> io::Result<Option<String>> {
    let mut command = Command::new(&self.program);
    command
      .arg(format!("-p{}", strip))
      .arg("--forward")
      .arg("--batch")
      .arg("-i")
      .arg(patch)
      .current_dir(tree)
      .env("LC_ALL", "C");
    if dry_run {
      command.arg("--dry-run");
    }

    debug!(program = %self.program, patch = %patch.display(), dry_run, "running patch tool");
    let output = command.output()?;
    if output.status.success() {
      return Ok(None);
    }

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(Some(tail(&text, STDERR_TAIL_LINES)))
  }
}

impl PatchTool for GnuPatch {
  fn apply(&self, tree: &Path, patch: &Path, strip: u32) -> io::Result<ToolOutcome> {
    if let Some(reason) = self.run(tree, patch, strip, true)? {
      return Ok(ToolOutcome::Rejected(reason));
    }
    match self.run(tree, patch, strip, false)? {
      None => Ok(ToolOutcome::Applied),
      Some(reason) => Ok(ToolOutcome::Rejected(reason)),
    }
  }
}

/// Counts reported after a successful sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSummary {
  pub applied: usize,
  pub skipped: usize,
}

/// Apply `set.patches` in order, skipping the ones the ledger already records.
pub fn apply_patches(set: &PatchSet, tool: &dyn PatchTool) -> Result<PatchSummary, PatchError> {
  if !set.tree.is_dir() {
    return Err(PatchError::MissingTree { path: set.tree.clone() });
  }

  let mut ledger = PatchLedger::read(&set.tree)?.unwrap_or_default();

  if ledger.is_partial() {
    return Err(PatchError::PartialTree {
      component: set.component.clone(),
      failed: ledger.failed.map(|f| f.name).unwrap_or_default(),
    });
  }

  for (position, entry) in ledger.applied.iter().enumerate() {
    let matches = set
      .patches
      .get(position)
      .is_some_and(|p| p.name == entry.name && p.sha256 == entry.sha256);
    if !matches {
      return Err(PatchError::LedgerMismatch {
        component: set.component.clone(),
        position,
        recorded: entry.name.clone(),
      });
    }
  }

  let skipped = ledger.applied.len();
  for patch in &set.patches[..skipped] {
    debug!(component = %set.component, patch = %patch.name, "already applied, skipping");
  }

  let mut applied = 0;
  for patch in &set.patches[skipped..] {
    let outcome = tool.apply(&set.tree, &patch.path, set.strip).map_err(|source| PatchError::Tool {
      patch: patch.name.clone(),
      source,
    })?;

    match outcome {
      ToolOutcome::Applied => {
        ledger.applied.push(LedgerEntry {
          name: patch.name.clone(),
          sha256: patch.sha256.clone(),
        });
        ledger.write(&set.tree)?;
        applied += 1;
        info!(component = %set.component, patch = %patch.name, "applied patch");
      }
      ToolOutcome::Rejected(reason) => {
        ledger.status = LedgerStatus::Partial;
        ledger.failed = Some(FailedPatch {
          name: patch.name.clone(),
          reason: reason.clone(),
        });
        ledger.write(&set.tree)?;
        warn!(component = %set.component, patch = %patch.name, "patch rejected");
        return Err(PatchError::Conflict {
          component: set.component.clone(),
          patch: patch.name.clone(),
          reason,
        });
      }
    }
  }

  if !PatchLedger::path(&set.tree).exists() {
    ledger.write(&set.tree)?;
  }

  Ok(PatchSummary { applied, skipped })
}

/// Last `lines` lines of `text`.
pub fn tail(text: &str, lines: usize) -> String {
  let all: Vec<&str> = text.lines().collect();
  let start = all.len().saturating_sub(lines);
  all[start..].join("\n")
}
