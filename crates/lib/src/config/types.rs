//! Configuration types, deserialized from `nativedeps.toml`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::consts::DEFAULT_ROOT;

/// What a component contributes to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentRole {
  /// An interchangeable SAT-solver backend, built into a static library.
  Solver,
  /// The main component, linked against every selected solver.
  Core,
}

impl fmt::Display for ComponentRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ComponentRole::Solver => f.write_str("solver"),
      ComponentRole::Core => f.write_str("core"),
    }
  }
}

/// Which solver backends participate in an invocation.
///
/// Fixed for the lifetime of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverSelection {
  /// Mandatory solvers only.
  #[default]
  Default,
  /// Mandatory and optional solvers.
  All,
}

impl SolverSelection {
  /// Whether a solver component is selected. Non-solvers are always included.
  pub fn includes(self, component: &ComponentConfig) -> bool {
    component.role != ComponentRole::Solver || !component.optional || self == SolverSelection::All
  }
}

impl fmt::Display for SolverSelection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SolverSelection::Default => f.write_str("default"),
      SolverSelection::All => f.write_str("all"),
    }
  }
}

impl FromStr for SolverSelection {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "default" => Ok(SolverSelection::Default),
      "all" => Ok(SolverSelection::All),
      _ => Err(ConfigError::InvalidSelection(s.to_string())),
    }
  }
}

fn default_strip_components() -> usize {
  1
}

fn default_patch_strip() -> u32 {
  1
}

fn default_root() -> PathBuf {
  PathBuf::from(DEFAULT_ROOT)
}

/// A remote-fetchable, version-pinned source archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSource {
  /// `http(s)://` or `file://` location of the archive.
  pub url: String,
  /// Expected SHA-256 of the archive (lowercase hex).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sha256: Option<String>,
  /// Leading path components removed from every archive entry.
  #[serde(default = "default_strip_components")]
  pub strip_components: usize,
  /// Name of the cached download; derived from the URL when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file_name: Option<String>,
}

/// One shell step of a component build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildStep {
  Shell(String),
  Detailed {
    cmd: String,
    /// Working directory relative to the component's source tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cwd: Option<String>,
  },
}

impl BuildStep {
  pub fn cmd(&self) -> &str {
    match self {
      BuildStep::Shell(cmd) => cmd,
      BuildStep::Detailed { cmd, .. } => cmd,
    }
  }

  pub fn cwd(&self) -> Option<&str> {
    match self {
      BuildStep::Shell(_) => None,
      BuildStep::Detailed { cwd, .. } => cwd.as_deref(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
  StaticLib,
  SharedLib,
  Header,
}

impl ArtifactKind {
  /// Subdirectory of the component's artifact directory.
  pub fn subdir(self) -> &'static str {
    match self {
      ArtifactKind::StaticLib | ArtifactKind::SharedLib => "lib",
      ArtifactKind::Header => "include",
    }
  }
}

/// A file or directory produced by the build steps and exported to dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactSpec {
  /// Path relative to the component's source tree.
  pub path: String,
  pub kind: ArtifactKind,
}

impl ArtifactSpec {
  /// File name the artifact gets in the artifact directory.
  pub fn file_name(&self) -> &str {
    self
      .path
      .trim_end_matches('/')
      .rsplit('/')
      .next()
      .unwrap_or(&self.path)
  }
}

/// A host requirement verified before any work starts.
///
/// Exactly one of `tool` and `command` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Requirement {
  /// Executable that must resolve on `PATH`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tool: Option<String>,
  /// Shell command that must exit successfully.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub command: Option<String>,
  /// Message shown when the requirement is not met.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hint: Option<String>,
  /// Only check the requirement when this component participates.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub component: Option<String>,
}

impl Requirement {
  pub fn tool(name: &str) -> Self {
    Self {
      tool: Some(name.to_string()),
      command: None,
      hint: None,
      component: None,
    }
  }

  pub fn command(cmd: &str) -> Self {
    Self {
      tool: None,
      command: Some(cmd.to_string()),
      hint: None,
      component: None,
    }
  }

  pub fn with_hint(mut self, hint: &str) -> Self {
    self.hint = Some(hint.to_string());
    self
  }

  /// Short human-readable description, e.g. `tool gcc`.
  pub fn describe(&self) -> String {
    match (&self.tool, &self.command) {
      (Some(tool), _) => format!("tool `{}`", tool),
      (None, Some(cmd)) => format!("command `{}`", cmd),
      (None, None) => "empty requirement".to_string(),
    }
  }
}

/// One third-party project of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
  pub name: String,
  pub role: ComponentRole,
  /// Optional solvers only participate with `SolverSelection::All`.
  #[serde(default)]
  pub optional: bool,
  pub source: ArchiveSource,
  /// Patch files, applied in order; relative to the config file.
  #[serde(default)]
  pub patches: Vec<PathBuf>,
  /// `-p` level passed to the patch tool.
  #[serde(default = "default_patch_strip")]
  pub patch_strip: u32,
  #[serde(default)]
  pub build: Vec<BuildStep>,
  /// Extra environment for the build steps.
  #[serde(default)]
  pub env: BTreeMap<String, String>,
  #[serde(default, rename = "artifact")]
  pub artifacts: Vec<ArtifactSpec>,
}

impl ComponentConfig {
  /// Upper-cased name usable in environment variable names.
  pub fn env_name(&self) -> String {
    self.name.to_ascii_uppercase().replace('-', "_")
  }
}

/// The complete pipeline declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
  /// Work tree, relative to the config file.
  #[serde(default = "default_root")]
  pub root: PathBuf,
  #[serde(default, rename = "requirement")]
  pub requirements: Vec<Requirement>,
  #[serde(default, rename = "component")]
  pub components: Vec<ComponentConfig>,
  /// Directory relative paths are resolved against.
  #[serde(skip)]
  pub base_dir: PathBuf,
}
