//! Pipeline configuration.
//!
//! The pipeline is declared in a TOML file (`nativedeps.toml`): host
//! requirements, and one `[[component]]` per third-party project with its
//! archive source, patches, build steps and exported artifacts.
//!
//! Settings are resolved in this order, highest first: explicit arguments
//! (CLI flags), environment variables, the config file, defaults.

mod types;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_FILE_NAME, ENV_CONFIG, ENV_JOBS, ENV_ROOT, ENV_SOLVERS, MAX_SOLVERS};

pub use types::{
  ArchiveSource, ArtifactKind, ArtifactSpec, BuildStep, ComponentConfig, ComponentRole, PipelineConfig, Requirement,
  SolverSelection,
};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: Box<toml::de::Error>,
  },

  #[error("invalid config: {0}")]
  Invalid(String),

  #[error("patch file not found for component '{component}': {}", path.display())]
  MissingPatch { component: String, path: PathBuf },

  #[error("invalid solver selection '{0}': expected 'default' or 'all'")]
  InvalidSelection(String),

  #[error("invalid job count '{0}': expected a positive integer")]
  InvalidJobs(String),
}

impl PipelineConfig {
  /// Load and validate a config file.
  ///
  /// Relative paths inside the file resolve against its directory.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let base_dir = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    let base_dir = dunce::canonicalize(&base_dir).unwrap_or(base_dir);

    let config = Self::parse(&content, path, base_dir)?;
    config.validate_patch_files()?;

    debug!(
      path = %path.display(),
      components = config.components.len(),
      "loaded pipeline config"
    );
    Ok(config)
  }

  /// Parse and structurally validate config text.
  ///
  /// `origin` is only used in error messages; patch files are not checked.
  pub fn parse(content: &str, origin: &Path, base_dir: PathBuf) -> Result<Self, ConfigError> {
    let mut config: PipelineConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: origin.to_path_buf(),
      source: Box::new(source),
    })?;
    config.base_dir = base_dir;
    config.validate()?;
    Ok(config)
  }

  /// Check the structural rules of a pipeline.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for component in &self.components {
      let name = &component.name;
      if name.is_empty()
        || !name
          .chars()
          .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
      {
        return Err(ConfigError::Invalid(format!(
          "component name '{}' must be non-empty and use only [a-z0-9_-]",
          name
        )));
      }
      if !names.insert(name.as_str()) {
        return Err(ConfigError::Invalid(format!("duplicate component '{}'", name)));
      }
      if component.source.url.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("component '{}' has an empty source url", name)));
      }
      if let Some(sha) = &component.source.sha256
        && (sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()))
      {
        return Err(ConfigError::Invalid(format!(
          "component '{}' has a malformed sha256 (expected 64 hex characters)",
          name
        )));
      }
      if component.role == ComponentRole::Core && component.optional {
        return Err(ConfigError::Invalid(format!("core component '{}' cannot be optional", name)));
      }
      for artifact in &component.artifacts {
        if Path::new(&artifact.path).is_absolute() || artifact.path.split('/').any(|part| part == "..") {
          return Err(ConfigError::Invalid(format!(
            "artifact '{}' of component '{}' must be a path inside the source tree",
            artifact.path, name
          )));
        }
      }
    }

    let cores = self.components.iter().filter(|c| c.role == ComponentRole::Core).count();
    if cores != 1 {
      return Err(ConfigError::Invalid(format!(
        "expected exactly one core component, found {}",
        cores
      )));
    }

    if !self
      .components
      .iter()
      .any(|c| c.role == ComponentRole::Solver && !c.optional)
    {
      return Err(ConfigError::Invalid(
        "at least one non-optional solver component is required".to_string(),
      ));
    }

    let solvers = self.components.iter().filter(|c| c.role == ComponentRole::Solver).count();
    if solvers > MAX_SOLVERS {
      return Err(ConfigError::Invalid(format!(
        "at most {} solver components are supported, found {}",
        MAX_SOLVERS, solvers
      )));
    }

    for requirement in &self.requirements {
      match (&requirement.tool, &requirement.command) {
        (Some(_), None) | (None, Some(_)) => {}
        _ => {
          return Err(ConfigError::Invalid(
            "each requirement needs exactly one of 'tool' or 'command'".to_string(),
          ));
        }
      }
      if let Some(component) = &requirement.component
        && !names.contains(component.as_str())
      {
        return Err(ConfigError::Invalid(format!(
          "requirement {} refers to unknown component '{}'",
          requirement.describe(),
          component
        )));
      }
    }

    Ok(())
  }

  fn validate_patch_files(&self) -> Result<(), ConfigError> {
    for component in &self.components {
      for patch in &component.patches {
        let path = self.resolve_path(patch);
        if !path.is_file() {
          return Err(ConfigError::MissingPatch {
            component: component.name.clone(),
            path,
          });
        }
      }
    }
    Ok(())
  }

  /// Resolve a config-relative path.
  pub fn resolve_path(&self, path: &Path) -> PathBuf {
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.base_dir.join(path)
    }
  }

  /// The core component. Validation guarantees there is exactly one.
  pub fn core(&self) -> Option<&ComponentConfig> {
    self.components.iter().find(|c| c.role == ComponentRole::Core)
  }

  pub fn component(&self, name: &str) -> Option<&ComponentConfig> {
    self.components.iter().find(|c| c.name == name)
  }

  /// Solvers taking part under `selection`, in declaration order.
  pub fn selected_solvers(&self, selection: SolverSelection) -> Vec<&ComponentConfig> {
    self
      .components
      .iter()
      .filter(|c| c.role == ComponentRole::Solver && selection.includes(c))
      .collect()
  }

  /// Every component taking part under `selection`, in declaration order.
  pub fn participating(&self, selection: SolverSelection) -> Vec<&ComponentConfig> {
    self.components.iter().filter(|c| selection.includes(c)).collect()
  }

  /// Requirements that apply under `selection`.
  pub fn requirements_for(&self, selection: SolverSelection) -> Vec<Requirement> {
    let participating: HashSet<&str> = self.participating(selection).iter().map(|c| c.name.as_str()).collect();
    self
      .requirements
      .iter()
      .filter(|r| r.component.as_deref().is_none_or(|c| participating.contains(c)))
      .cloned()
      .collect()
  }
}

/// Config file to load: explicit path, then `NATIVEDEPS_CONFIG`, then
/// `nativedeps.toml` in the current directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
  if let Some(path) = explicit {
    return path.to_path_buf();
  }
  std::env::var(ENV_CONFIG)
    .ok()
    .filter(|v| !v.is_empty())
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Work tree root: explicit path, then `NATIVEDEPS_ROOT`, then the config's
/// `root` resolved against the config directory.
pub fn resolve_root(config: &PipelineConfig, explicit: Option<&Path>) -> PathBuf {
  if let Some(path) = explicit {
    return path.to_path_buf();
  }
  if let Ok(root) = std::env::var(ENV_ROOT)
    && !root.is_empty()
  {
    return PathBuf::from(root);
  }
  config.resolve_path(&config.root)
}

/// Solver selection: explicit value, then `NATIVEDEPS_SOLVERS`, then default.
pub fn resolve_selection(explicit: Option<SolverSelection>) -> Result<SolverSelection, ConfigError> {
  if let Some(selection) = explicit {
    return Ok(selection);
  }
  match std::env::var(ENV_SOLVERS) {
    Ok(value) if !value.is_empty() => value.parse(),
    _ => Ok(SolverSelection::default()),
  }
}

/// Parallel job count: explicit value, then `NATIVEDEPS_JOBS`, then the
/// number of available CPUs.
pub fn resolve_jobs(explicit: Option<usize>) -> Result<usize, ConfigError> {
  if let Some(jobs) = explicit {
    return if jobs == 0 {
      Err(ConfigError::InvalidJobs(jobs.to_string()))
    } else {
      Ok(jobs)
    };
  }
  match std::env::var(ENV_JOBS) {
    Ok(value) if !value.is_empty() => match value.trim().parse::<usize>() {
      Ok(jobs) if jobs > 0 => Ok(jobs),
      _ => Err(ConfigError::InvalidJobs(value)),
    },
    _ => Ok(num_cpus()),
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
