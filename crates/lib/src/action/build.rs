//! Build action: run a component's shell steps and export its artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::cmd::{CmdError, run_shell};
use crate::config::{ArtifactSpec, BuildStep};

/// A fully resolved component build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
  pub component: String,
  /// Patched source tree; steps run here unless they set `cwd`.
  pub src_dir: PathBuf,
  /// Artifact directory, recreated on every build.
  pub out_dir: PathBuf,
  pub steps: Vec<BuildStep>,
  /// Environment for every step, on top of the inherited one.
  pub env: BTreeMap<String, String>,
  pub artifacts: Vec<ArtifactSpec>,
  pub log_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("source tree {} does not exist", path.display())]
  MissingSource { path: PathBuf },

  #[error("build step {step} of {component} failed (log: {}): {source}", log.display())]
  Step {
    component: String,
    step: usize,
    log: PathBuf,
    #[source]
    source: CmdError,
  },

  #[error("build of {component} did not produce artifact {}", path.display())]
  MissingArtifact { component: String, path: PathBuf },

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("artifact export task failed: {0}")]
  Task(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BuildError + '_ {
  move |source| BuildError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Run every step of `spec` in order, then copy the declared artifacts into
/// `spec.out_dir`.
///
/// Returns the exported artifact paths.
pub async fn run_build(spec: &BuildSpec, jobs: usize, shell: Option<&str>) -> Result<Vec<PathBuf>, BuildError> {
  if !fs::metadata(&spec.src_dir).await.is_ok_and(|m| m.is_dir()) {
    return Err(BuildError::MissingSource {
      path: spec.src_dir.clone(),
    });
  }

  match fs::remove_dir_all(&spec.out_dir).await {
    Ok(()) => {}
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(source) => return Err(io_err(&spec.out_dir)(source)),
  }
  fs::create_dir_all(&spec.out_dir).await.map_err(io_err(&spec.out_dir))?;

  if let Some(parent) = spec.log_path.parent() {
    fs::create_dir_all(parent).await.map_err(io_err(parent))?;
  }
  let mut log = fs::File::create(&spec.log_path).await.map_err(io_err(&spec.log_path))?;

  let mut env = spec.env.clone();
  env.insert("JOBS".to_string(), jobs.to_string());

  for (index, step) in spec.steps.iter().enumerate() {
    let cwd = match step.cwd() {
      Some(dir) => spec.src_dir.join(dir),
      None => spec.src_dir.clone(),
    };

    info!(component = %spec.component, step = index + 1, cmd = %step.cmd(), "running build step");
    let step_err = |source| BuildError::Step {
      component: spec.component.clone(),
      step: index + 1,
      log: spec.log_path.clone(),
      source,
    };

    let output = run_shell(step.cmd(), &cwd, &env, shell).await.map_err(step_err)?;
    let entry = format!("$ {}\n{}{}", step.cmd(), output.stdout, output.stderr);
    log.write_all(entry.as_bytes()).await.map_err(io_err(&spec.log_path))?;
    log.flush().await.map_err(io_err(&spec.log_path))?;
    output.check().map_err(step_err)?;
  }

  let owned = spec.clone();
  let exported = tokio::task::spawn_blocking(move || export_artifacts(&owned))
    .await
    .map_err(|e| BuildError::Task(e.to_string()))??;

  info!(component = %spec.component, artifacts = exported.len(), "build complete");
  Ok(exported)
}

/// Copy every declared artifact from the source tree into `spec.out_dir`.
fn export_artifacts(spec: &BuildSpec) -> Result<Vec<PathBuf>, BuildError> {
  let mut exported = Vec::with_capacity(spec.artifacts.len());
  for artifact in &spec.artifacts {
    let src = spec.src_dir.join(&artifact.path);
    if !src.exists() {
      return Err(BuildError::MissingArtifact {
        component: spec.component.clone(),
        path: src,
      });
    }

    let dest = spec.out_dir.join(artifact.kind.subdir()).join(artifact.file_name());
    copy_artifact(&src, &dest)?;
    debug!(component = %spec.component, artifact = %dest.display(), "exported artifact");
    exported.push(dest);
  }
  Ok(exported)
}

/// Copy a file, or a directory tree, to `dest`.
fn copy_artifact(src: &Path, dest: &Path) -> Result<(), BuildError> {
  if src.is_file() {
    if let Some(parent) = dest.parent() {
      std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    std::fs::copy(src, dest).map_err(io_err(dest))?;
    return Ok(());
  }

  for entry in WalkDir::new(src).follow_links(true) {
    let entry = entry.map_err(|e| BuildError::Io {
      path: src.to_path_buf(),
      source: e.into(),
    })?;
    let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
    let target = dest.join(relative);

    if entry.file_type().is_dir() {
      std::fs::create_dir_all(&target).map_err(io_err(&target))?;
    } else {
      std::fs::copy(entry.path(), &target).map_err(io_err(&target))?;
    }
  }
  Ok(())
}
