//! Returning the work tree to its pre-fetch state.
//!
//! A full clean removes the sources, artifacts, sentinels and logs of every
//! component, selected or not, plus the download cache unless asked to keep
//! it. A component clean removes the same things for the named components
//! only; their dependents become stale through the stamp check.

use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::PipelineConfig;
use crate::paths::Layout;
use crate::target::Stage;

#[derive(Debug, Error)]
pub enum CleanError {
  #[error("unknown component '{0}'")]
  UnknownComponent(String),

  #[error("failed to remove {}: {source}", path.display())]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
  /// Components to clean; empty means everything.
  pub components: Vec<String>,
  pub keep_downloads: bool,
  /// Report what would be removed without removing it.
  pub dry_run: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct CleanReport {
  pub removed: Vec<PathBuf>,
  pub bytes_freed: u64,
  pub dry_run: bool,
}

pub fn clean(config: &PipelineConfig, layout: &Layout, options: &CleanOptions) -> Result<CleanReport, CleanError> {
  for name in &options.components {
    if config.component(name).is_none() {
      return Err(CleanError::UnknownComponent(name.clone()));
    }
  }

  let mut candidates = Vec::new();
  if options.components.is_empty() {
    candidates.extend([layout.sources_dir(), layout.artifacts_dir(), layout.state_dir()]);
    if !options.keep_downloads {
      candidates.push(layout.downloads_dir());
    }
  } else {
    for name in &options.components {
      candidates.push(layout.source_dir(name));
      candidates.push(layout.staging_dir(name));
      candidates.push(layout.artifact_dir(name));
      for stage in Stage::ALL {
        candidates.push(layout.sentinel_path(name, stage));
        candidates.push(layout.log_path(name, stage));
      }
      if !options.keep_downloads {
        candidates.push(layout.component_downloads_dir(name));
      }
    }
  }

  let mut report = CleanReport {
    dry_run: options.dry_run,
    ..CleanReport::default()
  };
  for path in candidates {
    if fs::symlink_metadata(&path).is_err() {
      continue;
    }
    let size = path_size(&path);
    if !options.dry_run {
      remove_path(&path)?;
    }
    debug!(path = %path.display(), size, dry_run = options.dry_run, "removed");
    report.bytes_freed += size;
    report.removed.push(path);
  }

  info!(
    removed = report.removed.len(),
    bytes_freed = report.bytes_freed,
    dry_run = options.dry_run,
    "clean complete"
  );
  Ok(report)
}

fn remove_path(path: &Path) -> Result<(), CleanError> {
  let result = if path.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  };
  match result {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(CleanError::Remove {
      path: path.to_path_buf(),
      source,
    }),
  }
}

fn path_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}
