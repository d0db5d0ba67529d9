//! Completion sentinels.
//!
//! A sentinel records that a target's action succeeded: the definition
//! fingerprint it ran with, the stamps of the prerequisites it consumed, and
//! a fresh stamp of its own. A target is satisfied when its sentinel matches
//! the current fingerprint and prerequisite stamps, so a rebuilt prerequisite
//! invalidates its dependents without comparing file times.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::{SENTINEL_VERSION, STAMP_LEN};
use crate::target::TargetId;
use crate::util::hash::{HashError, hash_bytes, hash_directory};

static STAMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum SentinelError {
  #[error("failed to read sentinel {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse sentinel {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to write sentinel {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),
}

/// Persisted record of a completed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinel {
  pub version: u32,
  pub target: String,
  /// Unique per realization.
  pub stamp: String,
  pub fingerprint: String,
  /// Stamps of the sentineled prerequisites at realization time.
  pub prerequisites: BTreeMap<String, String>,
  /// Content hash of the target's output directory, if it has one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_hash: Option<String>,
  pub completed_at_unix: u64,
}

impl Sentinel {
  pub fn new(target: &TargetId, fingerprint: &str, prerequisites: BTreeMap<String, String>) -> Self {
    Self {
      version: SENTINEL_VERSION,
      target: target.to_string(),
      stamp: new_stamp(target, fingerprint),
      fingerprint: fingerprint.to_string(),
      prerequisites,
      output_hash: None,
      completed_at_unix: unix_now(),
    }
  }

  /// Record the content hash of `dir`.
  pub fn with_output_hash(mut self, dir: &Path) -> Result<Self, SentinelError> {
    self.output_hash = Some(hash_directory(dir)?);
    Ok(self)
  }

  /// Read a sentinel; `Ok(None)` when it does not exist.
  pub fn read(path: &Path) -> Result<Option<Self>, SentinelError> {
    let content = match std::fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(SentinelError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };
    let sentinel = serde_json::from_str(&content).map_err(|source| SentinelError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Some(sentinel))
  }

  /// Read a sentinel, treating an unreadable or corrupt one as absent.
  pub fn read_lenient(path: &Path) -> Option<Self> {
    match Self::read(path) {
      Ok(sentinel) => sentinel,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "ignoring unreadable sentinel");
        None
      }
    }
  }

  /// Write the sentinel atomically (temp file + rename).
  pub fn write(&self, path: &Path) -> Result<(), SentinelError> {
    let write_err = |source| SentinelError::Write {
      path: path.to_path_buf(),
      source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let content = serde_json::to_string_pretty(self).map_err(|e| SentinelError::Hash(HashError::Serialize(e)))?;
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    std::fs::write(tmp.path(), format!("{}\n", content)).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    debug!(target = %self.target, stamp = %self.stamp, "wrote sentinel");
    Ok(())
  }

  /// Whether this sentinel still describes the current definition.
  ///
  /// `current_prereqs` maps each sentineled prerequisite to its current stamp.
  pub fn matches(&self, fingerprint: &str, current_prereqs: &BTreeMap<String, String>) -> bool {
    self.version == SENTINEL_VERSION && self.fingerprint == fingerprint && &self.prerequisites == current_prereqs
  }

  /// Whether `dir` still has the recorded content. Sentinels without an
  /// output hash always verify.
  pub fn verify_output(&self, dir: &Path) -> bool {
    let Some(expected) = &self.output_hash else {
      return true;
    };
    match hash_directory(dir) {
      Ok(actual) if actual == *expected => true,
      Ok(actual) => {
        warn!(
          path = %dir.display(),
          expected = %expected,
          actual = %actual,
          "output changed since it was recorded"
        );
        false
      }
      Err(e) => {
        warn!(path = %dir.display(), error = %e, "failed to hash output");
        false
      }
    }
  }
}

/// Remove a sentinel. Missing sentinels are not an error.
pub fn remove(path: &Path) -> std::io::Result<bool> {
  match std::fs::remove_file(path) {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(e),
  }
}

fn new_stamp(target: &TargetId, fingerprint: &str) -> String {
  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_nanos())
    .unwrap_or_default();
  let counter = STAMP_COUNTER.fetch_add(1, Ordering::Relaxed);
  let seed = format!("{}\0{}\0{}\0{}\0{}", target, fingerprint, nanos, std::process::id(), counter);
  let mut stamp = hash_bytes(seed.as_bytes());
  stamp.truncate(STAMP_LEN);
  stamp
}

fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or_default()
}
