//! Hashing utilities for pins, fingerprints and output verification.
//!
//! All hashes are lowercase hexadecimal SHA-256 digests (64 characters).

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

/// Error while hashing files or directories.
#[derive(Debug, Error)]
pub enum HashError {
  #[error("failed to walk directory {path}: {message}")]
  WalkDir { path: String, message: String },

  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize value for hashing: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data);
  hex::encode(hasher.finalize())
}

/// Hash the JSON serialization of a value.
///
/// Used to fingerprint target definitions: two definitions hash equal iff
/// they serialize to the same JSON.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
  let serialized = serde_json::to_string(value)?;
  Ok(hash_bytes(serialized.as_bytes()))
}

/// Hash a file's contents without loading it into memory at once.
pub fn hash_file(path: &Path) -> Result<String, HashError> {
  let read_err = |source| HashError::Read {
    path: path.display().to_string(),
    source,
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(hex::encode(hasher.finalize()))
}

/// Compute a deterministic hash of a directory's contents.
///
/// File contents, directory structure and symlink targets are included;
/// timestamps and permissions are not. Entries are visited in name order.
pub fn hash_directory(path: &Path) -> Result<String, HashError> {
  let mut hasher = Sha256::new();

  for entry in WalkDir::new(path).sort_by_file_name() {
    let entry = entry.map_err(|e| HashError::WalkDir {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    let entry_path = entry.path();

    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .replace('\\', "/");

    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let line = if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|source| HashError::Read {
        path: entry_path.display().to_string(),
        source,
      })?;
      format!("L:{}:{}", rel_path, hash_bytes(target.to_string_lossy().as_bytes()))
    } else if file_type.is_file() {
      format!("F:{}:{}", rel_path, hash_file(entry_path)?)
    } else if file_type.is_dir() {
      format!("D:{}", rel_path)
    } else {
      continue;
    };

    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(hex::encode(hasher.finalize()))
}
