//! Fetch action: download, verify and unpack a source archive.
//!
//! Archives are cached under `<root>/downloads/<component>`. A cached file whose SHA-256
//! matches the pin is reused without network access. The unpacked tree is
//! assembled in a staging directory and renamed into place once complete, so
//! a failed fetch never leaves a half-populated source tree behind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::archive::{ArchiveError, unpack_archive};
use crate::config::ArchiveSource;
use crate::util::hash::{HashError, hash_file};

/// Everything needed to materialize one component's source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSpec {
  pub component: String,
  pub source: ArchiveSource,
  /// Cached archive location.
  pub download_path: PathBuf,
  /// Final location of the unpacked tree.
  pub dest: PathBuf,
  /// Temporary unpack location, renamed to `dest` on success.
  pub staging: PathBuf,
}

#[derive(Debug, Error)]
pub enum FetchError {
  #[error(
    "source tree {} exists but was never completely fetched; run `nativedeps clean {component}` first",
    path.display()
  )]
  DirtyTree { component: String, path: PathBuf },

  #[error("failed to download {url}: {message}")]
  Network { url: String, message: String },

  #[error("failed to download {url}: HTTP {status}")]
  Http { url: String, status: u16 },

  #[error("failed to read local archive {}: {source}", path.display())]
  LocalFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("checksum mismatch for {url}\n  expected: {expected}\n  actual:   {actual}")]
  ChecksumMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error("I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("blocking fetch task failed: {0}")]
  Task(String),
}

/// Fetch the archive described by `spec` and unpack it into `spec.dest`.
///
/// Returns the number of unpacked entries.
pub async fn fetch_archive(spec: &FetchSpec) -> Result<usize, FetchError> {
  if spec.dest.exists() {
    return Err(FetchError::DirtyTree {
      component: spec.component.clone(),
      path: spec.dest.clone(),
    });
  }

  let archive = download(&spec.source, &spec.download_path).await?;

  let dest = spec.dest.clone();
  let staging = spec.staging.clone();
  let strip = spec.source.strip_components;
  let entries = tokio::task::spawn_blocking(move || unpack_into_place(&archive, &staging, &dest, strip))
    .await
    .map_err(|e| FetchError::Task(e.to_string()))??;

  info!(component = %spec.component, dest = %spec.dest.display(), entries, "source tree ready");
  Ok(entries)
}

fn unpack_into_place(archive: &Path, staging: &Path, dest: &Path, strip: usize) -> Result<usize, FetchError> {
  remove_dir_if_exists(staging)?;

  let entries = match unpack_archive(archive, staging, strip) {
    Ok(entries) => entries,
    Err(e) => {
      let _ = std::fs::remove_dir_all(staging);
      return Err(e.into());
    }
  };

  std::fs::rename(staging, dest).map_err(|source| FetchError::Io {
    path: dest.to_path_buf(),
    source,
  })?;
  Ok(entries)
}

fn remove_dir_if_exists(path: &Path) -> Result<(), FetchError> {
  match std::fs::remove_dir_all(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(FetchError::Io {
      path: path.to_path_buf(),
      source,
    }),
  }
}

/// Ensure the archive is in the download cache and matches its pin.
pub async fn download(source: &ArchiveSource, dest: &Path) -> Result<PathBuf, FetchError> {
  let url = source.url.as_str();

  if fs::try_exists(dest).await.unwrap_or(false) {
    match &source.sha256 {
      Some(expected) => {
        let cached = dest.to_path_buf();
        let actual = tokio::task::spawn_blocking(move || hash_file(&cached))
          .await
          .map_err(|e| FetchError::Task(e.to_string()))??;
        if actual.eq_ignore_ascii_case(expected) {
          debug!(path = %dest.display(), "using cached archive");
          return Ok(dest.to_path_buf());
        }
        debug!(expected = %expected, actual = %actual, "cached archive hash mismatch, downloading again");
      }
      None => {
        warn!(path = %dest.display(), url = %url, "reusing cached archive without a sha256 pin");
        return Ok(dest.to_path_buf());
      }
    }
  }

  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).await.map_err(|source| FetchError::Io {
      path: parent.to_path_buf(),
      source,
    })?;
  }

  info!(url = %url, "downloading");
  let bytes = read_url(url).await?;

  let actual = {
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
  };

  match &source.sha256 {
    Some(expected) if !actual.eq_ignore_ascii_case(expected) => {
      return Err(FetchError::ChecksumMismatch {
        url: url.to_string(),
        expected: expected.to_ascii_lowercase(),
        actual,
      });
    }
    Some(_) => {}
    None => warn!(url = %url, sha256 = %actual, "source is not pinned; consider adding this sha256"),
  }

  let part = part_path(dest);
  let io_err = |source| FetchError::Io {
    path: part.clone(),
    source,
  };
  let mut file = fs::File::create(&part).await.map_err(io_err)?;
  file.write_all(&bytes).await.map_err(io_err)?;
  file.flush().await.map_err(io_err)?;
  drop(file);
  fs::rename(&part, dest).await.map_err(|source| FetchError::Io {
    path: dest.to_path_buf(),
    source,
  })?;

  info!(path = %dest.display(), size = bytes.len(), "download complete");
  Ok(dest.to_path_buf())
}

async fn read_url(url: &str) -> Result<Vec<u8>, FetchError> {
  if let Some(path) = url.strip_prefix("file://") {
    let path = PathBuf::from(path);
    return fs::read(&path).await.map_err(|source| FetchError::LocalFile { path, source });
  }

  let response = reqwest::get(url).await.map_err(|e| FetchError::Network {
    url: url.to_string(),
    message: e.to_string(),
  })?;

  if !response.status().is_success() {
    return Err(FetchError::Http {
      url: url.to_string(),
      status: response.status().as_u16(),
    });
  }

  let bytes = response.bytes().await.map_err(|e| FetchError::Network {
    url: url.to_string(),
    message: e.to_string(),
  })?;
  Ok(bytes.to_vec())
}

fn part_path(dest: &Path) -> PathBuf {
  let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".part");
  dest.with_file_name(name)
}

/// Archive file name for a source: the explicit override, or the last URL
/// path segment sanitized to a safe file name.
pub fn archive_file_name(source: &ArchiveSource) -> String {
  match &source.file_name {
    Some(name) => name.clone(),
    None => url_to_filename(&source.url),
  }
}

/// Convert a URL to a safe filename.
///
/// Falls back to a hash of the URL if no usable name can be extracted.
pub fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split(['?', '#']).next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  format!("download_{}", &hex::encode(hasher.finalize())[..16])
}
