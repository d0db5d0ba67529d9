//! Archive unpacking.
//!
//! Supports `.tar.gz`/`.tgz`, `.tar` and `.zip`, chosen by file name. A
//! configurable number of leading path components is stripped from every
//! entry; entries that would land outside the destination are rejected.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("unsupported archive format: {0}")]
  Unsupported(String),

  #[error("archive entry escapes the destination: {0}")]
  EscapingEntry(String),

  #[error("corrupt zip archive: {0}")]
  Zip(String),

  #[error("I/O error while unpacking {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
  TarGz,
  Tar,
  Zip,
}

impl ArchiveFormat {
  pub fn from_file_name(name: &str) -> Option<Self> {
    let name = name.to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
      Some(ArchiveFormat::TarGz)
    } else if name.ends_with(".tar") {
      Some(ArchiveFormat::Tar)
    } else if name.ends_with(".zip") {
      Some(ArchiveFormat::Zip)
    } else {
      None
    }
  }
}

/// Unpack `archive` into `dest`, creating it if needed.
///
/// Returns the number of entries written.
pub fn unpack_archive(archive: &Path, dest: &Path, strip_components: usize) -> Result<usize, ArchiveError> {
  let name = archive
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let format = ArchiveFormat::from_file_name(&name).ok_or_else(|| ArchiveError::Unsupported(name.clone()))?;

  fs::create_dir_all(dest).map_err(io_err(dest))?;
  let file = File::open(archive).map_err(io_err(archive))?;

  let count = match format {
    ArchiveFormat::TarGz => unpack_tar(GzDecoder::new(BufReader::new(file)), archive, dest, strip_components)?,
    ArchiveFormat::Tar => unpack_tar(BufReader::new(file), archive, dest, strip_components)?,
    ArchiveFormat::Zip => unpack_zip(file, dest, strip_components)?,
  };

  debug!(archive = %archive.display(), dest = %dest.display(), entries = count, "unpacked archive");
  Ok(count)
}

/// A link entry. Links are created after every other entry is in place so no
/// file is ever written through one.
enum PendingLink {
  Symbolic { path: PathBuf, target: PathBuf },
  Hard { path: PathBuf, source: PathBuf },
}

fn unpack_tar<R: Read>(reader: R, archive_path: &Path, dest: &Path, strip: usize) -> Result<usize, ArchiveError> {
  let mut archive = Archive::new(reader);
  let mut links = Vec::new();
  let mut count = 0;

  for entry in archive.entries().map_err(io_err(archive_path))? {
    let mut entry = entry.map_err(io_err(archive_path))?;
    let path = entry.path().map_err(io_err(archive_path))?.into_owned();

    let Some(relative) = strip_entry(&path, strip)? else {
      continue;
    };

    let kind = entry.header().entry_type();
    if kind.is_symlink() || kind.is_hard_link() {
      let target = entry
        .link_name()
        .map_err(io_err(archive_path))?
        .ok_or_else(|| ArchiveError::EscapingEntry(path.display().to_string()))?
        .into_owned();
      if kind.is_symlink() {
        links.push(PendingLink::Symbolic { path: relative, target });
      } else {
        // hard link targets are archive paths, stripped like entry paths
        let source =
          strip_entry(&target, strip)?.ok_or_else(|| ArchiveError::EscapingEntry(target.display().to_string()))?;
        links.push(PendingLink::Hard { path: relative, source });
      }
      continue;
    }

    let dest_path = dest.join(&relative);
    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    entry.unpack(&dest_path).map_err(io_err(&dest_path))?;
    count += 1;
  }

  Ok(count + create_links(dest, links)?)
}

fn unpack_zip(file: File, dest: &Path, strip: usize) -> Result<usize, ArchiveError> {
  let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| ArchiveError::Zip(e.to_string()))?;
  let mut links = Vec::new();
  let mut count = 0;

  for i in 0..archive.len() {
    let mut entry = archive.by_index(i).map_err(|e| ArchiveError::Zip(e.to_string()))?;
    let path = entry
      .enclosed_name()
      .ok_or_else(|| ArchiveError::EscapingEntry(entry.name().to_string()))?;

    let Some(relative) = strip_entry(&path, strip)? else {
      continue;
    };
    let dest_path = dest.join(&relative);

    if entry.unix_mode().is_some_and(is_symlink_mode) {
      let mut target = String::new();
      entry.read_to_string(&mut target).map_err(io_err(&dest_path))?;
      links.push(PendingLink::Symbolic {
        path: relative,
        target: PathBuf::from(target),
      });
      continue;
    }

    if entry.is_dir() {
      fs::create_dir_all(&dest_path).map_err(io_err(&dest_path))?;
    } else {
      if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
      }
      let mut outfile = File::create(&dest_path).map_err(io_err(&dest_path))?;
      std::io::copy(&mut entry, &mut outfile).map_err(io_err(&dest_path))?;

      #[cfg(unix)]
      {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = entry.unix_mode() {
          fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode & 0o7777)).map_err(io_err(&dest_path))?;
        }
      }
    }
    count += 1;
  }

  Ok(count + create_links(dest, links)?)
}

fn is_symlink_mode(mode: u32) -> bool {
  mode & 0o170000 == 0o120000
}

/// Create pending links in archive order. Every link must resolve inside
/// `dest`, also when it points through links created before it; links that
/// point through later ones are checked again once all exist.
fn create_links(dest: &Path, links: Vec<PendingLink>) -> Result<usize, ArchiveError> {
  if links.is_empty() {
    return Ok(0);
  }

  let root = dunce::canonicalize(dest).map_err(io_err(dest))?;
  let mut symlinks = Vec::new();

  for link in &links {
    let (path, escaping) = match link {
      PendingLink::Symbolic { path, target } => (path, target.has_root()),
      PendingLink::Hard { path, .. } => (path, false),
    };
    let dest_path = dest.join(path);
    if escaping {
      return Err(ArchiveError::EscapingEntry(path.display().to_string()));
    }

    let parent = dest_path.parent().unwrap_or(dest);
    ensure_inside(&root, parent, path)?;
    fs::create_dir_all(parent).map_err(io_err(parent))?;

    match link {
      PendingLink::Symbolic { target, .. } => {
        ensure_inside(&root, &parent.join(target), path)?;
        make_symlink(target, &dest_path)?;
        symlinks.push((path, dest_path));
      }
      PendingLink::Hard { source, .. } => {
        let source_path = dest.join(source);
        ensure_inside(&root, &source_path, path)?;
        fs::hard_link(&source_path, &dest_path).map_err(io_err(&dest_path))?;
      }
    }
  }

  for (path, dest_path) in &symlinks {
    let target = fs::read_link(dest_path).map_err(io_err(dest_path))?;
    let parent = dest_path.parent().unwrap_or(dest);
    ensure_inside(&root, &parent.join(target), path)?;
  }

  Ok(links.len())
}

/// Fail unless `path` resolves under `root`. The longest existing prefix is
/// resolved on disk, so links already in place are followed; the rest is
/// resolved lexically.
fn ensure_inside(root: &Path, path: &Path, entry: &Path) -> Result<(), ArchiveError> {
  let escaping = || ArchiveError::EscapingEntry(entry.display().to_string());

  let mut existing = path;
  let mut rest = Vec::new();
  let mut resolved = loop {
    match dunce::canonicalize(existing) {
      Ok(resolved) => break resolved,
      Err(_) => {
        let (Some(parent), Some(last)) = (existing.parent(), existing.components().next_back()) else {
          return Err(escaping());
        };
        rest.push(last);
        existing = parent;
      }
    }
  };

  for component in rest.into_iter().rev() {
    match component {
      Component::Normal(part) => resolved.push(part),
      Component::CurDir => {}
      Component::ParentDir => {
        if !resolved.pop() {
          return Err(escaping());
        }
      }
      Component::RootDir | Component::Prefix(_) => return Err(escaping()),
    }
  }

  if resolved.starts_with(root) {
    Ok(())
  } else {
    Err(escaping())
  }
}

#[cfg(unix)]
fn make_symlink(target: &Path, path: &Path) -> Result<(), ArchiveError> {
  std::os::unix::fs::symlink(target, path).map_err(io_err(path))
}

#[cfg(windows)]
fn make_symlink(target: &Path, path: &Path) -> Result<(), ArchiveError> {
  std::os::windows::fs::symlink_file(target, path).map_err(io_err(path))
}

/// Drop `strip` leading components. `Ok(None)` for entries consumed entirely
/// by the strip (the top-level directory itself).
fn strip_entry(path: &Path, strip: usize) -> Result<Option<PathBuf>, ArchiveError> {
  let mut normal = Vec::new();
  for component in path.components() {
    match component {
      Component::Normal(part) => normal.push(part),
      Component::CurDir => {}
      _ => return Err(ArchiveError::EscapingEntry(path.display().to_string())),
    }
  }

  let stripped: PathBuf = normal.into_iter().skip(strip).collect();
  if stripped.as_os_str().is_empty() {
    Ok(None)
  } else {
    Ok(Some(stripped))
  }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
  move |source| ArchiveError::Io {
    path: path.to_path_buf(),
    source,
  }
}
