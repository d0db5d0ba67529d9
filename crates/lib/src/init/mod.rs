//! Scaffold a new pipeline directory.
//!
//! Writes a sample `nativedeps.toml` and an empty `patches/` directory.

mod templates;

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::consts::CONFIG_FILE_NAME;

pub use templates::SAMPLE_CONFIG;

#[derive(Debug, Error)]
pub enum InitError {
  #[error("file already exists: {} (use --force to overwrite)", path.display())]
  PathExists { path: PathBuf },

  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: std::io::Error },

  #[error("failed to write file {}: {source}", path.display())]
  WriteFile { path: PathBuf, source: std::io::Error },
}

pub struct InitOptions {
  /// Directory that receives the configuration.
  pub dir: PathBuf,
  /// Overwrite an existing configuration file.
  pub force: bool,
}

#[derive(Debug)]
pub struct InitResult {
  pub config_path: PathBuf,
  pub patches_dir: PathBuf,
}

pub fn init(options: &InitOptions) -> Result<InitResult, InitError> {
  let dir = &options.dir;
  let config_path = dir.join(CONFIG_FILE_NAME);
  let patches_dir = dir.join("patches");

  if config_path.exists() && !options.force {
    return Err(InitError::PathExists { path: config_path });
  }

  fs::create_dir_all(&patches_dir).map_err(|source| InitError::CreateDir {
    path: patches_dir.clone(),
    source,
  })?;
  fs::write(&config_path, SAMPLE_CONFIG).map_err(|source| InitError::WriteFile {
    path: config_path.clone(),
    source,
  })?;

  info!(path = %config_path.display(), "wrote sample configuration");
  Ok(InitResult {
    config_path,
    patches_dir,
  })
}
