//! Work tree layout.
//!
//! ```text
//! <root>/.lock
//! <root>/downloads/<component>/<archive file>
//! <root>/sources/<component>/
//! <root>/artifacts/<component>/{lib,include}
//! <root>/state/<component>.<stage>.json
//! <root>/state/logs/<component>.<stage>.log
//! ```

use std::path::{Path, PathBuf};

use crate::target::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
  root: PathBuf,
}

impl Layout {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn lock_path(&self) -> PathBuf {
    self.root.join(".lock")
  }

  pub fn downloads_dir(&self) -> PathBuf {
    self.root.join("downloads")
  }

  /// Per-component download cache; archives of different components never
  /// share a file even when their URLs end in the same name.
  pub fn component_downloads_dir(&self, component: &str) -> PathBuf {
    self.downloads_dir().join(component)
  }

  pub fn download_path(&self, component: &str, file_name: &str) -> PathBuf {
    self.component_downloads_dir(component).join(file_name)
  }

  pub fn sources_dir(&self) -> PathBuf {
    self.root.join("sources")
  }

  pub fn source_dir(&self, component: &str) -> PathBuf {
    self.sources_dir().join(component)
  }

  /// Unpack location used before the tree is renamed into place.
  pub fn staging_dir(&self, component: &str) -> PathBuf {
    self.sources_dir().join(format!(".{}.staging", component))
  }

  pub fn artifacts_dir(&self) -> PathBuf {
    self.root.join("artifacts")
  }

  pub fn artifact_dir(&self, component: &str) -> PathBuf {
    self.artifacts_dir().join(component)
  }

  pub fn state_dir(&self) -> PathBuf {
    self.root.join("state")
  }

  pub fn sentinel_path(&self, component: &str, stage: Stage) -> PathBuf {
    self.state_dir().join(format!("{}.{}.json", component, stage))
  }

  pub fn logs_dir(&self) -> PathBuf {
    self.state_dir().join("logs")
  }

  pub fn log_path(&self, component: &str, stage: Stage) -> PathBuf {
    self.logs_dir().join(format!("{}.{}.log", component, stage))
  }
}
