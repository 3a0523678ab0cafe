use std::path::{Path, PathBuf};

use crate::platform::paths;

/// Assigns each transform an output root: `<base>/<transform>/<variant>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
  base: PathBuf,
}

impl OutputLayout {
  pub fn new(base: impl Into<PathBuf>) -> Self {
    Self { base: base.into() }
  }

  /// Layout under the configured build directory.
  pub fn from_env() -> Self {
    Self::new(paths::transforms_dir())
  }

  pub fn base(&self) -> &Path {
    &self.base
  }

  pub fn output_root(&self, transform: &str, variant: &str) -> PathBuf {
    self.base.join(transform).join(variant)
  }
}
