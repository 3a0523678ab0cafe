//! Pipeline definition files.
//!
//! A JSON file declaring the original streams and the ordered transforms of
//! one variant. Relative paths are resolved against the file's directory.
//!
//! ```json
//! {
//!   "variant": "debug",
//!   "streams": [
//!     { "name": "classes", "content_types": ["CLASSES"], "scopes": ["PROJECT"], "directories": ["classes"] }
//!   ],
//!   "transforms": [
//!     { "name": "dex", "input_types": ["CLASSES"], "scopes": ["PROJECT"], "output_types": ["DEX"] }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::classify::{ContentTypes, Scopes};
use crate::platform::paths;
use crate::transform::{
  ConfigError, IssueReporter, OutputLayout, RegisteredTransform, TransformDescriptor, TransformManager,
  ValidationPolicy,
};

#[derive(Debug, Error)]
pub enum DefinitionError {
  #[error("failed to read pipeline definition '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse pipeline definition '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("duplicate transform name '{0}'")]
  DuplicateTransform(String),

  #[error(transparent)]
  Stream(#[from] ConfigError),
}

/// An original stream as declared in a definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
  pub name: String,
  pub content_types: ContentTypes,
  pub scopes: Scopes,
  #[serde(default)]
  pub jars: Vec<PathBuf>,
  #[serde(default)]
  pub directories: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
  /// Falls back to `XFORM_VARIANT`.
  #[serde(default)]
  pub variant: Option<String>,
  /// Base of transform output roots; falls back to the build directory layout.
  #[serde(default)]
  pub output_dir: Option<PathBuf>,
  /// Transform kinds allowed to consume `PROVIDED_ONLY`.
  #[serde(default)]
  pub provided_only_exempt: Option<Vec<String>>,
  #[serde(default)]
  pub streams: Vec<StreamSpec>,
  #[serde(default)]
  pub transforms: Vec<TransformDescriptor>,
}

impl PipelineDefinition {
  pub fn load(path: &Path) -> Result<Self, DefinitionError> {
    let content = fs::read_to_string(path).map_err(|source| DefinitionError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut definition: PipelineDefinition =
      serde_json::from_str(&content).map_err(|source| DefinitionError::Parse {
        path: path.to_path_buf(),
        source,
      })?;

    let base = path.parent().unwrap_or(Path::new("."));
    definition.resolve_paths(base);
    definition.check_names()?;

    debug!(
      path = ?path,
      streams = definition.streams.len(),
      transforms = definition.transforms.len(),
      "loaded pipeline definition"
    );
    Ok(definition)
  }

  fn resolve_paths(&mut self, base: &Path) {
    let resolve = |path: &mut PathBuf| {
      if path.is_relative() {
        *path = base.join(&*path);
      }
    };
    for stream in &mut self.streams {
      stream.jars.iter_mut().for_each(&resolve);
      stream.directories.iter_mut().for_each(&resolve);
    }
    if let Some(dir) = self.output_dir.as_mut() {
      resolve(dir);
    }
  }

  fn check_names(&self) -> Result<(), DefinitionError> {
    let mut seen = BTreeSet::new();
    for transform in &self.transforms {
      if !seen.insert(transform.name.as_str()) {
        return Err(DefinitionError::DuplicateTransform(transform.name.clone()));
      }
    }
    Ok(())
  }

  pub fn variant(&self) -> String {
    self.variant.clone().unwrap_or_else(paths::variant)
  }

  pub fn layout(&self) -> OutputLayout {
    match &self.output_dir {
      Some(dir) => OutputLayout::new(dir),
      None => OutputLayout::from_env(),
    }
  }

  pub fn policy(&self) -> ValidationPolicy {
    match &self.provided_only_exempt {
      Some(kinds) => ValidationPolicy::new(kinds.iter().cloned()),
      None => ValidationPolicy::default(),
    }
  }

  /// An empty manager configured for this definition.
  pub fn manager_with<R: IssueReporter>(&self, reporter: R) -> TransformManager<R> {
    TransformManager::with_reporter(self.variant(), self.layout(), reporter).with_policy(self.policy())
  }

  /// Add every stream, then every transform in order.
  ///
  /// An invalid stream aborts registration. Transform configuration errors
  /// do not; each outcome is returned in declaration order.
  pub fn register<R: IssueReporter>(
    &self,
    manager: &mut TransformManager<R>,
  ) -> Result<Vec<Result<Option<RegisteredTransform>, ConfigError>>, DefinitionError> {
    for stream in &self.streams {
      manager.add_original_stream(
        stream.name.clone(),
        stream.content_types.clone(),
        stream.scopes.clone(),
        stream.jars.clone(),
        stream.directories.clone(),
      )?;
    }

    let outcomes: Vec<_> = self
      .transforms
      .iter()
      .map(|descriptor| manager.add_transform(descriptor.clone()))
      .collect();

    let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
    if failed > 0 {
      warn!(failed, total = outcomes.len(), "some transforms were not registered");
    }
    Ok(outcomes)
  }
}
