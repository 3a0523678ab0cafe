//! What a registered transform sees when it runs.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::classify::{ContentTypes, Scopes};
use crate::incremental::{ArtifactChanges, InputMode, ZipCache, collect_changes};
use crate::stream::{ChangedFiles, Format, InputError, IntermediateFolder, Stream, StreamLocator, TransformInput};

use super::types::RegisteredTransform;

/// Hands out locations under a transform's output root.
#[derive(Debug, Clone)]
pub struct OutputProvider {
  folder: IntermediateFolder,
}

impl OutputProvider {
  /// Provider over the root of an intermediate `output` stream.
  ///
  /// Returns `None` for an original stream, which has no root to write to.
  pub fn for_stream(output: &Stream) -> Option<Self> {
    match output.locator() {
      StreamLocator::Intermediate { root } => Some(Self {
        folder: IntermediateFolder::new(root.clone(), output.content_types().clone(), output.scopes().clone()),
      }),
      StreamLocator::Original { .. } => None,
    }
  }

  pub fn root(&self) -> &Path {
    self.folder.root()
  }

  /// Where to write an artifact named `name` carrying `types` x `scopes`.
  pub fn content_location(
    &self,
    name: &str,
    types: &ContentTypes,
    scopes: &Scopes,
    format: Format,
  ) -> Result<PathBuf, InputError> {
    self.folder.content_location(name, types, scopes, format)
  }

  pub fn delete_all(&self) -> Result<(), InputError> {
    self.folder.delete_all()
  }
}

/// The resolved inputs of one transform run.
#[derive(Debug, Clone)]
pub struct TransformInvocation {
  pub task_name: String,
  pub mode: InputMode,
  pub inputs: Vec<TransformInput>,
  pub referenced: Vec<TransformInput>,
  pub output: OutputProvider,
}

impl TransformInvocation {
  /// Resolve inputs for `registered`.
  ///
  /// Inputs are incremental only when `changed` is given and the transform
  /// supports it. Otherwise every input is listed in full and the output root
  /// is wiped.
  ///
  /// # Panics
  ///
  /// Panics if the output stream is not an intermediate stream, which
  /// [`TransformManager`](super::TransformManager) never produces.
  pub fn prepare(registered: &RegisteredTransform, changed: Option<&ChangedFiles>) -> Result<Self, InputError> {
    let Some(output) = OutputProvider::for_stream(&registered.output) else {
      panic!(
        "transform '{}' has output stream {} without an intermediate root",
        registered.name(),
        registered.output
      );
    };

    let changed = changed.filter(|_| registered.descriptor.incremental);
    let resolve = |streams: &[Stream]| -> Result<Vec<TransformInput>, InputError> {
      streams
        .iter()
        .map(|stream| match changed {
          Some(changed) => stream.as_incremental_input(changed),
          None => stream.as_non_incremental_input(),
        })
        .collect()
    };

    let inputs = resolve(&registered.inputs)?;
    let referenced = resolve(&registered.referenced)?;

    let mode = match changed {
      Some(_) => InputMode::Incremental,
      None => {
        debug!(root = ?output.root(), "clearing output for full run");
        output.delete_all()?;
        InputMode::Full
      }
    };

    info!(
      task = %registered.task_name,
      incremental = matches!(mode, InputMode::Incremental),
      inputs = inputs.len(),
      referenced = referenced.len(),
      "prepared transform invocation"
    );

    Ok(Self {
      task_name: registered.task_name.clone(),
      mode,
      inputs,
      referenced,
      output,
    })
  }

  pub fn is_incremental(&self) -> bool {
    self.mode == InputMode::Incremental
  }

  /// Per-file changes of every consumed input.
  pub fn changes(&self, cache: &ZipCache) -> Result<Vec<ArtifactChanges>, InputError> {
    let mut all = Vec::new();
    for input in &self.inputs {
      all.extend(collect_changes(input, self.mode, cache)?);
    }
    Ok(all)
  }
}
