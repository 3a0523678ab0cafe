//! Stream values and their content locators.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::classify::{ContentTypes, Scopes, describe};

use super::folder::IntermediateFolder;
use super::input::{ChangedFiles, DirectoryInput, JarInput, Status, TransformInput, changes_under};

/// Identifies a stream value within one registry.
///
/// Restricted copies receive fresh ids; ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u32);

impl fmt::Display for StreamId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "s{}", self.0)
  }
}

/// Identifies a transform by its registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransformId(pub usize);

impl fmt::Display for TransformId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "t{}", self.0)
  }
}

/// Errors that can occur while listing or diffing stream contents.
#[derive(Debug, Error)]
pub enum InputError {
  #[error("failed to read '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk '{path}': {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to read archive '{path}': {source}")]
  Zip {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },
}

/// Where a stream's files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLocator {
  /// Files handed in from outside the pipeline.
  Original {
    jars: Vec<PathBuf>,
    directories: Vec<PathBuf>,
  },
  /// A root owned by the pipeline; its artifacts are only known by listing
  /// the filesystem once the producing transform has run.
  Intermediate { root: PathBuf },
}

/// An immutable, classified handle over a set of files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
  id: StreamId,
  name: String,
  content_types: ContentTypes,
  scopes: Scopes,
  locator: Arc<StreamLocator>,
  producer: Option<TransformId>,
}

impl Stream {
  pub(crate) fn new(
    id: StreamId,
    name: impl Into<String>,
    content_types: ContentTypes,
    scopes: Scopes,
    locator: StreamLocator,
    producer: Option<TransformId>,
  ) -> Self {
    debug_assert!(!content_types.is_empty(), "stream content types must be non-empty");
    debug_assert!(!scopes.is_empty(), "stream scopes must be non-empty");
    Self {
      id,
      name: name.into(),
      content_types,
      scopes,
      locator: Arc::new(locator),
      producer,
    }
  }

  /// A view of this stream narrowed to the given types and scopes.
  ///
  /// The copy shares the parent's locator and producer.
  pub(crate) fn restricted(&self, id: StreamId, content_types: ContentTypes, scopes: Scopes) -> Self {
    debug_assert!(content_types.is_subset(&self.content_types));
    debug_assert!(scopes.is_subset(&self.scopes));
    Self {
      id,
      name: self.name.clone(),
      content_types,
      scopes,
      locator: Arc::clone(&self.locator),
      producer: self.producer,
    }
  }

  pub fn id(&self) -> StreamId {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn content_types(&self) -> &ContentTypes {
    &self.content_types
  }

  pub fn scopes(&self) -> &Scopes {
    &self.scopes
  }

  pub fn locator(&self) -> &StreamLocator {
    &self.locator
  }

  /// The transform whose output this stream is, if any.
  pub fn producer(&self) -> Option<TransformId> {
    self.producer
  }

  /// Returns true if both streams view the same underlying files.
  pub fn shares_content_with(&self, other: &Stream) -> bool {
    Arc::ptr_eq(&self.locator, &other.locator)
  }

  /// Every file the stream is made of, or its root for an intermediate stream.
  pub fn locations(&self) -> Vec<PathBuf> {
    match self.locator.as_ref() {
      StreamLocator::Original { jars, directories } => jars.iter().chain(directories).cloned().collect(),
      StreamLocator::Intermediate { root } => vec![root.clone()],
    }
  }

  /// Full listing of the stream's artifacts, as for a clean build.
  ///
  /// Only artifacts present on disk are listed. Jars are marked `Added`.
  pub fn as_non_incremental_input(&self) -> Result<TransformInput, InputError> {
    let input = match self.locator.as_ref() {
      StreamLocator::Original { jars, directories } => TransformInput {
        jars: jars
          .iter()
          .filter(|jar| jar.is_file())
          .map(|jar| self.jar_input(jar, Status::Added))
          .collect(),
        directories: directories
          .iter()
          .filter(|dir| dir.is_dir())
          .map(|dir| self.directory_input(dir, Default::default()))
          .collect(),
      },
      StreamLocator::Intermediate { root } => self.folder(root).inputs(None)?,
    };
    debug!(stream = %self, artifacts = input.len(), "listed stream contents");
    Ok(input)
  }

  /// The stream's artifacts with their changes since the previous build.
  pub fn as_incremental_input(&self, changed: &ChangedFiles) -> Result<TransformInput, InputError> {
    let input = match self.locator.as_ref() {
      StreamLocator::Original { jars, directories } => TransformInput {
        jars: jars
          .iter()
          .map(|jar| {
            let status = changed.get(jar).copied().unwrap_or(Status::Unchanged);
            self.jar_input(jar, status)
          })
          .collect(),
        directories: directories
          .iter()
          .map(|dir| self.directory_input(dir, changes_under(changed, dir)))
          .collect(),
      },
      StreamLocator::Intermediate { root } => self.folder(root).inputs(Some(changed))?,
    };
    debug!(stream = %self, artifacts = input.len(), "computed incremental stream contents");
    Ok(input)
  }

  fn folder(&self, root: &Path) -> IntermediateFolder {
    IntermediateFolder::new(root.to_path_buf(), self.content_types.clone(), self.scopes.clone())
  }

  fn jar_input(&self, jar: &Path, status: Status) -> JarInput {
    JarInput {
      name: artifact_name(jar),
      file: jar.to_path_buf(),
      status,
      content_types: self.content_types.clone(),
      scopes: self.scopes.clone(),
    }
  }

  fn directory_input(&self, dir: &Path, changed_files: BTreeMap<PathBuf, Status>) -> DirectoryInput {
    DirectoryInput {
      name: artifact_name(dir),
      file: dir.to_path_buf(),
      content_types: self.content_types.clone(),
      scopes: self.scopes.clone(),
      changed_files,
    }
  }
}

impl fmt::Display for Stream {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}({}) {} {}",
      self.name,
      self.id,
      describe(&self.content_types),
      describe(&self.scopes)
    )
  }
}

fn artifact_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().to_string())
    .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::classify::{ContentType, Scope};
  use std::fs;
  use tempfile::TempDir;

  fn types(items: &[ContentType]) -> ContentTypes {
    items.iter().copied().collect()
  }

  fn scopes(items: &[Scope]) -> Scopes {
    items.iter().copied().collect()
  }

  fn original(temp: &TempDir) -> Stream {
    let jar = temp.path().join("lib.jar");
    let dir = temp.path().join("classes");
    fs::write(&jar, b"not really a jar").unwrap();
    fs::create_dir_all(&dir).unwrap();

    Stream::new(
      StreamId(0),
      "compiled",
      types(&[ContentType::Classes]),
      scopes(&[Scope::Project]),
      StreamLocator::Original {
        jars: vec![jar, temp.path().join("gone.jar")],
        directories: vec![dir],
      },
      None,
    )
  }

  #[test]
  fn restricted_copy_shares_locator() {
    let stream = Stream::new(
      StreamId(0),
      "all",
      types(&[ContentType::Classes, ContentType::Resources]),
      scopes(&[Scope::Project]),
      StreamLocator::Intermediate {
        root: PathBuf::from("/out"),
      },
      Some(TransformId(3)),
    );

    let copy = stream.restricted(StreamId(1), types(&[ContentType::Resources]), scopes(&[Scope::Project]));
    assert!(copy.shares_content_with(&stream));
    assert_eq!(copy.producer(), Some(TransformId(3)));
    assert_eq!(copy.name(), "all");
    assert_eq!(copy.content_types(), &types(&[ContentType::Resources]));
    assert_eq!(stream.content_types().len(), 2);
  }

  #[test]
  fn non_incremental_original_skips_missing_files() {
    let temp = TempDir::new().unwrap();
    let stream = original(&temp);

    let input = stream.as_non_incremental_input().unwrap();
    assert_eq!(input.jars.len(), 1);
    assert_eq!(input.jars[0].name, "lib.jar");
    assert_eq!(input.jars[0].status, Status::Added);
    assert_eq!(input.directories.len(), 1);
    assert!(input.directories[0].changed_files.is_empty());
  }

  #[test]
  fn incremental_original_reports_statuses() {
    let temp = TempDir::new().unwrap();
    let stream = original(&temp);

    let mut changed = ChangedFiles::new();
    changed.insert(temp.path().join("gone.jar"), Status::Removed);
    changed.insert(temp.path().join("classes/A.class"), Status::Changed);

    let input = stream.as_incremental_input(&changed).unwrap();
    let statuses: Vec<Status> = input.jars.iter().map(|jar| jar.status).collect();
    assert_eq!(statuses, vec![Status::Unchanged, Status::Removed]);
    assert_eq!(input.directories[0].changed_files.len(), 1);
  }

  #[test]
  fn display_names_classification() {
    let temp = TempDir::new().unwrap();
    let stream = original(&temp);
    assert_eq!(stream.to_string(), "compiled(s0) [CLASSES] [PROJECT]");
  }
}
