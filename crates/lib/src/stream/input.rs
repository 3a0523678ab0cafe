//! Execution-time views of a stream's contents.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classify::{ContentTypes, Scopes};

/// Change status of a file or artifact relative to the previous build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
  Unchanged,
  Added,
  Changed,
  Removed,
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Status::Unchanged => "UNCHANGED",
      Status::Added => "ADDED",
      Status::Changed => "CHANGED",
      Status::Removed => "REMOVED",
    };
    f.write_str(name)
  }
}

impl FromStr for Status {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "UNCHANGED" | "NOTCHANGED" => Ok(Status::Unchanged),
      "ADDED" => Ok(Status::Added),
      "CHANGED" => Ok(Status::Changed),
      "REMOVED" => Ok(Status::Removed),
      other => Err(format!("unknown status: {}", other)),
    }
  }
}

/// Absolute path of every file that changed since the previous build.
///
/// Supplied by whatever schedules the transform. Paths absent from the map
/// are unchanged.
pub type ChangedFiles = BTreeMap<PathBuf, Status>;

/// Entries of `changed` located strictly below `dir`.
pub fn changes_under(changed: &ChangedFiles, dir: &Path) -> BTreeMap<PathBuf, Status> {
  changed
    .range(dir.to_path_buf()..)
    .take_while(|(path, _)| path.starts_with(dir))
    .filter(|(path, _)| path.as_path() != dir)
    .map(|(path, status)| (path.clone(), *status))
    .collect()
}

/// A jar artifact inside a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarInput {
  pub name: String,
  pub file: PathBuf,
  pub status: Status,
  pub content_types: ContentTypes,
  pub scopes: Scopes,
}

/// A directory artifact inside a stream.
///
/// A directory has no status of its own; `changed_files` carries the finer
/// per-file statuses, and is empty when nothing below it changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryInput {
  pub name: String,
  pub file: PathBuf,
  pub content_types: ContentTypes,
  pub scopes: Scopes,
  pub changed_files: BTreeMap<PathBuf, Status>,
}

/// The artifacts of one stream as handed to a transform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformInput {
  pub jars: Vec<JarInput>,
  pub directories: Vec<DirectoryInput>,
}

impl TransformInput {
  pub fn is_empty(&self) -> bool {
    self.jars.is_empty() && self.directories.is_empty()
  }

  /// Total number of artifacts.
  pub fn len(&self) -> usize {
    self.jars.len() + self.directories.len()
  }
}
