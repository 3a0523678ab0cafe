//! Incremental input computation.
//!
//! Turns the artifacts of a [`TransformInput`] into per-file changes:
//! - directories: every file (full mode) or the changed-file map filtered to
//!   regular files (incremental mode)
//! - jars: every entry (full mode, or `ADDED`), the entries of the cached copy
//!   (`REMOVED`), or a diff against the cached copy (`CHANGED`)
//!
//! Nothing here writes to the zip cache. [`cache_update_for`] describes what
//! should happen to the cache once the transform has run.

pub mod archive;
pub mod cache;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::stream::{DirectoryInput, Format, InputError, JarInput, Status, TransformInput};

pub use archive::{EntryDigest, diff_entries, read_entries};
pub use cache::{CacheError, CacheUpdate, ZipCache};

/// Status of a single file inside an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
  New,
  Changed,
  Removed,
}

impl fmt::Display for FileStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      FileStatus::New => "NEW",
      FileStatus::Changed => "CHANGED",
      FileStatus::Removed => "REMOVED",
    };
    f.write_str(name)
  }
}

/// One logical file inside an artifact.
///
/// `base` is the directory or jar the file belongs to; `relative` is its
/// `/`-separated path inside it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelativeFile {
  pub base: PathBuf,
  pub relative: String,
}

impl RelativeFile {
  pub fn new(base: impl Into<PathBuf>, relative: impl Into<String>) -> Self {
    Self {
      base: base.into(),
      relative: relative.into(),
    }
  }
}

impl fmt::Display for RelativeFile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}!/{}", self.base.display(), self.relative)
  }
}

pub type FileChanges = BTreeMap<RelativeFile, FileStatus>;

/// Whether inputs are listed in full or as a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
  /// Every file is reported `NEW`.
  Full,
  /// Only changes since the previous build are reported.
  Incremental,
}

/// Map an artifact-level status onto a per-file status.
///
/// `UNCHANGED` files are not reported.
pub fn file_status(status: Status) -> Option<FileStatus> {
  match status {
    Status::Added => Some(FileStatus::New),
    Status::Changed => Some(FileStatus::Changed),
    Status::Removed => Some(FileStatus::Removed),
    Status::Unchanged => None,
  }
}

/// Changed files inside a directory artifact.
pub fn directory_changes(input: &DirectoryInput, mode: InputMode) -> Result<FileChanges, InputError> {
  let mut changes = FileChanges::new();

  match mode {
    InputMode::Full => {
      if !input.file.is_dir() {
        return Ok(changes);
      }
      for entry in WalkDir::new(&input.file).sort_by_file_name() {
        let entry = entry.map_err(|source| InputError::Walk {
          path: input.file.clone(),
          source,
        })?;
        if !entry.file_type().is_file() {
          continue;
        }
        if let Some(relative) = relative_path(&input.file, entry.path()) {
          changes.insert(RelativeFile::new(&input.file, relative), FileStatus::New);
        }
      }
    }
    InputMode::Incremental => {
      for (path, status) in &input.changed_files {
        let Some(file_status) = file_status(*status) else {
          continue;
        };
        if path.is_dir() {
          continue;
        }
        match relative_path(&input.file, path) {
          Some(relative) => {
            changes.insert(RelativeFile::new(&input.file, relative), file_status);
          }
          None => debug!(path = ?path, dir = ?input.file, "changed file outside of its directory"),
        }
      }
    }
  }

  Ok(changes)
}

/// Changed entries inside a jar artifact.
///
/// # Panics
///
/// Panics if an incremental `REMOVED` jar has no cached copy: the jar is gone
/// and nothing records what it contained.
pub fn jar_changes(input: &JarInput, mode: InputMode, cache: &ZipCache) -> Result<FileChanges, InputError> {
  let entries_as = |status: FileStatus, entries: BTreeMap<String, EntryDigest>| -> FileChanges {
    entries
      .into_keys()
      .map(|name| (RelativeFile::new(&input.file, name), status))
      .collect()
  };

  let status = match mode {
    InputMode::Full => Status::Added,
    InputMode::Incremental => input.status,
  };

  match status {
    Status::Unchanged => Ok(FileChanges::new()),
    Status::Added => Ok(entries_as(FileStatus::New, read_entries(&input.file)?)),
    Status::Removed => cache.with_cached_copy(&input.file, |copy| {
      let Some(copy) = copy else {
        panic!(
          "jar '{}' was removed but the zip cache in '{}' has no copy of it (expected key '{}')",
          input.file.display(),
          cache.dir().display(),
          ZipCache::key(&input.file)
        );
      };
      Ok(entries_as(FileStatus::Removed, read_entries(copy)?))
    }),
    Status::Changed => {
      let previous = cache.with_cached_copy(&input.file, |copy| copy.map(read_entries).transpose())?;
      let current = read_entries(&input.file)?;
      match previous {
        Some(previous) => Ok(
          diff_entries(&previous, &current)
            .into_iter()
            .map(|(name, status)| (RelativeFile::new(&input.file, name), status))
            .collect(),
        ),
        None => {
          warn!(jar = ?input.file, "changed jar has no cached copy, treating every entry as new");
          Ok(entries_as(FileStatus::New, current))
        }
      }
    }
  }
}

/// The cache update to queue for a jar once its changes have been consumed.
pub fn cache_update_for(input: &JarInput, mode: InputMode) -> Option<CacheUpdate> {
  let status = match mode {
    InputMode::Full => Status::Added,
    InputMode::Incremental => input.status,
  };

  match status {
    Status::Added | Status::Changed => Some(CacheUpdate::Add(input.file.clone())),
    Status::Removed => Some(CacheUpdate::Remove(input.file.clone())),
    Status::Unchanged => None,
  }
}

/// Changes of one artifact, ready to hand to a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactChanges {
  pub name: String,
  pub location: PathBuf,
  pub format: Format,
  pub files: FileChanges,
  pub cache_update: Option<CacheUpdate>,
}

/// Compute changes for every artifact of `input`.
///
/// Artifacts are independent and computed in parallel; results keep the
/// input order, jars first.
pub fn collect_changes(
  input: &TransformInput,
  mode: InputMode,
  cache: &ZipCache,
) -> Result<Vec<ArtifactChanges>, InputError> {
  let jars = input
    .jars
    .par_iter()
    .map(|jar| {
      Ok(ArtifactChanges {
        name: jar.name.clone(),
        location: jar.file.clone(),
        format: Format::Jar,
        files: jar_changes(jar, mode, cache)?,
        cache_update: cache_update_for(jar, mode),
      })
    })
    .collect::<Result<Vec<_>, InputError>>()?;

  let directories = input
    .directories
    .par_iter()
    .map(|dir| {
      Ok(ArtifactChanges {
        name: dir.name.clone(),
        location: dir.file.clone(),
        format: Format::Directory,
        files: directory_changes(dir, mode)?,
        cache_update: None,
      })
    })
    .collect::<Result<Vec<_>, InputError>>()?;

  Ok(jars.into_iter().chain(directories).collect())
}

/// `path` relative to `base`, `/`-separated.
fn relative_path(base: &Path, path: &Path) -> Option<String> {
  let relative = path.strip_prefix(base).ok()?;
  let parts: Vec<String> = relative
    .components()
    .map(|component| match component {
      Component::Normal(part) => Some(part.to_string_lossy().to_string()),
      _ => None,
    })
    .collect::<Option<Vec<_>>>()?;
  if parts.is_empty() { None } else { Some(parts.join("/")) }
}
