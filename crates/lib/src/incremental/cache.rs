//! Cache of jar contents from the previous build.
//!
//! Diffing a changed jar, or listing a removed one, needs the jar as it was
//! last seen. The cache keeps a copy of every jar it was told about.
//!
//! # Layout
//!
//! ```text
//! <cache>/
//! ├── index.json           # jar path → cached copy name
//! ├── .lock                # shared while the index is read, exclusive while updated
//! └── <hash(path)[:16]>.jar
//! ```
//!
//! Input computation only reads the cache. Callers collect [`CacheUpdate`]s
//! and apply them once the transform has committed to its run.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache_lock::{CacheLock, CacheLockError, LockMode};
use crate::consts::{CACHE_KEY_LEN, JAR_EXTENSION, ZIP_CACHE_INDEX, ZIP_CACHE_INDEX_VERSION};
use crate::util::hash::hash_bytes;

/// Errors that can occur while reading or updating the zip cache.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to create cache directory '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read cache index '{path}': {source}")]
  ReadIndex {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse cache index '{path}': {source}")]
  ParseIndex {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported cache index version {0}")]
  UnsupportedVersion(u32),

  #[error("failed to write cache index '{path}': {source}")]
  WriteIndex {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to copy '{from}' into the cache at '{to}': {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove cached copy '{path}': {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Lock(#[from] CacheLockError),
}

/// A deferred change to the cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheUpdate {
  /// Copy the jar's current contents into the cache.
  Add(PathBuf),
  /// Drop the cached copy of a jar that no longer exists.
  Remove(PathBuf),
}

impl CacheUpdate {
  pub fn jar(&self) -> &Path {
    match self {
      CacheUpdate::Add(jar) | CacheUpdate::Remove(jar) => jar,
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheIndex {
  version: u32,
  entries: BTreeMap<PathBuf, String>,
}

impl Default for CacheIndex {
  fn default() -> Self {
    Self {
      version: ZIP_CACHE_INDEX_VERSION,
      entries: BTreeMap::new(),
    }
  }
}

/// Copies of previously seen jars, keyed by jar path.
///
/// Reads and updates of the same jar are serialized through a per-jar lock;
/// independent jars never block each other.
#[derive(Debug)]
pub struct ZipCache {
  dir: PathBuf,
  index: RwLock<CacheIndex>,
  jar_locks: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
  apply_guard: Mutex<()>,
}

impl ZipCache {
  /// Open the cache at `dir`, loading its index if one exists.
  ///
  /// The directory is only created once updates are applied.
  pub fn open(dir: PathBuf) -> Result<Self, CacheError> {
    let index = if dir.is_dir() {
      let _lock = CacheLock::acquire(&dir, LockMode::Shared, "read zip cache index")?;
      load_index(&dir)?
    } else {
      CacheIndex::default()
    };
    debug!(dir = ?dir, entries = index.entries.len(), "opened zip cache");
    Ok(Self {
      dir,
      index: RwLock::new(index),
      jar_locks: Mutex::new(HashMap::new()),
      apply_guard: Mutex::new(()),
    })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// File name of the cached copy for `jar`.
  pub fn key(jar: &Path) -> String {
    let hash = hash_bytes(jar.to_string_lossy().as_bytes());
    format!("{}.{}", hash.prefix(CACHE_KEY_LEN), JAR_EXTENSION)
  }

  pub fn contains(&self, jar: &Path) -> bool {
    self.read_index().entries.contains_key(jar)
  }

  /// Every jar with a cached copy, sorted.
  pub fn cached_jars(&self) -> Vec<PathBuf> {
    self.read_index().entries.keys().cloned().collect()
  }

  /// Cached jars under `root` that are not in `present`.
  ///
  /// These are jars that existed in the previous build and are gone now.
  pub fn stale_jars(&self, root: &Path, present: &[PathBuf]) -> Vec<PathBuf> {
    let present: BTreeSet<&Path> = present.iter().map(PathBuf::as_path).collect();
    self
      .read_index()
      .entries
      .keys()
      .filter(|jar| jar.starts_with(root) && !present.contains(jar.as_path()))
      .cloned()
      .collect()
  }

  /// Run `f` with the cached copy of `jar`, if any.
  ///
  /// Updates to the same jar wait until `f` returns.
  pub fn with_cached_copy<R>(&self, jar: &Path, f: impl FnOnce(Option<&Path>) -> R) -> R {
    let lock = self.jar_lock(jar);
    let _guard = lock.read().unwrap_or_else(PoisonError::into_inner);

    let copy = self
      .read_index()
      .entries
      .get(jar)
      .map(|name| self.dir.join(name))
      .filter(|copy| copy.is_file());
    f(copy.as_deref())
  }

  /// Apply queued updates and persist the index.
  ///
  /// The index is reloaded under the exclusive lock first, so entries written
  /// by other builds since [`ZipCache::open`] are kept. Updates stop at the
  /// first failure; the ones already applied are still persisted before the
  /// error is returned.
  ///
  /// Returns the number of updates applied.
  pub fn apply(&self, updates: impl IntoIterator<Item = CacheUpdate>) -> Result<usize, CacheError> {
    let updates: Vec<CacheUpdate> = updates.into_iter().collect();
    if updates.is_empty() {
      return Ok(0);
    }

    let _serial = self.apply_guard.lock().unwrap_or_else(PoisonError::into_inner);
    fs::create_dir_all(&self.dir).map_err(|source| CacheError::CreateDir {
      path: self.dir.clone(),
      source,
    })?;
    let _lock = CacheLock::acquire(&self.dir, LockMode::Exclusive, "apply zip cache updates")?;
    *self.write_index() = load_index(&self.dir)?;

    let mut applied = 0;
    let mut failure = None;
    for update in &updates {
      let lock = self.jar_lock(update.jar());
      let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);

      let result = match update {
        CacheUpdate::Add(jar) => self.store_copy(jar),
        CacheUpdate::Remove(jar) => self.drop_copy(jar),
      };
      if let Err(err) = result {
        failure = Some(err);
        break;
      }
      applied += 1;
    }

    self.save_index()?;
    if let Some(err) = failure {
      warn!(dir = ?self.dir, applied, total = updates.len(), error = %err, "zip cache update failed");
      return Err(err);
    }
    info!(dir = ?self.dir, updates = applied, "applied zip cache updates");
    Ok(applied)
  }

  fn store_copy(&self, jar: &Path) -> Result<(), CacheError> {
    let name = Self::key(jar);
    let target = self.dir.join(&name);
    let temp = self.dir.join(format!("{}.tmp", name));

    fs::copy(jar, &temp)
      .and_then(|_| fs::rename(&temp, &target))
      .map_err(|source| CacheError::Copy {
        from: jar.to_path_buf(),
        to: target.clone(),
        source,
      })?;

    debug!(jar = ?jar, copy = ?target, "cached jar");
    self.write_index().entries.insert(jar.to_path_buf(), name);
    Ok(())
  }

  fn drop_copy(&self, jar: &Path) -> Result<(), CacheError> {
    let Some(name) = self.write_index().entries.remove(jar) else {
      return Ok(());
    };

    let copy = self.dir.join(name);
    match fs::remove_file(&copy) {
      Ok(()) => {
        debug!(jar = ?jar, "dropped cached jar");
        Ok(())
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(CacheError::Remove { path: copy, source }),
    }
  }

  /// Write the index atomically (temp file, then rename).
  fn save_index(&self) -> Result<(), CacheError> {
    let path = self.dir.join(ZIP_CACHE_INDEX);
    let temp_path = self.dir.join(format!("{}.tmp", ZIP_CACHE_INDEX));

    let content = {
      let index = self.read_index();
      serde_json::to_string_pretty(&*index).map_err(|e| CacheError::WriteIndex {
        path: path.clone(),
        source: io::Error::other(e),
      })?
    };
    fs::write(&temp_path, &content)
      .and_then(|_| fs::rename(&temp_path, &path))
      .map_err(|source| CacheError::WriteIndex { path, source })
  }

  fn jar_lock(&self, jar: &Path) -> Arc<RwLock<()>> {
    let mut locks = self.jar_locks.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(jar.to_path_buf()).or_default())
  }

  fn read_index(&self) -> std::sync::RwLockReadGuard<'_, CacheIndex> {
    self.index.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write_index(&self) -> std::sync::RwLockWriteGuard<'_, CacheIndex> {
    self.index.write().unwrap_or_else(PoisonError::into_inner)
  }
}

fn load_index(dir: &Path) -> Result<CacheIndex, CacheError> {
  let path = dir.join(ZIP_CACHE_INDEX);

  let content = match fs::read_to_string(&path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheIndex::default()),
    Err(source) => return Err(CacheError::ReadIndex { path, source }),
  };

  let index: CacheIndex =
    serde_json::from_str(&content).map_err(|source| CacheError::ParseIndex { path, source })?;

  if index.version != ZIP_CACHE_INDEX_VERSION {
    return Err(CacheError::UnsupportedVersion(index.version));
  }

  Ok(index)
}
