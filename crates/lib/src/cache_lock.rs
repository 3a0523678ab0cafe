//! Advisory locking of a zip cache directory.
//!
//! Builds sharing one cache serialize index writes through an exclusive lock
//! on `<cache>/.lock`. Opening a cache holds a shared lock while the index is
//! read, so a reader never observes a batch of updates half applied.
//!
//! Contended locks are retried until a deadline rather than failing at once;
//! a concurrent build usually finishes its batch within milliseconds.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

const LOCK_FILE: &str = ".lock";
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// How long [`CacheLock::acquire`] waits for a busy cache.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  /// Index readers; any number may hold it at once.
  Shared,
  /// The single writer applying a batch of updates.
  Exclusive,
}

/// Who holds the exclusive lock, recorded in the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
  pub pid: u32,
  pub operation: String,
  pub acquired_at_unix: u64,
}

impl std::fmt::Display for LockHolder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "'{}' (PID {})", self.operation, self.pid)
  }
}

#[derive(Debug, Error)]
pub enum CacheLockError {
  #[error("zip cache '{dir}' is busy: held by {holder} for longer than {waited:?}")]
  Busy {
    dir: PathBuf,
    holder: String,
    waited: Duration,
  },

  #[error("failed to open cache lock '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to lock '{path}': {source}")]
  Lock {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to record lock holder in '{path}': {source}")]
  RecordHolder {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A held lock on a cache directory; released when dropped.
///
/// The directory must already exist.
#[derive(Debug)]
pub struct CacheLock {
  file: File,
  path: PathBuf,
  mode: LockMode,
}

impl CacheLock {
  /// Lock `dir`, waiting up to [`DEFAULT_WAIT`] for other builds.
  pub fn acquire(dir: &Path, mode: LockMode, operation: &str) -> Result<Self, CacheLockError> {
    Self::acquire_within(dir, mode, operation, DEFAULT_WAIT)
  }

  /// Lock `dir`, giving up with [`CacheLockError::Busy`] after `wait`.
  pub fn acquire_within(
    dir: &Path,
    mode: LockMode,
    operation: &str,
    wait: Duration,
  ) -> Result<Self, CacheLockError> {
    let path = dir.join(LOCK_FILE);
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&path)
      .map_err(|source| CacheLockError::Open {
        path: path.clone(),
        source,
      })?;

    let started = Instant::now();
    loop {
      match try_lock(&file, mode) {
        Ok(()) => break,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
          let waited = started.elapsed();
          if waited >= wait {
            return Err(CacheLockError::Busy {
              dir: dir.to_path_buf(),
              holder: describe_holder(&path),
              waited,
            });
          }
          trace!(lock = ?path, ?mode, operation, "zip cache busy, retrying");
          thread::sleep(RETRY_INTERVAL);
        }
        Err(source) => return Err(CacheLockError::Lock { path, source }),
      }
    }

    let lock = CacheLock { file, path, mode };
    if mode == LockMode::Exclusive {
      lock.record_holder(operation)?;
    }
    debug!(lock = ?lock.path, ?mode, operation, "acquired zip cache lock");
    Ok(lock)
  }

  pub fn mode(&self) -> LockMode {
    self.mode
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// The holder recorded in the lock file, read through this handle.
  pub fn holder(&self) -> io::Result<LockHolder> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  fn record_holder(&self, operation: &str) -> Result<(), CacheLockError> {
    let holder = LockHolder {
      pid: std::process::id(),
      operation: operation.to_string(),
      acquired_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default(),
    };
    let content = serde_json::to_vec(&holder).map_err(io::Error::other);

    let mut file = &self.file;
    content
      .and_then(|content| {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&content)?;
        file.flush()
      })
      .map_err(|source| CacheLockError::RecordHolder {
        path: self.path.clone(),
        source,
      })
  }
}

impl Drop for CacheLock {
  fn drop(&mut self) {
    // Clear the holder before the handle closes and releases the lock.
    if self.mode == LockMode::Exclusive {
      let _ = self.file.set_len(0);
    }
  }
}

fn describe_holder(path: &Path) -> String {
  let mut contents = String::new();
  let recorded = File::open(path)
    .and_then(|mut file| file.read_to_string(&mut contents))
    .ok()
    .and_then(|_| serde_json::from_str::<LockHolder>(&contents).ok());
  match recorded {
    Some(holder) => holder.to_string(),
    None => "another build".to_string(),
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };
  flock(file, operation).map_err(io::Error::from)
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};
  use windows_sys::Win32::System::IO::OVERLAPPED;

  let mut flags = LOCKFILE_FAIL_IMMEDIATELY;
  if mode == LockMode::Exclusive {
    flags |= LOCKFILE_EXCLUSIVE_LOCK;
  }

  // SAFETY: the handle is owned by `file` and open for the whole call, and a
  // zeroed OVERLAPPED locks from offset 0.
  let locked = unsafe {
    let mut overlapped: OVERLAPPED = std::mem::zeroed();
    LockFileEx(file.as_raw_handle() as HANDLE, flags, 0, 1, 0, &mut overlapped)
  };
  if locked != 0 {
    return Ok(());
  }

  let err = io::Error::last_os_error();
  if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
    Err(io::Error::from(io::ErrorKind::WouldBlock))
  } else {
    Err(err)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn exclusive_lock_records_holder() {
    let temp = TempDir::new().unwrap();
    let lock = CacheLock::acquire(temp.path(), LockMode::Exclusive, "apply zip cache updates").unwrap();

    let holder = lock.holder().unwrap();
    assert_eq!(holder.pid, std::process::id());
    assert_eq!(holder.operation, "apply zip cache updates");
    assert_eq!(lock.path(), temp.path().join(LOCK_FILE));
    assert_eq!(lock.mode(), LockMode::Exclusive);
  }

  #[test]
  fn holder_is_cleared_on_release() {
    let temp = TempDir::new().unwrap();
    drop(CacheLock::acquire(temp.path(), LockMode::Exclusive, "first").unwrap());
    assert_eq!(std::fs::read(temp.path().join(LOCK_FILE)).unwrap(), b"");

    CacheLock::acquire(temp.path(), LockMode::Exclusive, "second").unwrap();
  }

  #[test]
  fn missing_dir_is_an_open_error() {
    let temp = TempDir::new().unwrap();
    let result = CacheLock::acquire(&temp.path().join("missing"), LockMode::Shared, "read index");
    assert!(matches!(result, Err(CacheLockError::Open { .. })));
  }

  #[test]
  #[cfg(unix)]
  fn readers_share_the_lock() {
    let temp = TempDir::new().unwrap();
    let _first = CacheLock::acquire(temp.path(), LockMode::Shared, "read index").unwrap();
    let _second = CacheLock::acquire_within(temp.path(), LockMode::Shared, "read index", Duration::ZERO).unwrap();
  }

  #[test]
  #[cfg(unix)]
  fn writer_waits_for_readers() {
    let temp = TempDir::new().unwrap();
    let _reader = CacheLock::acquire(temp.path(), LockMode::Shared, "read index").unwrap();

    match CacheLock::acquire_within(temp.path(), LockMode::Exclusive, "apply", Duration::ZERO) {
      Err(CacheLockError::Busy { holder, .. }) => assert_eq!(holder, "another build"),
      other => panic!("expected a busy cache, got {:?}", other.map(|lock| lock.path().to_path_buf())),
    }
  }

  #[test]
  #[cfg(unix)]
  fn busy_error_names_the_writer() {
    let temp = TempDir::new().unwrap();
    let _held = CacheLock::acquire(temp.path(), LockMode::Exclusive, "first build").unwrap();

    let err = CacheLock::acquire_within(temp.path(), LockMode::Shared, "read index", Duration::from_millis(60))
      .unwrap_err();
    match &err {
      CacheLockError::Busy { holder, waited, .. } => {
        assert!(holder.contains("first build"));
        assert!(*waited >= Duration::from_millis(60));
      }
      other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("is busy"));
  }

  #[test]
  #[cfg(unix)]
  fn waiting_writer_gets_the_lock_once_released() {
    let temp = TempDir::new().unwrap();
    let held = CacheLock::acquire(temp.path(), LockMode::Exclusive, "first build").unwrap();

    let dir = temp.path().to_path_buf();
    let waiter = thread::spawn(move || {
      CacheLock::acquire_within(&dir, LockMode::Exclusive, "second build", Duration::from_secs(10))
        .map(|lock| lock.holder().unwrap().operation)
    });
    thread::sleep(Duration::from_millis(50));
    drop(held);

    assert_eq!(waiter.join().unwrap().unwrap(), "second build");
  }
}
