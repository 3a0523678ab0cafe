//! Reading and diffing jar central directories.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use zip::ZipArchive;

use crate::stream::InputError;

use super::FileStatus;

/// What identifies an entry's content without inflating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryDigest {
  pub crc32: u32,
  pub size: u64,
}

/// File entries of a jar, keyed by entry name. Directory entries are skipped.
pub fn read_entries(path: &Path) -> Result<BTreeMap<String, EntryDigest>, InputError> {
  let file = File::open(path).map_err(|source| InputError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let zip_err = |source| InputError::Zip {
    path: path.to_path_buf(),
    source,
  };
  let mut archive = ZipArchive::new(BufReader::new(file)).map_err(zip_err)?;

  let mut entries = BTreeMap::new();
  for i in 0..archive.len() {
    let entry = archive.by_index_raw(i).map_err(zip_err)?;
    if entry.is_dir() {
      continue;
    }
    entries.insert(
      entry.name().to_string(),
      EntryDigest {
        crc32: entry.crc32(),
        size: entry.size(),
      },
    );
  }

  Ok(entries)
}

/// Per-entry changes going from `old` to `new`.
pub fn diff_entries(
  old: &BTreeMap<String, EntryDigest>,
  new: &BTreeMap<String, EntryDigest>,
) -> BTreeMap<String, FileStatus> {
  let mut changes = BTreeMap::new();

  for (name, digest) in new {
    match old.get(name) {
      None => {
        changes.insert(name.clone(), FileStatus::New);
      }
      Some(previous) if previous != digest => {
        changes.insert(name.clone(), FileStatus::Changed);
      }
      Some(_) => {}
    }
  }

  for name in old.keys() {
    if !new.contains_key(name) {
      changes.insert(name.clone(), FileStatus::Removed);
    }
  }

  changes
}
