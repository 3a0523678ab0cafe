//! Implementation of the `xform changes` command.
//!
//! Compares the jars under a directory with their copies in the zip cache
//! and prints the per-entry changes. Jars without a cached copy are new;
//! cached jars that disappeared are reported removed from their cached copy.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::debug;
use walkdir::WalkDir;

use xform_lib::classify::{ContentType, Scope};
use xform_lib::consts::JAR_EXTENSION;
use xform_lib::incremental::{ArtifactChanges, InputMode, ZipCache, collect_changes};
use xform_lib::platform::paths::zip_cache_dir;
use xform_lib::stream::{JarInput, Status, TransformInput};

use crate::output::{OutputFormat, print_file_change, print_info, print_json, print_success, print_warning};

pub fn cmd_changes(root: &Path, cache: Option<PathBuf>, full: bool, commit: bool, format: OutputFormat) -> Result<()> {
  let root = fs::canonicalize(root).with_context(|| format!("Failed to resolve {}", root.display()))?;
  let cache_dir = cache.unwrap_or_else(zip_cache_dir);
  let cache = ZipCache::open(cache_dir.clone())
    .with_context(|| format!("Failed to open zip cache {}", cache_dir.display()))?;

  debug!(root = ?root, cache = ?cache.dir(), full, "computing jar changes");

  let mode = if full { InputMode::Full } else { InputMode::Incremental };
  let input = jar_inputs(&root, &cache, mode)?;
  let changes = collect_changes(&input, mode, &cache).context("Failed to compute changes")?;

  if format.is_json() {
    let artifacts: Vec<_> = changes
      .iter()
      .map(|artifact| {
        let files: Vec<_> = artifact
          .files
          .iter()
          .map(|(file, status)| json!({ "path": file.relative, "status": status }))
          .collect();
        json!({ "name": artifact.name, "location": artifact.location, "files": files })
      })
      .collect();
    print_json(&json!({ "root": root, "mode": mode_name(mode), "artifacts": artifacts }))?;
  } else {
    print_changes(&root, mode, &changes, commit);
  }

  if commit {
    let updates: Vec<_> = changes.iter().filter_map(|artifact| artifact.cache_update.clone()).collect();
    let applied = cache.apply(updates).context("Failed to update zip cache")?;
    if !format.is_json() {
      print_success(&format!("Applied {} cache update(s) to {}", applied, cache.dir().display()));
    }
  }

  Ok(())
}

/// Jars under `root` with their status against the cache.
fn jar_inputs(root: &Path, cache: &ZipCache, mode: InputMode) -> Result<TransformInput> {
  let present = collect_jars(root)?;

  let mut jars: Vec<JarInput> = present
    .iter()
    .map(|jar| {
      let status = if cache.contains(jar) { Status::Changed } else { Status::Added };
      jar_input(jar, status)
    })
    .collect();

  if mode == InputMode::Incremental {
    for stale in cache.stale_jars(root, &present) {
      jars.push(jar_input(&stale, Status::Removed));
    }
  }

  Ok(TransformInput {
    jars,
    directories: Vec::new(),
  })
}

fn jar_input(jar: &Path, status: Status) -> JarInput {
  JarInput {
    name: jar
      .file_name()
      .map(|name| name.to_string_lossy().to_string())
      .unwrap_or_default(),
    file: jar.to_path_buf(),
    status,
    content_types: [ContentType::Classes].into_iter().collect(),
    scopes: [Scope::ExternalLibraries].into_iter().collect(),
  }
}

/// Every jar file under `root`, in walk order.
fn collect_jars(root: &Path) -> Result<Vec<PathBuf>> {
  let mut jars = Vec::new();
  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
    if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == JAR_EXTENSION) {
      jars.push(entry.into_path());
    }
  }
  Ok(jars)
}

fn print_changes(root: &Path, mode: InputMode, changes: &[ArtifactChanges], commit: bool) {
  if changes.is_empty() {
    print_info(&format!("No jars under {}", root.display()));
    return;
  }

  print_info(&format!("{} jar(s) under {} ({})", changes.len(), root.display(), mode_name(mode)));
  for artifact in changes {
    if artifact.files.is_empty() {
      println!("  {} (unchanged)", artifact.name);
      continue;
    }
    println!("  {} ({} change(s))", artifact.name, artifact.files.len());
    for (file, status) in &artifact.files {
      print_file_change(*status, &file.relative);
    }
  }

  let pending = changes.iter().filter(|artifact| artifact.cache_update.is_some()).count();
  if pending > 0 && !commit {
    print_warning(&format!("{} cache update(s) pending; rerun with --commit to apply", pending));
  }
}

fn mode_name(mode: InputMode) -> &'static str {
  match mode {
    InputMode::Full => "full",
    InputMode::Incremental => "incremental",
  }
}
