//! Implementation of the `xform inspect` command.
//!
//! Lists every artifact under an output root with the classification decoded
//! from its path.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use xform_lib::classify::{Classification, ContentType, LAYOUT_VERSION, Scope, describe};
use xform_lib::stream::{Format, IntermediateFolder};

use crate::output::{OutputFormat, print_info, print_json, symbols};

pub fn cmd_inspect(root: &Path, format: OutputFormat) -> Result<()> {
  let folder = IntermediateFolder::new(
    root.to_path_buf(),
    ContentType::known().iter().copied().collect(),
    Scope::known().iter().copied().collect(),
  );
  let artifacts = folder
    .artifacts()
    .with_context(|| format!("Failed to list artifacts under {}", root.display()))?;

  if format.is_json() {
    let items: Vec<_> = artifacts
      .iter()
      .map(|artifact| {
        json!({
          "name": artifact.name,
          "path": artifact.path,
          "format": format_name(artifact.format),
          "content_types": describe(&artifact.content_types),
          "scopes": describe(&artifact.scopes),
        })
      })
      .collect();
    return print_json(&json!({ "root": root, "layout_version": LAYOUT_VERSION, "artifacts": items }));
  }

  if artifacts.is_empty() {
    print_info(&format!("No artifacts under {}", root.display()));
    return Ok(());
  }

  print_info(&format!("{} artifact(s) under {}", artifacts.len(), root.display()));
  for artifact in &artifacts {
    println!(
      "  {} {:<9} {} {} {}",
      symbols::INFO,
      format_name(artifact.format),
      artifact.name,
      describe(&artifact.content_types),
      describe(&artifact.scopes)
    );
  }

  Ok(())
}

fn format_name(format: Format) -> &'static str {
  match format {
    Format::Directory => "directory",
    Format::Jar => "jar",
  }
}
