//! CLI smoke tests for xform.
//!
//! These tests run the binary against scratch pipelines, output roots and
//! jars, and check exit codes and the key lines of the output.

use std::fs;
use std::io::Write;
use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Get a Command for the xform binary.
fn xform_cmd(temp: &TempDir) -> Command {
  let mut cmd = cargo_bin_cmd!("xform");
  cmd
    .env("XFORM_BUILD_DIR", temp.path().join("build"))
    .env_remove("XFORM_ZIP_CACHE")
    .env_remove("XFORM_VARIANT")
    .env_remove("RUST_LOG");
  cmd
}

fn write_definition(temp: &TempDir, content: &str) -> std::path::PathBuf {
  fs::create_dir_all(temp.path().join("classes")).unwrap();
  let path = temp.path().join("pipeline.json");
  fs::write(&path, content).unwrap();
  path
}

fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
  let file = fs::File::create(path).unwrap();
  let mut writer = zip::ZipWriter::new(file);
  for (name, content) in entries {
    writer.start_file(*name, SimpleFileOptions::default()).unwrap();
    writer.write_all(content).unwrap();
  }
  writer.finish().unwrap();
}

const PIPELINE: &str = r#"{
  "streams": [
    { "name": "app", "content_types": ["CLASSES", "RESOURCES"], "scopes": ["PROJECT"], "directories": ["classes"] }
  ],
  "transforms": [
    { "name": "dex", "input_types": ["CLASSES"], "scopes": ["PROJECT"], "output_types": ["DEX"] },
    { "name": "merge", "input_types": ["DEX", "RESOURCES"], "scopes": ["PROJECT"] }
  ]
}"#;

const BROKEN_PIPELINE: &str = r#"{
  "streams": [
    { "name": "app", "content_types": ["CLASSES"], "scopes": ["PROJECT"] }
  ],
  "transforms": [
    { "name": "res", "input_types": ["RESOURCES"], "scopes": ["PROJECT"] }
  ]
}"#;

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  let temp = TempDir::new().unwrap();
  xform_cmd(&temp)
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  let temp = TempDir::new().unwrap();
  xform_cmd(&temp)
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("xform"));
}

#[test]
fn subcommand_help_works() {
  let temp = TempDir::new().unwrap();
  for cmd in &["plan", "inspect", "changes"] {
    xform_cmd(&temp)
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// plan
// =============================================================================

#[test]
#[serial]
fn plan_prints_task_names_and_output() {
  let temp = TempDir::new().unwrap();
  let definition = write_definition(&temp, PIPELINE);

  xform_cmd(&temp)
    .arg("plan")
    .arg(&definition)
    .assert()
    .success()
    .stdout(predicate::str::contains("transformClassesWithDexForDebug"))
    .stdout(predicate::str::contains("transformResourcesAndDexWithMergeForDebug"))
    .stdout(predicate::str::contains("Pipeline output"));
}

#[test]
#[serial]
fn plan_json_lists_transforms_and_waves() {
  let temp = TempDir::new().unwrap();
  let definition = write_definition(&temp, PIPELINE);

  let output = xform_cmd(&temp)
    .args(["--output", "json", "plan"])
    .arg(&definition)
    .env("XFORM_VARIANT", "release")
    .output()
    .unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["variant"], "release");
  assert_eq!(json["transforms"].as_array().unwrap().len(), 2);
  assert_eq!(json["waves"].as_array().unwrap().len(), 2);
  assert_eq!(json["transforms"][1]["depends_on"][0], "t0");
  assert_eq!(json["pipeline_output"].as_array().unwrap().len(), 1);
}

#[test]
#[serial]
fn plan_fails_when_streams_are_missing() {
  let temp = TempDir::new().unwrap();
  let definition = write_definition(&temp, BROKEN_PIPELINE);

  xform_cmd(&temp)
    .arg("plan")
    .arg(&definition)
    .assert()
    .failure()
    .stderr(predicate::str::contains("requested streams not available"));
}

#[test]
#[serial]
fn plan_nonexistent_definition_fails() {
  let temp = TempDir::new().unwrap();

  xform_cmd(&temp)
    .arg("plan")
    .arg("/nonexistent/path/pipeline.json")
    .assert()
    .failure();
}

// =============================================================================
// inspect
// =============================================================================

#[test]
#[serial]
fn inspect_lists_decoded_artifacts() {
  let temp = TempDir::new().unwrap();
  let root = temp.path().join("out");
  fs::create_dir_all(root.join("folders/1/1/main")).unwrap();
  fs::create_dir_all(root.join("jars/2/10")).unwrap();
  fs::write(root.join("jars/2/10/lib.jar"), b"").unwrap();
  fs::create_dir_all(root.join("folders/legacy/1/ignored")).unwrap();

  xform_cmd(&temp)
    .arg("inspect")
    .arg(&root)
    .assert()
    .success()
    .stdout(predicate::str::contains("2 artifact(s)"))
    .stdout(predicate::str::contains("main [CLASSES] [PROJECT]"))
    .stdout(predicate::str::contains("lib [RESOURCES] [EXTERNAL_LIBRARIES]"))
    .stdout(predicate::str::contains("ignored").not());
}

#[test]
#[serial]
fn inspect_empty_root() {
  let temp = TempDir::new().unwrap();

  xform_cmd(&temp)
    .arg("inspect")
    .arg(temp.path().join("missing"))
    .assert()
    .success()
    .stdout(predicate::str::contains("No artifacts"));
}

// =============================================================================
// changes
// =============================================================================

#[test]
#[serial]
fn changes_track_jars_across_runs() {
  let temp = TempDir::new().unwrap();
  let libs = temp.path().join("libs");
  let cache = temp.path().join("cache");
  fs::create_dir_all(&libs).unwrap();
  let jar = libs.join("lib-1.0.jar");
  write_jar(&jar, &[("A.class", b"a"), ("B.class", b"b")]);

  xform_cmd(&temp)
    .arg("changes")
    .arg(&libs)
    .arg("--cache")
    .arg(&cache)
    .arg("--commit")
    .assert()
    .success()
    .stdout(predicate::str::contains("+ A.class"))
    .stdout(predicate::str::contains("Applied 1 cache update(s)"));

  write_jar(&jar, &[("A.class", b"a2"), ("B.class", b"b")]);
  xform_cmd(&temp)
    .arg("changes")
    .arg(&libs)
    .arg("--cache")
    .arg(&cache)
    .arg("--commit")
    .assert()
    .success()
    .stdout(predicate::str::contains("~ A.class"))
    .stdout(predicate::str::contains("B.class").not());

  fs::remove_file(&jar).unwrap();
  xform_cmd(&temp)
    .arg("changes")
    .arg(&libs)
    .arg("--cache")
    .arg(&cache)
    .assert()
    .success()
    .stdout(predicate::str::contains("- A.class"))
    .stdout(predicate::str::contains("- B.class"));
}

#[test]
#[serial]
fn changes_full_mode_ignores_cache() {
  let temp = TempDir::new().unwrap();
  let libs = temp.path().join("libs");
  fs::create_dir_all(&libs).unwrap();
  write_jar(&libs.join("a.jar"), &[("A.class", b"a")]);

  xform_cmd(&temp)
    .args(["--output", "json", "changes"])
    .arg(&libs)
    .arg("--full")
    .assert()
    .success()
    .stdout(predicate::str::contains("\"status\": \"NEW\""))
    .stdout(predicate::str::contains("\"mode\": \"full\""));
}

#[test]
#[serial]
fn changes_walks_nested_directories_for_jars() {
  let temp = TempDir::new().unwrap();
  let libs = temp.path().join("libs");
  fs::create_dir_all(libs.join("nested/deeper")).unwrap();
  write_jar(&libs.join("nested/deeper/c.jar"), &[("C.class", b"c")]);
  write_jar(&libs.join("a.jar"), &[("A.class", b"a")]);
  write_jar(&libs.join("nested/b.jar"), &[("B.class", b"b")]);
  fs::write(libs.join("nested/notes.txt"), b"not a jar").unwrap();

  let output = xform_cmd(&temp)
    .args(["--output", "json", "changes"])
    .arg(&libs)
    .arg("--full")
    .output()
    .unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<&str> = json["artifacts"]
    .as_array()
    .unwrap()
    .iter()
    .map(|artifact| artifact["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, vec!["a.jar", "b.jar", "c.jar"]);
}
