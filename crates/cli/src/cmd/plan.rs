//! Implementation of the `xform plan` command.
//!
//! Loads a pipeline definition, registers every transform, and prints what
//! each one consumes, references and produces, followed by the execution
//! waves and the streams left at the end of the pipeline.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

use xform_lib::classify::describe;
use xform_lib::definition::PipelineDefinition;
use xform_lib::stream::Stream;
use xform_lib::transform::{LoggingReporter, RegisteredTransform};

use crate::output::{OutputFormat, print_error, print_info, print_json, print_stat, print_success, symbols};

pub fn cmd_plan(path: &Path, format: OutputFormat) -> Result<()> {
  let definition = PipelineDefinition::load(path).with_context(|| format!("Failed to load {}", path.display()))?;
  let mut manager = definition.manager_with(LoggingReporter);
  let outcomes = definition
    .register(&mut manager)
    .context("Failed to register pipeline streams")?;

  let graph = manager.dependency_graph().context("Failed to build dependency graph")?;
  let waves = graph.waves()?;
  let failures: Vec<String> = outcomes
    .iter()
    .filter_map(|outcome| outcome.as_ref().err().map(ToString::to_string))
    .collect();

  if format.is_json() {
    let transforms: Vec<Value> = manager.registrations().iter().map(transform_json).collect();
    let waves: Vec<Vec<String>> = waves
      .iter()
      .map(|wave| {
        wave
          .iter()
          .filter_map(|id| manager.registration(*id))
          .map(|registered| registered.task_name.clone())
          .collect()
      })
      .collect();
    let remaining: Vec<Value> = manager.streams().iter().map(stream_json).collect();
    print_json(&json!({
      "variant": manager.variant(),
      "transforms": transforms,
      "waves": waves,
      "errors": failures,
      "pipeline_output": remaining,
    }))?;
  } else {
    print_info(&format!("Variant: {}", manager.variant()));
    for registered in manager.registrations() {
      println!();
      print_success(&format!("{} ({})", registered.task_name, registered.id));
      for input in &registered.inputs {
        print_stat("consumes", &stream_line(input));
      }
      for referenced in &registered.referenced {
        print_stat("references", &stream_line(referenced));
      }
      print_stat("produces", &stream_line(&registered.output));
    }

    if !waves.is_empty() {
      println!();
      println!("Waves:");
      for (index, wave) in waves.iter().enumerate() {
        let names: Vec<&str> = wave
          .iter()
          .filter_map(|id| manager.registration(*id))
          .map(|registered| registered.task_name.as_str())
          .collect();
        println!("  {} {}", index, names.join(", "));
      }
    }

    println!();
    println!("Pipeline output:");
    for stream in manager.streams() {
      println!("  {} {}", symbols::INFO, stream_line(stream));
    }

    for failure in &failures {
      print_error(failure);
    }
  }

  if !failures.is_empty() {
    bail!("{} transform(s) could not be registered", failures.len());
  }
  Ok(())
}

fn stream_line(stream: &Stream) -> String {
  let locations: Vec<String> = stream
    .locations()
    .iter()
    .map(|location| location.display().to_string())
    .collect();
  if locations.is_empty() {
    stream.to_string()
  } else {
    format!("{} {} {}", stream, symbols::ARROW, locations.join(", "))
  }
}

fn stream_json(stream: &Stream) -> Value {
  json!({
    "id": stream.id().to_string(),
    "name": stream.name(),
    "content_types": describe(stream.content_types()),
    "scopes": describe(stream.scopes()),
    "producer": stream.producer().map(|id| id.to_string()),
    "locations": stream.locations(),
  })
}

fn transform_json(registered: &RegisteredTransform) -> Value {
  json!({
    "id": registered.id.to_string(),
    "name": registered.name(),
    "task": registered.task_name,
    "inputs": registered.inputs.iter().map(stream_json).collect::<Vec<_>>(),
    "referenced": registered.referenced.iter().map(stream_json).collect::<Vec<_>>(),
    "output": stream_json(&registered.output),
    "depends_on": registered.upstream().iter().map(ToString::to_string).collect::<Vec<_>>(),
  })
}
