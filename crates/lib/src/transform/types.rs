use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::{ContentType, ContentTypes, Scope, Scopes, describe};
use crate::stream::{Stream, TransformId};

fn default_incremental() -> bool {
  true
}

/// Declarative description of a build step.
///
/// `scopes` are consumed from the stream pool; `referenced_scopes` are only
/// read. An empty `scopes` set makes the transform a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformDescriptor {
  pub name: String,
  /// Groups transforms for validation exemptions (e.g. `"proguard"`).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
  pub input_types: ContentTypes,
  #[serde(default)]
  pub scopes: Scopes,
  #[serde(default)]
  pub referenced_scopes: Scopes,
  /// Defaults to `input_types` when empty.
  #[serde(default)]
  pub output_types: ContentTypes,
  #[serde(default = "default_incremental")]
  pub incremental: bool,
}

impl TransformDescriptor {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      kind: None,
      input_types: ContentTypes::new(),
      scopes: Scopes::new(),
      referenced_scopes: Scopes::new(),
      output_types: ContentTypes::new(),
      incremental: true,
    }
  }

  pub fn with_input_types(mut self, types: impl IntoIterator<Item = ContentType>) -> Self {
    self.input_types = types.into_iter().collect();
    self
  }

  pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
    self.scopes = scopes.into_iter().collect();
    self
  }

  pub fn with_referenced_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
    self.referenced_scopes = scopes.into_iter().collect();
    self
  }

  pub fn with_output_types(mut self, types: impl IntoIterator<Item = ContentType>) -> Self {
    self.output_types = types.into_iter().collect();
    self
  }

  pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
    self.kind = Some(kind.into());
    self
  }

  pub fn non_incremental(mut self) -> Self {
    self.incremental = false;
    self
  }

  pub fn kind(&self) -> Option<&str> {
    self.kind.as_deref()
  }

  /// The types the output stream carries.
  pub fn output_types(&self) -> &ContentTypes {
    if self.output_types.is_empty() {
      &self.input_types
    } else {
      &self.output_types
    }
  }

  pub fn is_no_op(&self) -> bool {
    self.scopes.is_empty()
  }
}

/// A recoverable configuration problem with one transform or stream.
///
/// The offending transform is skipped; registration of later transforms
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("transform '{transform}' (variant '{variant}'): custom content type {content_type} is not supported")]
  CustomContentType {
    transform: String,
    variant: String,
    content_type: ContentType,
  },

  #[error("transform '{transform}' (variant '{variant}'): no input content types declared")]
  NoInputTypes { transform: String, variant: String },

  #[error("transform '{transform}' (variant '{variant}'): PROVIDED_ONLY scope cannot be consumed")]
  ProvidedOnlyConsumed { transform: String, variant: String },

  #[error("transform '{transform}' (variant '{variant}'): TESTED_CODE scope cannot be consumed")]
  TestedCodeConsumed { transform: String, variant: String },

  #[error("transform '{transform}' (variant '{variant}'): scopes {overlap} are both consumed and referenced")]
  OverlappingScopes {
    transform: String,
    variant: String,
    overlap: String,
  },

  #[error(
    "transform '{transform}' (variant '{variant}'): requested streams not available (types {types}, scopes {scopes})"
  )]
  StreamsNotAvailable {
    transform: String,
    variant: String,
    types: String,
    scopes: String,
  },

  #[error("stream '{stream}' (variant '{variant}'): content types and scopes must be non-empty")]
  EmptyStream { stream: String, variant: String },
}

impl ConfigError {
  pub(crate) fn streams_not_available(descriptor: &TransformDescriptor, variant: &str) -> Self {
    let mut scopes = descriptor.scopes.clone();
    scopes.extend(descriptor.referenced_scopes.iter().copied());
    ConfigError::StreamsNotAvailable {
      transform: descriptor.name.clone(),
      variant: variant.to_string(),
      types: describe(&descriptor.input_types),
      scopes: describe(&scopes),
    }
  }

  /// The transform or stream the error is about.
  pub fn subject(&self) -> &str {
    match self {
      ConfigError::CustomContentType { transform, .. }
      | ConfigError::NoInputTypes { transform, .. }
      | ConfigError::ProvidedOnlyConsumed { transform, .. }
      | ConfigError::TestedCodeConsumed { transform, .. }
      | ConfigError::OverlappingScopes { transform, .. }
      | ConfigError::StreamsNotAvailable { transform, .. } => transform,
      ConfigError::EmptyStream { stream, .. } => stream,
    }
  }

  pub fn variant(&self) -> &str {
    match self {
      ConfigError::CustomContentType { variant, .. }
      | ConfigError::NoInputTypes { variant, .. }
      | ConfigError::ProvidedOnlyConsumed { variant, .. }
      | ConfigError::TestedCodeConsumed { variant, .. }
      | ConfigError::OverlappingScopes { variant, .. }
      | ConfigError::StreamsNotAvailable { variant, .. }
      | ConfigError::EmptyStream { variant, .. } => variant,
    }
  }
}

/// The outcome of adding a transform to the registry.
///
/// Carries everything an external scheduler needs to wire the transform:
/// which streams it consumes, which it only reads, and where it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTransform {
  pub id: TransformId,
  pub descriptor: TransformDescriptor,
  pub task_name: String,
  pub inputs: Vec<Stream>,
  pub referenced: Vec<Stream>,
  pub output: Stream,
}

impl RegisteredTransform {
  pub fn name(&self) -> &str {
    &self.descriptor.name
  }

  /// Transforms whose output this one reads, consumed or referenced.
  pub fn upstream(&self) -> Vec<TransformId> {
    let mut producers: Vec<TransformId> = self
      .inputs
      .iter()
      .chain(&self.referenced)
      .filter_map(Stream::producer)
      .collect();
    producers.sort();
    producers.dedup();
    producers
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn descriptor_defaults_from_json() {
    let descriptor: TransformDescriptor = serde_json::from_str(
      r#"{"name": "dex", "input_types": ["CLASSES"], "scopes": ["PROJECT"], "output_types": ["DEX"]}"#,
    )
    .unwrap();
    assert!(descriptor.incremental);
    assert!(descriptor.referenced_scopes.is_empty());
    assert_eq!(descriptor.kind(), None);
    assert_eq!(descriptor.output_types().iter().next(), Some(&ContentType::Dex));
  }

  #[test]
  fn output_types_default_to_inputs() {
    let descriptor = TransformDescriptor::new("shrink")
      .with_input_types([ContentType::Classes, ContentType::Resources])
      .with_scopes([Scope::Project]);
    assert_eq!(descriptor.output_types(), &descriptor.input_types);
  }

  #[test]
  fn messages_name_transform_and_variant() {
    let descriptor = TransformDescriptor::new("dex")
      .with_input_types([ContentType::Resources])
      .with_scopes([Scope::Project]);
    let err = ConfigError::streams_not_available(&descriptor, "debug");
    assert_eq!(
      err.to_string(),
      "transform 'dex' (variant 'debug'): requested streams not available (types [RESOURCES], scopes [PROJECT])"
    );
    assert_eq!(err.subject(), "dex");
    assert_eq!(err.variant(), "debug");
  }
}
