//! Structural checks run on a transform descriptor before matching.

use std::collections::BTreeSet;

use crate::classify::{Scope, Scopes, describe};

use super::types::{ConfigError, TransformDescriptor};

/// Kinds allowed to consume `PROVIDED_ONLY` by default.
pub const DEFAULT_PROVIDED_ONLY_EXEMPT: &[&str] = &["proguard", "desugar"];

/// Which transforms may bend the scope rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
  provided_only_exempt: BTreeSet<String>,
}

impl Default for ValidationPolicy {
  fn default() -> Self {
    Self::new(DEFAULT_PROVIDED_ONLY_EXEMPT.iter().copied())
  }
}

impl ValidationPolicy {
  pub fn new<S: Into<String>>(provided_only_exempt: impl IntoIterator<Item = S>) -> Self {
    Self {
      provided_only_exempt: provided_only_exempt.into_iter().map(Into::into).collect(),
    }
  }

  pub fn is_provided_only_exempt(&self, descriptor: &TransformDescriptor) -> bool {
    descriptor
      .kind()
      .is_some_and(|kind| self.provided_only_exempt.contains(kind))
  }

  /// Check `descriptor`, returning the first violation found.
  ///
  /// No-op descriptors are not validated.
  pub fn validate(&self, descriptor: &TransformDescriptor, variant: &str) -> Result<(), ConfigError> {
    let transform = || descriptor.name.clone();
    let variant = || variant.to_string();

    if descriptor.input_types.is_empty() {
      return Err(ConfigError::NoInputTypes {
        transform: transform(),
        variant: variant(),
      });
    }

    if let Some(content_type) = descriptor
      .input_types
      .iter()
      .chain(&descriptor.output_types)
      .find(|content_type| !content_type.is_standard())
    {
      return Err(ConfigError::CustomContentType {
        transform: transform(),
        variant: variant(),
        content_type: *content_type,
      });
    }

    if descriptor.scopes.contains(&Scope::TestedCode) {
      return Err(ConfigError::TestedCodeConsumed {
        transform: transform(),
        variant: variant(),
      });
    }

    if descriptor.scopes.contains(&Scope::ProvidedOnly) && !self.is_provided_only_exempt(descriptor) {
      return Err(ConfigError::ProvidedOnlyConsumed {
        transform: transform(),
        variant: variant(),
      });
    }

    let overlap: Scopes = descriptor
      .scopes
      .intersection(&descriptor.referenced_scopes)
      .copied()
      .collect();
    if !overlap.is_empty() {
      return Err(ConfigError::OverlappingScopes {
        transform: transform(),
        variant: variant(),
        overlap: describe(&overlap),
      });
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::classify::ContentType;

  fn dex() -> TransformDescriptor {
    TransformDescriptor::new("dex")
      .with_input_types([ContentType::Classes])
      .with_scopes([Scope::Project])
      .with_output_types([ContentType::Dex])
  }

  #[test]
  fn accepts_standard_descriptor() {
    assert_eq!(ValidationPolicy::default().validate(&dex(), "debug"), Ok(()));
  }

  #[test]
  fn rejects_custom_output_type() {
    let descriptor = dex().with_output_types([ContentType::Custom(0x100)]);
    let err = ValidationPolicy::default().validate(&descriptor, "debug").unwrap_err();
    assert!(matches!(
      err,
      ConfigError::CustomContentType {
        content_type: ContentType::Custom(0x100),
        ..
      }
    ));
    assert!(err.to_string().contains("custom content type"));
  }

  #[test]
  fn rejects_missing_input_types() {
    let descriptor = TransformDescriptor::new("empty").with_scopes([Scope::Project]);
    assert!(matches!(
      ValidationPolicy::default().validate(&descriptor, "debug"),
      Err(ConfigError::NoInputTypes { .. })
    ));
  }

  #[test]
  fn tested_code_is_never_consumable() {
    let descriptor = dex().with_scopes([Scope::TestedCode]).with_kind("proguard");
    assert!(matches!(
      ValidationPolicy::default().validate(&descriptor, "debug"),
      Err(ConfigError::TestedCodeConsumed { .. })
    ));
  }

  #[test]
  fn provided_only_needs_exemption() {
    let descriptor = dex().with_scopes([Scope::ProvidedOnly]);
    assert!(matches!(
      ValidationPolicy::default().validate(&descriptor, "debug"),
      Err(ConfigError::ProvidedOnlyConsumed { .. })
    ));

    let exempt = descriptor.with_kind("proguard");
    assert_eq!(ValidationPolicy::default().validate(&exempt, "debug"), Ok(()));
    assert!(ValidationPolicy::new(["other"]).validate(&exempt, "debug").is_err());
  }

  #[test]
  fn referenced_scopes_cannot_overlap_consumed() {
    let descriptor = dex().with_referenced_scopes([Scope::Project, Scope::ExternalLibraries]);
    let err = ValidationPolicy::default().validate(&descriptor, "release").unwrap_err();
    assert_eq!(
      err,
      ConfigError::OverlappingScopes {
        transform: "dex".to_string(),
        variant: "release".to_string(),
        overlap: "[PROJECT]".to_string(),
      }
    );
  }
}
