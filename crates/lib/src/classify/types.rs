//! Content types and scopes.
//!
//! Each member carries a distinct power-of-two value. The tables below are
//! persisted through directory names, so values must never be reassigned.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version of the bit-assignment tables.
///
/// Bump only when adding members; existing values are frozen so that output
/// roots written by older builds stay decodable.
pub const LAYOUT_VERSION: u32 = 1;

/// A classification dimension whose members map to single bits.
pub trait Classification: Copy + Ord + fmt::Display + 'static {
  /// The bit value of this member.
  fn value(&self) -> u32;

  /// Every member known to the decoder, in table order.
  fn known() -> &'static [Self];
}

/// What kind of build output an artifact represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
  /// Compiled class files.
  Classes,
  /// Java resources.
  Resources,
  /// Dex files.
  Dex,
  /// Native libraries.
  NativeLibs,
  /// Instrumented classes.
  ClassesEnhanced,
  /// Data-binding artifacts.
  DataBinding,
  /// Per-class dex archives.
  DexArchive,
  /// A content type declared outside the recognized set.
  ///
  /// Never decoded from disk, and rejected by transform validation.
  Custom(u32),
}

const CONTENT_TYPES: &[ContentType] = &[
  ContentType::Classes,
  ContentType::Resources,
  ContentType::Dex,
  ContentType::NativeLibs,
  ContentType::ClassesEnhanced,
  ContentType::DataBinding,
  ContentType::DexArchive,
];

impl ContentType {
  /// Returns true for members of the recognized set.
  pub fn is_standard(&self) -> bool {
    !matches!(self, ContentType::Custom(_))
  }

  /// Name used in task names, e.g. `NativeLibs`.
  pub fn task_label(&self) -> String {
    match self {
      ContentType::Classes => "Classes".to_string(),
      ContentType::Resources => "Resources".to_string(),
      ContentType::Dex => "Dex".to_string(),
      ContentType::NativeLibs => "NativeLibs".to_string(),
      ContentType::ClassesEnhanced => "ClassesEnhanced".to_string(),
      ContentType::DataBinding => "DataBinding".to_string(),
      ContentType::DexArchive => "DexArchive".to_string(),
      ContentType::Custom(value) => format!("Custom{:x}", value),
    }
  }
}

impl Classification for ContentType {
  fn value(&self) -> u32 {
    match self {
      ContentType::Classes => 0x01,
      ContentType::Resources => 0x02,
      ContentType::Dex => 0x1000,
      ContentType::NativeLibs => 0x2000,
      ContentType::ClassesEnhanced => 0x4000,
      ContentType::DataBinding => 0x10000,
      ContentType::DexArchive => 0x40000,
      ContentType::Custom(value) => *value,
    }
  }

  fn known() -> &'static [Self] {
    CONTENT_TYPES
  }
}

impl fmt::Display for ContentType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ContentType::Classes => write!(f, "CLASSES"),
      ContentType::Resources => write!(f, "RESOURCES"),
      ContentType::Dex => write!(f, "DEX"),
      ContentType::NativeLibs => write!(f, "NATIVE_LIBS"),
      ContentType::ClassesEnhanced => write!(f, "CLASSES_ENHANCED"),
      ContentType::DataBinding => write!(f, "DATA_BINDING"),
      ContentType::DexArchive => write!(f, "DEX_ARCHIVE"),
      ContentType::Custom(value) => write!(f, "CUSTOM(0x{:x})", value),
    }
  }
}

/// Where an artifact originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
  /// The module being built.
  Project,
  /// Other modules of the same build.
  SubProjects,
  /// External library dependencies.
  ExternalLibraries,
  /// Code under test, when building a test variant.
  TestedCode,
  /// Compile-only dependencies that are never packaged.
  ProvidedOnly,
  /// Internal: the main split of a multi-split output.
  MainSplit,
  /// Internal: local jar dependencies.
  LocalDeps,
  /// Internal: feature modules.
  Features,
}

const SCOPES: &[Scope] = &[
  Scope::Project,
  Scope::SubProjects,
  Scope::ExternalLibraries,
  Scope::TestedCode,
  Scope::ProvidedOnly,
  Scope::MainSplit,
  Scope::LocalDeps,
  Scope::Features,
];

impl Classification for Scope {
  fn value(&self) -> u32 {
    match self {
      Scope::Project => 0x01,
      Scope::SubProjects => 0x04,
      Scope::ExternalLibraries => 0x10,
      Scope::TestedCode => 0x20,
      Scope::ProvidedOnly => 0x40,
      Scope::MainSplit => 0x10000,
      Scope::LocalDeps => 0x20000,
      Scope::Features => 0x40000,
    }
  }

  fn known() -> &'static [Self] {
    SCOPES
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Scope::Project => "PROJECT",
      Scope::SubProjects => "SUB_PROJECTS",
      Scope::ExternalLibraries => "EXTERNAL_LIBRARIES",
      Scope::TestedCode => "TESTED_CODE",
      Scope::ProvidedOnly => "PROVIDED_ONLY",
      Scope::MainSplit => "MAIN_SPLIT",
      Scope::LocalDeps => "LOCAL_DEPS",
      Scope::Features => "FEATURES",
    };
    f.write_str(name)
  }
}

pub type ContentTypes = BTreeSet<ContentType>;
pub type Scopes = BTreeSet<Scope>;

/// Combine members into a single bitmask.
pub fn mask_of<'a, T, I>(items: I) -> u32
where
  T: Classification,
  I: IntoIterator<Item = &'a T>,
{
  items.into_iter().fold(0, |mask, item| mask | item.value())
}

/// Decompose a bitmask into the known members whose bit is set.
///
/// Bits that belong to no known member are ignored.
pub fn from_mask<T: Classification>(mask: u32) -> BTreeSet<T> {
  T::known().iter().copied().filter(|item| mask & item.value() != 0).collect()
}

/// Render a set as `[A, B]` for messages.
pub fn describe<T: Classification>(items: &BTreeSet<T>) -> String {
  let names: Vec<String> = items.iter().map(|item| item.to_string()).collect();
  format!("[{}]", names.join(", "))
}
