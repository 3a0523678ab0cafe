//! Layout of an intermediate root.
//!
//! ```text
//! <root>/
//! ├── folders/<typesHex>/<scopesHex>/<name>/...   # directory artifacts
//! └── jars/<typesHex>/<scopesHex>/<name>.jar      # jar artifacts
//! ```
//!
//! The layout is the persisted state: a later build lists the root and
//! decodes the two hex segments to recover each artifact's classification.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::classify::{ContentType, ContentTypes, Scope, Scopes, decode, encode};
use crate::consts::{FOLDERS_DIR, JAR_EXTENSION, JARS_DIR};

use super::input::{ChangedFiles, DirectoryInput, JarInput, Status, TransformInput, changes_under};
use super::types::InputError;

/// Storage format of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
  Directory,
  Jar,
}

impl Format {
  fn dir_name(self) -> &'static str {
    match self {
      Format::Directory => FOLDERS_DIR,
      Format::Jar => JARS_DIR,
    }
  }
}

/// An artifact found under an intermediate root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub name: String,
  pub path: PathBuf,
  pub format: Format,
  pub content_types: ContentTypes,
  pub scopes: Scopes,
}

/// An intermediate root seen through a stream's classification.
///
/// Artifacts whose classification does not overlap `content_types` and
/// `scopes` are invisible; visible artifacts report only the overlap.
#[derive(Debug, Clone)]
pub struct IntermediateFolder {
  root: PathBuf,
  content_types: ContentTypes,
  scopes: Scopes,
}

impl IntermediateFolder {
  pub fn new(root: PathBuf, content_types: ContentTypes, scopes: Scopes) -> Self {
    Self {
      root,
      content_types,
      scopes,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Path where a new artifact with this classification should be written.
  ///
  /// Parent directories are created; for directories the artifact directory
  /// itself is created too.
  pub fn content_location(
    &self,
    name: &str,
    content_types: &ContentTypes,
    scopes: &Scopes,
    format: Format,
  ) -> Result<PathBuf, InputError> {
    let parent = self
      .root
      .join(format.dir_name())
      .join(encode(content_types))
      .join(encode(scopes));

    let location = match format {
      Format::Directory => parent.join(name),
      Format::Jar => parent.join(format!("{}.{}", name, JAR_EXTENSION)),
    };

    let to_create = match format {
      Format::Directory => location.as_path(),
      Format::Jar => parent.as_path(),
    };
    fs::create_dir_all(to_create).map_err(|source| InputError::Write {
      path: to_create.to_path_buf(),
      source,
    })?;

    trace!(location = ?location, "allocated content location");
    Ok(location)
  }

  /// Remove everything under the root.
  pub fn delete_all(&self) -> Result<(), InputError> {
    match fs::remove_dir_all(&self.root) {
      Ok(()) => {
        debug!(root = ?self.root, "deleted intermediate root");
        Ok(())
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(InputError::Write {
        path: self.root.clone(),
        source,
      }),
    }
  }

  /// All visible artifacts currently on disk, sorted by path.
  pub fn artifacts(&self) -> Result<Vec<Artifact>, InputError> {
    let mut artifacts = Vec::new();
    for format in [Format::Directory, Format::Jar] {
      self.collect_format(format, &mut artifacts)?;
    }
    Ok(artifacts)
  }

  fn collect_format(&self, format: Format, artifacts: &mut Vec<Artifact>) -> Result<(), InputError> {
    let base = self.root.join(format.dir_name());
    if !base.is_dir() {
      return Ok(());
    }

    let walker = WalkDir::new(&base)
      .min_depth(3)
      .max_depth(3)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        match entry.depth() {
          1 => entry.file_type().is_dir() && decode::<ContentType>(&name).is_some(),
          2 => entry.file_type().is_dir() && decode::<Scope>(&name).is_some(),
          _ => true,
        }
      });

    for entry in walker {
      let entry = entry.map_err(|source| InputError::Walk {
        path: base.clone(),
        source,
      })?;

      let is_artifact = match format {
        Format::Directory => entry.file_type().is_dir(),
        Format::Jar => {
          entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == JAR_EXTENSION)
        }
      };
      if !is_artifact {
        trace!(path = ?entry.path(), "skipping non-artifact entry");
        continue;
      }

      if let Some(artifact) = self.parse_artifact(format, entry.path()) {
        artifacts.push(artifact);
      }
    }

    Ok(())
  }

  /// Recover an artifact from its path below `<root>/<kind>/`.
  fn parse_artifact(&self, format: Format, path: &Path) -> Option<Artifact> {
    let relative = path.strip_prefix(self.root.join(format.dir_name())).ok()?;
    let segments: Vec<String> = relative
      .components()
      .map(|component| match component {
        Component::Normal(part) => Some(part.to_string_lossy().to_string()),
        _ => None,
      })
      .collect::<Option<Vec<_>>>()?;

    let [types_hex, scopes_hex, file_name] = segments.as_slice() else {
      return None;
    };

    let content_types: ContentTypes = decode::<ContentType>(types_hex)?
      .intersection(&self.content_types)
      .copied()
      .collect();
    let scopes: Scopes = decode::<Scope>(scopes_hex)?.intersection(&self.scopes).copied().collect();
    if content_types.is_empty() || scopes.is_empty() {
      trace!(path = ?path, "artifact outside the requested classification");
      return None;
    }

    let name = match format {
      Format::Directory => file_name.clone(),
      Format::Jar => file_name.strip_suffix(&format!(".{}", JAR_EXTENSION))?.to_string(),
    };

    Some(Artifact {
      name,
      path: path.to_path_buf(),
      format,
      content_types,
      scopes,
    })
  }

  /// Artifacts that only survive in the changed-file map.
  ///
  /// A removed artifact is gone from disk, but its old path still encodes its
  /// classification.
  fn removed_artifacts(&self, changed: &ChangedFiles) -> Vec<Artifact> {
    let mut found: BTreeMap<PathBuf, Artifact> = BTreeMap::new();

    for (path, status) in changes_under(changed, &self.root) {
      if status != Status::Removed {
        continue;
      }
      let Ok(relative) = path.strip_prefix(&self.root) else {
        continue;
      };
      let mut components = relative.components();
      let format = match components.next() {
        Some(Component::Normal(kind)) if kind == FOLDERS_DIR => Format::Directory,
        Some(Component::Normal(kind)) if kind == JARS_DIR => Format::Jar,
        _ => continue,
      };

      // <kind>/<types>/<scopes>/<name>
      let artifact_path: PathBuf = self
        .root
        .join(relative.components().take(4).collect::<PathBuf>());
      if relative.components().count() < 4 || found.contains_key(&artifact_path) {
        continue;
      }
      if format == Format::Jar && artifact_path != path {
        continue;
      }

      if let Some(artifact) = self.parse_artifact(format, &artifact_path) {
        found.insert(artifact_path, artifact);
      }
    }

    found.into_values().collect()
  }

  /// The visible artifacts as transform input.
  ///
  /// With `changed`, jars carry their status from the map, directories carry
  /// the changes below them, and artifacts removed since the previous build
  /// are reconstructed from their paths.
  pub fn inputs(&self, changed: Option<&ChangedFiles>) -> Result<TransformInput, InputError> {
    let mut artifacts = self.artifacts()?;

    if let Some(changed) = changed {
      for removed in self.removed_artifacts(changed) {
        if !artifacts.iter().any(|artifact| artifact.path == removed.path) {
          artifacts.push(removed);
        }
      }
      artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    }

    let mut input = TransformInput::default();
    for artifact in artifacts {
      match artifact.format {
        Format::Jar => {
          let status = match changed {
            Some(changed) => changed.get(&artifact.path).copied().unwrap_or(Status::Unchanged),
            None => Status::Added,
          };
          input.jars.push(JarInput {
            name: artifact.name,
            file: artifact.path,
            status,
            content_types: artifact.content_types,
            scopes: artifact.scopes,
          });
        }
        Format::Directory => {
          let changed_files = changed
            .map(|changed| changes_under(changed, &artifact.path))
            .unwrap_or_default();
          input.directories.push(DirectoryInput {
            name: artifact.name,
            file: artifact.path,
            content_types: artifact.content_types,
            scopes: artifact.scopes,
            changed_files,
          });
        }
      }
    }

    Ok(input)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::classify::Classification;
  use tempfile::TempDir;

  fn types(items: &[ContentType]) -> ContentTypes {
    items.iter().copied().collect()
  }

  fn scopes(items: &[Scope]) -> Scopes {
    items.iter().copied().collect()
  }

  fn everything(root: &Path) -> IntermediateFolder {
    IntermediateFolder::new(
      root.to_path_buf(),
      ContentType::known().iter().copied().collect(),
      Scope::known().iter().copied().collect(),
    )
  }

  #[test]
  fn content_location_follows_layout() {
    let temp = TempDir::new().unwrap();
    let folder = everything(temp.path());

    let dir = folder
      .content_location(
        "main",
        &types(&[ContentType::Classes, ContentType::Resources]),
        &scopes(&[Scope::Project]),
        Format::Directory,
      )
      .unwrap();
    assert_eq!(dir, temp.path().join("folders/3/1/main"));
    assert!(dir.is_dir());

    let jar = folder
      .content_location(
        "deps",
        &types(&[ContentType::Dex]),
        &scopes(&[Scope::ExternalLibraries]),
        Format::Jar,
      )
      .unwrap();
    assert_eq!(jar, temp.path().join("jars/1000/10/deps.jar"));
    assert!(jar.parent().unwrap().is_dir());
    assert!(!jar.exists());
  }

  #[test]
  fn artifacts_decode_their_classification() {
    let temp = TempDir::new().unwrap();
    let folder = everything(temp.path());

    let dir = folder
      .content_location("main", &types(&[ContentType::Classes]), &scopes(&[Scope::Project]), Format::Directory)
      .unwrap();
    fs::write(dir.join("A.class"), b"a").unwrap();
    let jar = folder
      .content_location(
        "lib",
        &types(&[ContentType::Classes, ContentType::Resources]),
        &scopes(&[Scope::ExternalLibraries]),
        Format::Jar,
      )
      .unwrap();
    fs::write(&jar, b"jar").unwrap();

    let artifacts = folder.artifacts().unwrap();
    assert_eq!(artifacts.len(), 2);

    assert_eq!(artifacts[0].name, "main");
    assert_eq!(artifacts[0].format, Format::Directory);
    assert_eq!(artifacts[0].content_types, types(&[ContentType::Classes]));

    assert_eq!(artifacts[1].name, "lib");
    assert_eq!(artifacts[1].format, Format::Jar);
    assert_eq!(artifacts[1].scopes, scopes(&[Scope::ExternalLibraries]));
  }

  #[test]
  fn foreign_entries_are_skipped() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("folders/legacy/1/main")).unwrap();
    fs::create_dir_all(temp.path().join("folders/0/1/main")).unwrap();
    fs::create_dir_all(temp.path().join("folders/1/not-hex/main")).unwrap();
    fs::create_dir_all(temp.path().join("jars/1/1")).unwrap();
    fs::write(temp.path().join("jars/1/1/notes.txt"), b"x").unwrap();
    fs::write(temp.path().join("folders/stray.txt"), b"x").unwrap();

    let artifacts = everything(temp.path()).artifacts().unwrap();
    assert!(artifacts.is_empty());
  }

  #[test]
  fn restricted_view_hides_and_narrows() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("folders/3/11/both")).unwrap();
    fs::create_dir_all(temp.path().join("folders/2/1/resources-only")).unwrap();

    let folder = IntermediateFolder::new(
      temp.path().to_path_buf(),
      types(&[ContentType::Classes]),
      scopes(&[Scope::Project]),
    );
    let artifacts = folder.artifacts().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].name, "both");
    assert_eq!(artifacts[0].content_types, types(&[ContentType::Classes]));
    assert_eq!(artifacts[0].scopes, scopes(&[Scope::Project]));
  }

  #[test]
  fn removed_artifacts_are_rebuilt_from_changed_paths() {
    let temp = TempDir::new().unwrap();
    let folder = everything(temp.path());

    let mut changed = ChangedFiles::new();
    changed.insert(temp.path().join("jars/1/10/old.jar"), Status::Removed);
    changed.insert(temp.path().join("folders/2/1/gone/res/a.txt"), Status::Removed);
    changed.insert(temp.path().join("folders/2/1/gone/res/b.txt"), Status::Removed);
    changed.insert(temp.path().join("jars/zz/10/foreign.jar"), Status::Removed);

    let input = folder.inputs(Some(&changed)).unwrap();

    assert_eq!(input.jars.len(), 1);
    assert_eq!(input.jars[0].name, "old");
    assert_eq!(input.jars[0].status, Status::Removed);
    assert_eq!(input.jars[0].content_types, types(&[ContentType::Classes]));

    assert_eq!(input.directories.len(), 1);
    assert_eq!(input.directories[0].name, "gone");
    assert_eq!(input.directories[0].changed_files.len(), 2);
  }

  #[test]
  fn full_inputs_mark_jars_added() {
    let temp = TempDir::new().unwrap();
    let folder = everything(temp.path());
    let jar = folder
      .content_location("lib", &types(&[ContentType::Classes]), &scopes(&[Scope::Project]), Format::Jar)
      .unwrap();
    fs::write(&jar, b"jar").unwrap();

    let input = folder.inputs(None).unwrap();
    assert_eq!(input.jars[0].status, Status::Added);

    let input = folder.inputs(Some(&ChangedFiles::new())).unwrap();
    assert_eq!(input.jars[0].status, Status::Unchanged);
  }

  #[test]
  fn delete_all_tolerates_missing_root() {
    let temp = TempDir::new().unwrap();
    let folder = everything(&temp.path().join("missing"));
    folder.delete_all().unwrap();

    let root = temp.path().join("out");
    let folder = everything(&root);
    folder
      .content_location("x", &types(&[ContentType::Dex]), &scopes(&[Scope::Project]), Format::Directory)
      .unwrap();
    folder.delete_all().unwrap();
    assert!(!root.exists());
  }
}
