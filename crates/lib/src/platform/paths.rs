//! Build locations resolved from the environment.

use std::path::PathBuf;

pub const BUILD_DIR_ENV: &str = "XFORM_BUILD_DIR";
pub const ZIP_CACHE_ENV: &str = "XFORM_ZIP_CACHE";
pub const VARIANT_ENV: &str = "XFORM_VARIANT";

pub const DEFAULT_VARIANT: &str = "debug";

const INTERMEDIATES_DIR: &str = "intermediates";
const TRANSFORMS_DIR: &str = "transforms";
const ZIP_CACHE_DIR: &str = "zip-cache";

/// Returns the build output directory (`./build` unless overridden)
pub fn build_dir() -> PathBuf {
  non_empty_var(BUILD_DIR_ENV)
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("build"))
}

/// Returns the directory holding intermediate build outputs
pub fn intermediates_dir() -> PathBuf {
  build_dir().join(INTERMEDIATES_DIR)
}

/// Returns the directory under which every transform gets its output roots
pub fn transforms_dir() -> PathBuf {
  intermediates_dir().join(TRANSFORMS_DIR)
}

/// Returns the zip cache directory
pub fn zip_cache_dir() -> PathBuf {
  non_empty_var(ZIP_CACHE_ENV)
    .map(PathBuf::from)
    .unwrap_or_else(|| intermediates_dir().join(ZIP_CACHE_DIR))
}

/// Returns the variant being built
pub fn variant() -> String {
  non_empty_var(VARIANT_ENV).unwrap_or_else(|| DEFAULT_VARIANT.to_string())
}

fn non_empty_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use temp_env::with_vars;

  #[test]
  #[serial]
  fn env_vars_override_defaults() {
    with_vars(
      [
        (BUILD_DIR_ENV, Some("/work/out")),
        (ZIP_CACHE_ENV, Some("/var/cache/zips")),
        (VARIANT_ENV, Some("release")),
      ],
      || {
        assert_eq!(build_dir(), PathBuf::from("/work/out"));
        assert_eq!(transforms_dir(), PathBuf::from("/work/out/intermediates/transforms"));
        assert_eq!(zip_cache_dir(), PathBuf::from("/var/cache/zips"));
        assert_eq!(variant(), "release");
      },
    );
  }

  #[test]
  #[serial]
  fn defaults_when_unset() {
    with_vars(
      [
        (BUILD_DIR_ENV, None::<&str>),
        (ZIP_CACHE_ENV, None::<&str>),
        (VARIANT_ENV, None::<&str>),
      ],
      || {
        assert_eq!(build_dir(), PathBuf::from("build"));
        assert_eq!(zip_cache_dir(), PathBuf::from("build/intermediates/zip-cache"));
        assert_eq!(variant(), DEFAULT_VARIANT);
      },
    );
  }

  #[test]
  #[serial]
  fn zip_cache_follows_build_dir() {
    with_vars([(BUILD_DIR_ENV, Some("/b")), (ZIP_CACHE_ENV, Some(""))], || {
      assert_eq!(zip_cache_dir(), PathBuf::from("/b/intermediates/zip-cache"));
    });
  }
}
