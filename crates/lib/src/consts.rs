/// Directory under an intermediate root holding directory artifacts.
pub const FOLDERS_DIR: &str = "folders";

/// Directory under an intermediate root holding jar artifacts.
pub const JARS_DIR: &str = "jars";

pub const JAR_EXTENSION: &str = "jar";

/// Index file mapping jar paths to cached copies.
pub const ZIP_CACHE_INDEX: &str = "index.json";

pub const ZIP_CACHE_INDEX_VERSION: u32 = 1;

/// Length of the hash prefix used to name cached jar copies.
pub const CACHE_KEY_LEN: usize = 16;
