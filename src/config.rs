//! Runtime configuration: CLI-overridable, with a fallback chain of
//! TOML file → field defaults. Mirrors the teacher's "parse, fall back to
//! defaults on any error, never panic on a missing/malformed config" shape.

use std::path::{Path, PathBuf};

use serde::Deserialize;

const DEFAULT_STORAGE_DIR: &str = "./campus-data";
const DEFAULT_GEOCODER_BASE: &str = "http://cs310.students.cs.ubc.ca:11316/api/v1/project_team111";
const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_dir: PathBuf,
    pub geocoder_base: String,
    pub max_archive_bytes: u64,
    pub bind_all: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            geocoder_base: DEFAULT_GEOCODER_BASE.to_string(),
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
            bind_all: false,
        }
    }
}

/// Mirrors the subset of fields a `campus-insight.toml` file may set. Every
/// field is optional; anything absent falls back to [`Config::default`].
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    storage_dir: Option<PathBuf>,
    geocoder_base: Option<String>,
    max_archive_bytes: Option<u64>,
    bind_all: Option<bool>,
}

impl Config {
    /// Reads `path` as TOML and overlays it on the defaults. A missing file
    /// or a file that fails to parse is not fatal — the defaults are used
    /// and the condition is logged, matching
    /// `codescope_server::init::resolve_rust_workspace`'s resolve-or-
    /// fall-back discipline.
    pub fn load(path: Option<&Path>) -> Config {
        let mut config = Config::default();
        let Some(path) = path else {
            return config;
        };
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read config file, using defaults");
                return config;
            }
        };
        let file: FileConfig = match toml::from_str(&contents) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not parse config file, using defaults");
                return config;
            }
        };
        if let Some(dir) = file.storage_dir {
            config.storage_dir = dir;
        }
        if let Some(base) = file.geocoder_base {
            config.geocoder_base = base;
        }
        if let Some(max) = file.max_archive_bytes {
            config.max_archive_bytes = max;
        }
        if let Some(bind_all) = file.bind_all {
            config.bind_all = bind_all;
        }
        config
    }
}
