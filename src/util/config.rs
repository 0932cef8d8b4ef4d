//! Configuration file support.
//!
//! Two configuration file locations are read:
//! - Global: `~/.uapf/config.toml` - User-wide defaults
//! - Project: `<repo>/.uapf/config.toml` - Repository-specific overrides
//!
//! Project config takes precedence over global config. Every setting is
//! optional; unset values resolve to the built-in defaults through the
//! section accessors.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default maximum size of an uploaded archive (64 MiB).
pub const DEFAULT_MAX_ARCHIVE_SIZE: u64 = 64 * 1024 * 1024;

/// Default maximum number of decompressed bytes written to staging (256 MiB).
pub const DEFAULT_MAX_UNPACKED_SIZE: u64 = 256 * 1024 * 1024;

/// Default number of chunks buffered between the export producer and reader.
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

/// Default export chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Package transfer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Import settings
    pub import: ImportConfig,

    /// Export settings
    pub export: ExportConfig,

    /// Commit attribution
    pub commit: CommitConfig,
}

/// Import-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Largest archive accepted, in bytes
    pub max_archive_size: Option<u64>,

    /// Largest total of decompressed entry bytes, in bytes
    pub max_unpacked_size: Option<u64>,

    /// Parent directory for staging areas (None = system temp dir)
    pub staging_dir: Option<PathBuf>,
}

impl ImportConfig {
    pub fn max_archive_size(&self) -> u64 {
        self.max_archive_size.unwrap_or(DEFAULT_MAX_ARCHIVE_SIZE)
    }

    pub fn max_unpacked_size(&self) -> u64 {
        self.max_unpacked_size.unwrap_or(DEFAULT_MAX_UNPACKED_SIZE)
    }
}

/// Export-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Chunks in flight between producer and consumer
    pub pipe_capacity: Option<usize>,

    /// Bytes per chunk
    pub chunk_size: Option<usize>,

    /// Only package files named by the manifest
    pub referenced_only: Option<bool>,
}

impl ExportConfig {
    pub fn pipe_capacity(&self) -> usize {
        self.pipe_capacity.unwrap_or(DEFAULT_PIPE_CAPACITY)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn referenced_only(&self) -> bool {
        self.referenced_only.unwrap_or(false)
    }
}

/// Commit identity override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Settings missing from the file stay unset.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.import.max_archive_size.is_some() {
            self.import.max_archive_size = other.import.max_archive_size;
        }
        if other.import.max_unpacked_size.is_some() {
            self.import.max_unpacked_size = other.import.max_unpacked_size;
        }
        if other.import.staging_dir.is_some() {
            self.import.staging_dir = other.import.staging_dir;
        }

        if other.export.pipe_capacity.is_some() {
            self.export.pipe_capacity = other.export.pipe_capacity;
        }
        if other.export.chunk_size.is_some() {
            self.export.chunk_size = other.export.chunk_size;
        }
        if other.export.referenced_only.is_some() {
            self.export.referenced_only = other.export.referenced_only;
        }

        if other.commit.author_name.is_some() {
            self.commit.author_name = other.commit.author_name;
        }
        if other.commit.author_email.is_some() {
            self.commit.author_email = other.commit.author_email;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.uapf/config.toml)
/// 2. Global config (~/.uapf/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the global config directory (~/.uapf).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".uapf"))
}

/// Get the global config path (~/.uapf/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (<repo>/.uapf/config.toml).
pub fn project_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".uapf").join("config.toml")
}
