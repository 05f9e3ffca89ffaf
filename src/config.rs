//! Harness configuration.
//!
//! Settings come from an optional YAML file; the update environment variable
//! and command line flags are applied on top. Every field has a default, so
//! an empty file (or no file at all) is a valid configuration:
//!
//! ```yaml
//! fixtures_dir: fixtures
//! snapshots_dir: snapshots/augmentations
//! seed: 1
//! image_format:
//!   format: jpeg
//!   quality: 90
//! mode: verify
//! log_level: info
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_FIXTURES_DIR, DEFAULT_SEED, DEFAULT_SNAPSHOTS_DIR, UPDATE_SNAPSHOTS_ENV,
};
use crate::snapshot::SnapshotMode;
use crate::writers::ImageFileFormat;

/// Log level setting for the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Get all log levels in order from least to most verbose.
    pub fn all() -> &'static [LogLevel] {
        &[
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
    }

    /// Lowercase name, as accepted in config files and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse a level name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|level| level.name().eq_ignore_ascii_case(name))
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this schema
    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_yaml::Error,
    },

    /// A command line value could not be interpreted
    #[error("Invalid value '{value}' for {setting}")]
    InvalidValue {
        /// Setting name
        setting: &'static str,
        /// Value given
        value: String,
    },
}

fn default_fixtures_dir() -> PathBuf {
    PathBuf::from(DEFAULT_FIXTURES_DIR)
}

fn default_snapshots_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SNAPSHOTS_DIR)
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

/// Settings for a snapshot run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Directory holding `<Name>.yml` option fixtures
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: PathBuf,

    /// Directory holding snapshot pairs
    #[serde(default = "default_snapshots_dir")]
    pub snapshots_dir: PathBuf,

    /// Seed for every augmentation run
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Encoding of written images
    #[serde(default)]
    pub image_format: ImageFileFormat,

    /// Record or verify snapshots
    #[serde(default)]
    pub mode: SnapshotMode,

    /// Logging verbosity
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            fixtures_dir: default_fixtures_dir(),
            snapshots_dir: default_snapshots_dir(),
            seed: DEFAULT_SEED,
            image_format: ImageFileFormat::default(),
            mode: SnapshotMode::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl HarnessConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        // An empty document deserializes as null rather than an empty mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content, path)?;
        log::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Apply the update environment variable, if set.
    pub fn apply_env(&mut self) {
        self.apply_update_flag(std::env::var(UPDATE_SNAPSHOTS_ENV).ok().as_deref());
    }

    /// Apply an update flag value as read from the environment.
    pub fn apply_update_flag(&mut self, value: Option<&str>) {
        if let Some(value) = value {
            self.mode = SnapshotMode::from_flag(Some(value));
        }
    }

    /// Select the image format from a file extension, keeping the configured
    /// JPEG quality.
    pub fn set_image_extension(&mut self, extension: &str) -> Result<(), ConfigError> {
        let quality = match self.image_format {
            ImageFileFormat::Jpeg { quality } => quality,
            ImageFileFormat::Png => crate::constants::DEFAULT_JPEG_QUALITY,
        };
        self.image_format = ImageFileFormat::from_extension(extension, quality).map_err(|_| {
            ConfigError::InvalidValue {
                setting: "image extension",
                value: extension.to_string(),
            }
        })?;
        Ok(())
    }
}
