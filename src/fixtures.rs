//! Per-augmentation option fixtures.
//!
//! An augmentation may have an options file at `<fixtures_dir>/<Name>.yml`:
//!
//! ```yaml
//! options:
//!   angle: [-20, 20]
//! ```
//!
//! A missing file means "use the defaults" and is not an error.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::augmentations::Options;
use crate::constants::FIXTURE_EXTENSION;

/// Errors that can occur while resolving a fixture.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// The options file exists but could not be read
    #[error("Failed to read fixture {path:?}: {source}")]
    Io {
        /// Fixture path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The options file does not match the fixture schema
    #[error("Invalid fixture {path:?}: {message}")]
    InvalidSchema {
        /// Fixture path
        path: PathBuf,
        /// Description of the problem
        message: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FixtureDocument {
    #[serde(default)]
    options: Options,
}

/// An augmentation name with the options it should be built with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFixture {
    pub name: String,
    pub options: Options,
}

/// Looks up option fixtures in a directory.
#[derive(Debug, Clone)]
pub struct FixtureResolver {
    directory: PathBuf,
}

impl FixtureResolver {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Conventional fixture path for `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", name, FIXTURE_EXTENSION))
    }

    /// Resolve the options for `name`, falling back to empty options when no
    /// fixture file exists.
    pub fn resolve(&self, name: &str) -> Result<ResolvedFixture, FixtureError> {
        let path = self.path_for(name);
        let options = match std::fs::read_to_string(&path) {
            Ok(content) => parse_fixture(&path, &content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No fixture for {} at {:?}, using defaults", name, path);
                Options::new()
            }
            Err(source) => return Err(FixtureError::Io { path, source }),
        };

        Ok(ResolvedFixture {
            name: name.to_string(),
            options,
        })
    }
}

/// Validate a fixture document and extract its options.
fn parse_fixture(path: &Path, content: &str) -> Result<Options, FixtureError> {
    let invalid = |message: String| FixtureError::InvalidSchema {
        path: path.to_path_buf(),
        message,
    };

    let document: FixtureDocument =
        serde_yaml::from_str(content).map_err(|e| invalid(e.to_string()))?;

    if let Some(key) = document.options.keys().find(|k| !k.is_string()) {
        return Err(invalid(format!("option key {:?} is not a string", key)));
    }

    log::debug!("Loaded {} options from {:?}", document.options.len(), path);
    Ok(document.options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with(files: &[(&str, &str)]) -> (tempfile::TempDir, FixtureResolver) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let resolver = FixtureResolver::new(dir.path());
        (dir, resolver)
    }

    #[test]
    fn test_missing_fixture_is_empty() {
        let (_dir, resolver) = resolver_with(&[]);
        let fixture = resolver.resolve("Rotate").unwrap();

        assert_eq!(fixture.name, "Rotate");
        assert!(fixture.options.is_empty());
    }

    #[test]
    fn test_fixture_options() {
        let (_dir, resolver) = resolver_with(&[("Rotate.yml", "options:\n  angle: [-5, 5]\n")]);
        let fixture = resolver.resolve("Rotate").unwrap();

        assert_eq!(fixture.options.len(), 1);
        assert!(fixture.options.contains_key("angle"));
    }

    #[test]
    fn test_fixture_without_options_key() {
        let (_dir, resolver) = resolver_with(&[("Grayscale.yml", "{}\n")]);
        assert!(resolver.resolve("Grayscale").unwrap().options.is_empty());
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let (_dir, resolver) = resolver_with(&[("Rotate.yml", "option:\n  angle: 5\n")]);
        assert!(matches!(
            resolver.resolve("Rotate"),
            Err(FixtureError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_non_mapping_options_rejected() {
        let (_dir, resolver) = resolver_with(&[("Rotate.yml", "options: [1, 2]\n")]);
        assert!(matches!(
            resolver.resolve("Rotate"),
            Err(FixtureError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_non_string_key_rejected() {
        let (_dir, resolver) = resolver_with(&[("Rotate.yml", "options:\n  1: 5\n")]);
        assert!(matches!(
            resolver.resolve("Rotate"),
            Err(FixtureError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_path_convention() {
        let resolver = FixtureResolver::new("fixtures");
        assert_eq!(resolver.path_for("Scale"), PathBuf::from("fixtures/Scale.yml"));
    }
}
