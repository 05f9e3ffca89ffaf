//! Crate-level error type.

use thiserror::Error;

use crate::annotation::AnnotationError;
use crate::augmentations::AugmentationError;
use crate::config::ConfigError;
use crate::fixtures::FixtureError;
use crate::sample::SampleError;
use crate::snapshot::SnapshotError;
use crate::writers::WriterError;

/// Any failure of a snapshot case or run.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error(transparent)]
    Augmentation(#[from] AugmentationError),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A color-only augmentation changed the annotation array
    #[error("Color augmentation {name} changed the bounding boxes")]
    ColorAugmentationMovedBoxes {
        /// Augmentation name
        name: String,
    },

    /// Scratch directory handling failed
    #[error("IO error on {path:?}: {source}")]
    Io {
        /// Directory involved
        path: std::path::PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
