//! Image and annotation writers.
//!
//! Both writers own a buffered file handle. Call `finish()` to flush and
//! surface write errors; a writer dropped early still flushes what it has so
//! no partially-buffered file is left behind for comparison.

mod annotation_file;
mod image_file;

use std::path::PathBuf;

use thiserror::Error;

pub use annotation_file::{AnnotationRecord, FourCornersCsvWriter, read_four_corners_csv};
pub use image_file::{DirectoryWriter, ImageFileFormat, encode_image, save_image};

/// Header line of a four-corner annotation file.
pub const FOUR_CORNERS_HEADER: &str = "image_id,x_min,y_min,x_max,y_max,label";

/// Errors that can occur while writing or reading output files.
#[derive(Error, Debug)]
pub enum WriterError {
    /// I/O error during file operations
    #[error("IO error on {path:?}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Image encoding failed
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    /// A file did not follow the expected format
    #[error("Invalid format in {path:?} line {line}: {message}")]
    InvalidFormat {
        /// File being read
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// Output file extension does not map to a known image format
    #[error("Unsupported image extension: {0}")]
    UnsupportedExtension(String),

    /// Normalized coordinates need non-zero image dimensions
    #[error("Cannot normalize coordinates for empty image '{0}'")]
    EmptyImage(String),
}

impl WriterError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid format error.
    pub fn invalid_format(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}
