//! Error types for augmentation construction and execution.

use thiserror::Error;

use crate::annotation::AnnotationError;

/// Errors that can occur while building or running an augmentation.
#[derive(Error, Debug)]
pub enum AugmentationError {
    /// No augmentation is registered under this name
    #[error("Unknown augmentation: {0}")]
    UnknownAugmentation(String),

    /// Options did not match the augmentation's parameter schema, or the
    /// effective parameters could not be converted back to options
    #[error("Invalid options for {name}: {source}")]
    InvalidOptions {
        /// Augmentation name
        name: String,
        /// Underlying YAML error
        #[source]
        source: serde_yaml::Error,
    },

    /// A parameter value is out of its allowed domain
    #[error("Invalid parameter '{parameter}' for {name}: {message}")]
    InvalidParameter {
        /// Augmentation name
        name: String,
        /// Parameter name
        parameter: String,
        /// Description of the problem
        message: String,
    },

    /// The input image has no pixels
    #[error("{name} cannot augment an empty image")]
    EmptyImage {
        /// Augmentation name
        name: String,
    },

    /// The annotation array could not be interpreted
    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    /// Image encoding or decoding failed
    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),
}

impl AugmentationError {
    /// Create an unknown augmentation error.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownAugmentation(name.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(
        name: impl Into<String>,
        parameter: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}
