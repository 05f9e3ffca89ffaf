//! Image augmentations operating on an image plus its annotation array.
//!
//! Every augmentation is a plain struct holding its validated parameters.
//! Randomness never comes from global state: callers pass a seeded
//! [`StdRng`] into [`Augmentation::augment`], so the output is a function of
//! `(image, annotations, seed)` alone.
//!
//! ## Adding New Augmentations
//!
//! 1. Define a parameter struct deriving `Serialize`, `Deserialize` and `Default`
//! 2. Implement [`TypedAugmentation`] for the augmentation struct
//! 3. Register it in [`AugmentationRegistry::new()`] and in the facade
//!
//! ```rust,ignore
//! use augsnap::augmentations::{AugmentationRegistry, Options, seeded_rng};
//!
//! let registry = AugmentationRegistry::new();
//! let rotate = registry.create("Rotate", &Options::new())?;
//! let (image, boxes) = rotate.augment(&mut seeded_rng(1), image, boxes)?;
//! ```

mod color;
mod error;
mod geometric;
mod geometry;
mod registry;

use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::annotation::{ANNOTATION_COLUMNS, AnnotationArray, AnnotationError};

pub use color::{
    Brightness, BrightnessParams, Contrast, ContrastParams, GaussianBlur, GaussianBlurParams,
    GaussianNoise, GaussianNoiseParams, Grayscale, GrayscaleParams, JpegCompression,
    JpegCompressionParams, SaltAndPepper, SaltAndPepperParams,
};
pub use error::AugmentationError;
pub use geometric::{
    HorizontalFlip, HorizontalFlipParams, RandomCrop, RandomCropParams, Resize, ResizeParams,
    Rotate, RotateParams, Scale, ScaleParams, Shear, ShearParams, Translate, TranslateParams,
    VerticalFlip, VerticalFlipParams,
};
pub use geometry::Affine;
pub use registry::{AugmentationEntry, AugmentationRegistry};

/// Keyword options for constructing an augmentation.
pub type Options = serde_yaml::Mapping;

/// Output of an augmentation: the new image and the new annotation array.
pub type Augmented = (RgbImage, AnnotationArray);

/// Create the random number generator used for one augmentation run.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// What an augmentation is allowed to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AugmentationKind {
    /// Changes pixel values only; the annotation array must come back unchanged.
    Color,
    /// May move, resize or drop annotations.
    Geometric,
}

impl AugmentationKind {
    /// Whether the augmentation must leave annotations untouched.
    pub fn is_color_only(&self) -> bool {
        matches!(self, AugmentationKind::Color)
    }

    /// Get the display name for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            AugmentationKind::Color => "color",
            AugmentationKind::Geometric => "geometric",
        }
    }
}

/// A configured augmentation, usable as a trait object.
pub trait Augmentation: Send + Sync {
    /// Registered name (e.g. "HorizontalFlip").
    fn name(&self) -> &'static str;

    /// Whether this is a color-only or geometric augmentation.
    fn kind(&self) -> AugmentationKind;

    /// The effective parameter set, including defaults.
    fn options(&self) -> Result<serde_yaml::Value, AugmentationError>;

    /// Apply the augmentation to an image and its annotation array.
    fn augment(
        &self,
        rng: &mut StdRng,
        image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError>;
}

/// Statically typed augmentation with a name, kind and parameter struct.
///
/// Implementors get [`Augmentation`] for free.
pub trait TypedAugmentation: Send + Sync + Sized + 'static {
    /// Registered name, also the fixture and snapshot file stem.
    const NAME: &'static str;

    /// Color-only or geometric.
    const KIND: AugmentationKind;

    /// Parameter struct deserialized from keyword options.
    type Params: DeserializeOwned + Serialize + Default;

    /// Build the augmentation from validated parameters.
    fn from_params(params: Self::Params) -> Result<Self, AugmentationError>;

    /// The parameters this augmentation was built with.
    fn params(&self) -> &Self::Params;

    /// Apply the augmentation. The image is never empty.
    fn transform(
        &self,
        rng: &mut StdRng,
        image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError>;

    /// Parse keyword options and build the augmentation.
    fn from_options(options: &Options) -> Result<Self, AugmentationError> {
        Self::from_params(parse_options(Self::NAME, options)?)
    }
}

impl<T: TypedAugmentation> Augmentation for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn kind(&self) -> AugmentationKind {
        T::KIND
    }

    fn options(&self) -> Result<serde_yaml::Value, AugmentationError> {
        serde_yaml::to_value(self.params()).map_err(|source| AugmentationError::InvalidOptions {
            name: T::NAME.to_string(),
            source,
        })
    }

    fn augment(
        &self,
        rng: &mut StdRng,
        image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(AugmentationError::EmptyImage {
                name: T::NAME.to_string(),
            });
        }
        if boxes.ncols() != ANNOTATION_COLUMNS {
            return Err(AnnotationError::WrongShape {
                expected: ANNOTATION_COLUMNS,
                found: boxes.ncols(),
            }
            .into());
        }
        log::trace!(
            "{}: augmenting {}x{} image with {} boxes",
            T::NAME,
            image.width(),
            image.height(),
            boxes.nrows()
        );
        self.transform(rng, image, boxes)
    }
}

/// Deserialize keyword options into a parameter struct.
///
/// Empty options yield the parameter defaults.
pub fn parse_options<P>(name: &str, options: &Options) -> Result<P, AugmentationError>
where
    P: DeserializeOwned + Default,
{
    if options.is_empty() {
        return Ok(P::default());
    }
    serde_yaml::from_value(serde_yaml::Value::Mapping(options.clone())).map_err(|source| {
        AugmentationError::InvalidOptions {
            name: name.to_string(),
            source,
        }
    })
}

/// Closed interval sampled uniformly once per augmentation run.
///
/// Written in options as `[min, max]` or as a single fixed number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RangeRepr")]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RangeRepr {
    Fixed(f64),
    Span(f64, f64),
}

impl From<RangeRepr> for ValueRange {
    fn from(repr: RangeRepr) -> Self {
        match repr {
            RangeRepr::Fixed(value) => Self::fixed(value),
            RangeRepr::Span(min, max) => Self::new(min, max),
        }
    }
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub const fn fixed(value: f64) -> Self {
        Self::new(value, value)
    }

    /// Draw a value. Fixed ranges do not consume randomness.
    pub fn sample(&self, rng: &mut StdRng) -> f64 {
        if self.min == self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }

    /// Check the range is ordered, finite and inside `[lower, upper]`.
    pub fn validate(
        &self,
        name: &str,
        parameter: &str,
        lower: f64,
        upper: f64,
    ) -> Result<(), AugmentationError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(AugmentationError::invalid_parameter(
                name,
                parameter,
                "bounds must be finite",
            ));
        }
        if self.min > self.max {
            return Err(AugmentationError::invalid_parameter(
                name,
                parameter,
                format!("min {} is greater than max {}", self.min, self.max),
            ));
        }
        if self.min < lower || self.max > upper {
            return Err(AugmentationError::invalid_parameter(
                name,
                parameter,
                format!(
                    "[{}, {}] is outside the allowed range [{}, {}]",
                    self.min, self.max, lower, upper
                ),
            ));
        }
        Ok(())
    }
}

/// Check a probability lies in `[0, 1]`.
pub(crate) fn validate_probability(
    name: &str,
    parameter: &str,
    value: f64,
) -> Result<(), AugmentationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AugmentationError::invalid_parameter(
            name,
            parameter,
            format!("{} is not a probability", value),
        ))
    }
}

/// Round and saturate a channel value.
pub(crate) fn to_channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    struct TestParams {
        angle: Option<ValueRange>,
        probability: f64,
    }

    fn options(yaml: &str) -> Options {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_empty_options_use_defaults() {
        let params: TestParams = parse_options("Test", &Options::new()).unwrap();
        assert_eq!(params, TestParams::default());
    }

    #[test]
    fn test_range_forms() {
        let params: TestParams = parse_options("Test", &options("angle: [-10, 20]")).unwrap();
        assert_eq!(params.angle, Some(ValueRange::new(-10.0, 20.0)));

        let params: TestParams = parse_options("Test", &options("angle: 15.5")).unwrap();
        assert_eq!(params.angle, Some(ValueRange::fixed(15.5)));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = parse_options::<TestParams>("Test", &options("angel: 3")).unwrap_err();
        assert!(matches!(err, AugmentationError::InvalidOptions { ref name, .. } if name == "Test"));
    }

    #[test]
    fn test_range_validation() {
        assert!(ValueRange::new(0.0, 1.0).validate("T", "p", 0.0, 1.0).is_ok());
        assert!(ValueRange::new(1.0, 0.0).validate("T", "p", 0.0, 1.0).is_err());
        assert!(ValueRange::new(0.0, 2.0).validate("T", "p", 0.0, 1.0).is_err());
        assert!(ValueRange::new(f64::NAN, 1.0).validate("T", "p", 0.0, 1.0).is_err());
    }

    #[test]
    fn test_range_sampling_is_seeded() {
        let range = ValueRange::new(-30.0, 30.0);
        let a: Vec<f64> = {
            let mut rng = seeded_rng(1);
            (0..8).map(|_| range.sample(&mut rng)).collect()
        };
        let b: Vec<f64> = {
            let mut rng = seeded_rng(1);
            (0..8).map(|_| range.sample(&mut rng)).collect()
        };
        assert_eq!(a, b);
        assert!(a.iter().all(|v| range.min <= *v && *v <= range.max));
    }

    #[test]
    fn test_wrong_column_count_rejected() {
        use crate::augmentations::{Grayscale, HorizontalFlip};
        use ndarray::array;

        let image = RgbImage::new(8, 8);
        let four_columns = array![[1.0, 1.0, 5.0, 5.0]];

        for augmentation in [
            Box::new(HorizontalFlip::from_options(&Options::new()).unwrap()) as Box<dyn Augmentation>,
            Box::new(Grayscale::from_options(&Options::new()).unwrap()),
        ] {
            let err = augmentation
                .augment(&mut seeded_rng(1), image.clone(), four_columns.clone())
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    AugmentationError::Annotation(AnnotationError::WrongShape {
                        expected: 5,
                        found: 4
                    })
                ),
                "{}: {}",
                augmentation.name(),
                err
            );
        }
    }

    #[test]
    fn test_options_report_effective_params() {
        use crate::augmentations::Rotate;

        let rotate = Rotate::from_options(&options("angle: [-5, 5]")).unwrap();
        let value = Augmentation::options(&rotate).unwrap();
        assert_eq!(value["angle"]["min"], serde_yaml::Value::from(-5.0));
        assert_eq!(value["angle"]["max"], serde_yaml::Value::from(5.0));
    }

    #[test]
    fn test_to_channel_saturates() {
        assert_eq!(to_channel(-3.0), 0);
        assert_eq!(to_channel(254.6), 255);
        assert_eq!(to_channel(300.0), 255);
    }
}
