//! Color-only augmentations.
//!
//! These change pixel values only. Each returns the annotation array it was
//! given, untouched.

use image::{ImageFormat, RgbImage};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{
    AugmentationError, AugmentationKind, Augmented, TypedAugmentation, ValueRange, to_channel,
    validate_probability,
};
use crate::annotation::AnnotationArray;
use crate::writers::{ImageFileFormat, encode_image};

fn map_channels(mut image: RgbImage, f: impl Fn(u8) -> u8) -> RgbImage {
    for channel in image.iter_mut() {
        *channel = f(*channel);
    }
    image
}

/// Converts the image to gray, keeping three channels.
pub struct Grayscale {
    params: GrayscaleParams,
}

/// Grayscale takes no options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrayscaleParams {}

impl TypedAugmentation for Grayscale {
    const NAME: &'static str = "Grayscale";
    const KIND: AugmentationKind = AugmentationKind::Color;
    type Params = GrayscaleParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        Ok(Self { params })
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn transform(
        &self,
        _rng: &mut StdRng,
        mut image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        for pixel in image.pixels_mut() {
            let [r, g, b] = pixel.0.map(f64::from);
            let luma = to_channel(0.299 * r + 0.587 * g + 0.114 * b);
            pixel.0 = [luma; 3];
        }
        Ok((image, boxes))
    }
}

/// Adds one random offset to every channel.
pub struct Brightness {
    params: BrightnessParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrightnessParams {
    /// Offset added to every channel, in `[-255, 255]`.
    pub delta: ValueRange,
}

impl Default for BrightnessParams {
    fn default() -> Self {
        Self {
            delta: ValueRange::new(-40.0, 40.0),
        }
    }
}

impl TypedAugmentation for Brightness {
    const NAME: &'static str = "Brightness";
    const KIND: AugmentationKind = AugmentationKind::Color;
    type Params = BrightnessParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        params.delta.validate(Self::NAME, "delta", -255.0, 255.0)?;
        Ok(Self { params })
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn transform(
        &self,
        rng: &mut StdRng,
        image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        let delta = self.params.delta.sample(rng);
        log::trace!("{}: delta {:.3}", Self::NAME, delta);
        Ok((map_channels(image, |v| to_channel(f64::from(v) + delta)), boxes))
    }
}

/// Scales channel distance from mid-gray by one random factor.
pub struct Contrast {
    params: ContrastParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContrastParams {
    /// Contrast multiplier, in `[0, 10]`.
    pub factor: ValueRange,
}

impl Default for ContrastParams {
    fn default() -> Self {
        Self {
            factor: ValueRange::new(0.6, 1.4),
        }
    }
}

impl TypedAugmentation for Contrast {
    const NAME: &'static str = "Contrast";
    const KIND: AugmentationKind = AugmentationKind::Color;
    type Params = ContrastParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        params.factor.validate(Self::NAME, "factor", 0.0, 10.0)?;
        Ok(Self { params })
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn transform(
        &self,
        rng: &mut StdRng,
        image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        let factor = self.params.factor.sample(rng);
        log::trace!("{}: factor {:.3}", Self::NAME, factor);
        let image = map_channels(image, |v| to_channel((f64::from(v) - 128.0) * factor + 128.0));
        Ok((image, boxes))
    }
}

/// Adds independent normally distributed noise to every channel.
pub struct GaussianNoise {
    params: GaussianNoiseParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GaussianNoiseParams {
    pub mean: f64,
    /// Standard deviation, non-negative.
    pub std: f64,
}

impl Default for GaussianNoiseParams {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std: 10.0,
        }
    }
}

/// Draw a standard normal variate (Box-Muller).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

impl TypedAugmentation for GaussianNoise {
    const NAME: &'static str = "GaussianNoise";
    const KIND: AugmentationKind = AugmentationKind::Color;
    type Params = GaussianNoiseParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        if !params.mean.is_finite() {
            return Err(AugmentationError::invalid_parameter(
                Self::NAME,
                "mean",
                "must be finite",
            ));
        }
        if !params.std.is_finite() || params.std < 0.0 {
            return Err(AugmentationError::invalid_parameter(
                Self::NAME,
                "std",
                "must be a finite non-negative number",
            ));
        }
        Ok(Self { params })
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn transform(
        &self,
        rng: &mut StdRng,
        mut image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        let GaussianNoiseParams { mean, std } = self.params;
        for channel in image.iter_mut() {
            let noise = mean + std * standard_normal(rng);
            *channel = to_channel(f64::from(*channel) + noise);
        }
        Ok((image, boxes))
    }
}

/// Sets random pixels to white (salt) or black (pepper).
pub struct SaltAndPepper {
    params: SaltAndPepperParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaltAndPepperParams {
    /// Probability that a pixel is replaced.
    pub amount: f64,
    /// Probability that a replaced pixel is salt rather than pepper.
    pub salt_ratio: f64,
}

impl Default for SaltAndPepperParams {
    fn default() -> Self {
        Self {
            amount: 0.02,
            salt_ratio: 0.5,
        }
    }
}

impl TypedAugmentation for SaltAndPepper {
    const NAME: &'static str = "SaltAndPepper";
    const KIND: AugmentationKind = AugmentationKind::Color;
    type Params = SaltAndPepperParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        validate_probability(Self::NAME, "amount", params.amount)?;
        validate_probability(Self::NAME, "salt_ratio", params.salt_ratio)?;
        Ok(Self { params })
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn transform(
        &self,
        rng: &mut StdRng,
        mut image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        let mut replaced = 0usize;
        for pixel in image.pixels_mut() {
            if rng.gen_bool(self.params.amount) {
                let value = if rng.gen_bool(self.params.salt_ratio) {
                    u8::MAX
                } else {
                    0
                };
                pixel.0 = [value; 3];
                replaced += 1;
            }
        }
        log::trace!("{}: replaced {} pixels", Self::NAME, replaced);
        Ok((image, boxes))
    }
}

/// Gaussian blur with a random sigma.
pub struct GaussianBlur {
    params: GaussianBlurParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GaussianBlurParams {
    /// Blur sigma in pixels, in `(0, 50]`.
    pub sigma: ValueRange,
}

impl Default for GaussianBlurParams {
    fn default() -> Self {
        Self {
            sigma: ValueRange::new(0.5, 1.5),
        }
    }
}

impl TypedAugmentation for GaussianBlur {
    const NAME: &'static str = "GaussianBlur";
    const KIND: AugmentationKind = AugmentationKind::Color;
    type Params = GaussianBlurParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        params.sigma.validate(Self::NAME, "sigma", 0.0, 50.0)?;
        if params.sigma.min <= 0.0 {
            return Err(AugmentationError::invalid_parameter(
                Self::NAME,
                "sigma",
                "must be strictly positive",
            ));
        }
        Ok(Self { params })
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn transform(
        &self,
        rng: &mut StdRng,
        image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        let sigma = self.params.sigma.sample(rng) as f32;
        log::trace!("{}: sigma {:.3}", Self::NAME, sigma);
        Ok((image::imageops::blur(&image, sigma), boxes))
    }
}

/// Round-trips the image through a lossy JPEG encode at a random quality.
pub struct JpegCompression {
    params: JpegCompressionParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JpegCompressionParams {
    /// Encoder quality, in `[1, 100]`.
    pub quality: ValueRange,
}

impl Default for JpegCompressionParams {
    fn default() -> Self {
        Self {
            quality: ValueRange::new(20.0, 60.0),
        }
    }
}

impl TypedAugmentation for JpegCompression {
    const NAME: &'static str = "JpegCompression";
    const KIND: AugmentationKind = AugmentationKind::Color;
    type Params = JpegCompressionParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        params.quality.validate(Self::NAME, "quality", 1.0, 100.0)?;
        Ok(Self { params })
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn transform(
        &self,
        rng: &mut StdRng,
        image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        let quality = self.params.quality.sample(rng).round() as u8;
        log::trace!("{}: quality {}", Self::NAME, quality);
        let encoded = encode_image(&image, ImageFileFormat::Jpeg { quality })?;
        let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)?;
        Ok((decoded.to_rgb8(), boxes))
    }
}
