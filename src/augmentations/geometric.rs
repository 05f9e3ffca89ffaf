//! Geometric augmentations.
//!
//! These move pixels and remap annotation boxes consistently. Boxes that end
//! up mostly outside the output image are dropped.

use image::RgbImage;
use image::imageops::{self, FilterType};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::geometry::{Affine, transform_boxes, warp_affine};
use super::{AugmentationError, AugmentationKind, Augmented, TypedAugmentation, ValueRange};
use crate::annotation::AnnotationArray;

/// Warp on the same canvas size, centered on the image center.
fn warp_centered(
    name: &str,
    image: &RgbImage,
    boxes: &AnnotationArray,
    around_origin: &Affine,
) -> Result<Augmented, AugmentationError> {
    let (width, height) = image.dimensions();
    let forward = around_origin.about(f64::from(width) / 2.0, f64::from(height) / 2.0);
    let warped = warp_affine(image, &forward, width, height).ok_or_else(|| {
        AugmentationError::invalid_parameter(name, "transform", "resulting map is singular")
    })?;
    Ok((warped, transform_boxes(boxes, &forward, width, height)))
}

/// Mirrors the image left to right.
pub struct HorizontalFlip {
    params: HorizontalFlipParams,
}

/// HorizontalFlip takes no options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HorizontalFlipParams {}

impl TypedAugmentation for HorizontalFlip {
    const NAME: &'static str = "HorizontalFlip";
    const KIND: AugmentationKind = AugmentationKind::Geometric;
    type Params = HorizontalFlipParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        Ok(Self { params })
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn transform(
        &self,
        _rng: &mut StdRng,
        image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        let (width, height) = image.dimensions();
        let mirror = Affine::mirror_x(f64::from(width));
        Ok((
            imageops::flip_horizontal(&image),
            transform_boxes(&boxes, &mirror, width, height),
        ))
    }
}

/// Mirrors the image top to bottom.
pub struct VerticalFlip {
    params: VerticalFlipParams,
}

/// VerticalFlip takes no options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerticalFlipParams {}

impl TypedAugmentation for VerticalFlip {
    const NAME: &'static str = "VerticalFlip";
    const KIND: AugmentationKind = AugmentationKind::Geometric;
    type Params = VerticalFlipParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        Ok(Self { params })
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn transform(
        &self,
        _rng: &mut StdRng,
        image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        let (width, height) = image.dimensions();
        let mirror = Affine::mirror_y(f64::from(height));
        Ok((
            imageops::flip_vertical(&image),
            transform_boxes(&boxes, &mirror, width, height),
        ))
    }
}

/// Rotates around the image center by a random angle (degrees).
pub struct Rotate {
    params: RotateParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotateParams {
    /// Angle in degrees, in `[-360, 360]`.
    pub angle: ValueRange,
}

impl Default for RotateParams {
    fn default() -> Self {
        Self {
            angle: ValueRange::new(-30.0, 30.0),
        }
    }
}

impl TypedAugmentation for Rotate {
    const NAME: &'static str = "Rotate";
    const KIND: AugmentationKind = AugmentationKind::Geometric;
    type Params = RotateParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        params.angle.validate(Self::NAME, "angle", -360.0, 360.0)?;
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
        let angle = self.params.angle.sample(rng);
        log::trace!("{}: angle {:.3}", Self::NAME, angle);
        warp_centered(Self::NAME, &image, &boxes, &Affine::rotation(angle))
    }
}

/// Zooms around the image center by a random factor, keeping the canvas size.
pub struct Scale {
    params: ScaleParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleParams {
    /// Zoom factor, in `(0, 10]`.
    pub factor: ValueRange,
}

impl Default for ScaleParams {
    fn default() -> Self {
        Self {
            factor: ValueRange::new(0.8, 1.2),
        }
    }
}

impl TypedAugmentation for Scale {
    const NAME: &'static str = "Scale";
    const KIND: AugmentationKind = AugmentationKind::Geometric;
    type Params = ScaleParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        params.factor.validate(Self::NAME, "factor", 0.0, 10.0)?;
        if params.factor.min <= 0.0 {
            return Err(AugmentationError::invalid_parameter(
                Self::NAME,
                "factor",
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
        let factor = self.params.factor.sample(rng);
        log::trace!("{}: factor {:.3}", Self::NAME, factor);
        warp_centered(Self::NAME, &image, &boxes, &Affine::scaling(factor, factor))
    }
}

/// Shears horizontally around the image center.
pub struct Shear {
    params: ShearParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShearParams {
    /// Shear factor `k` in `x' = x + k*y`, in `[-2, 2]`.
    pub factor: ValueRange,
}

impl Default for ShearParams {
    fn default() -> Self {
        Self {
            factor: ValueRange::new(-0.2, 0.2),
        }
    }
}

impl TypedAugmentation for Shear {
    const NAME: &'static str = "Shear";
    const KIND: AugmentationKind = AugmentationKind::Geometric;
    type Params = ShearParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        params.factor.validate(Self::NAME, "factor", -2.0, 2.0)?;
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
        warp_centered(Self::NAME, &image, &boxes, &Affine::shear_x(factor))
    }
}

/// Shifts the image by random fractions of its width and height.
pub struct Translate {
    params: TranslateParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslateParams {
    /// Horizontal shift as a fraction of the width, in `[-1, 1]`.
    pub x_fraction: ValueRange,
    /// Vertical shift as a fraction of the height, in `[-1, 1]`.
    pub y_fraction: ValueRange,
}

impl Default for TranslateParams {
    fn default() -> Self {
        Self {
            x_fraction: ValueRange::new(-0.2, 0.2),
            y_fraction: ValueRange::new(-0.2, 0.2),
        }
    }
}

impl TypedAugmentation for Translate {
    const NAME: &'static str = "Translate";
    const KIND: AugmentationKind = AugmentationKind::Geometric;
    type Params = TranslateParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        params.x_fraction.validate(Self::NAME, "x_fraction", -1.0, 1.0)?;
        params.y_fraction.validate(Self::NAME, "y_fraction", -1.0, 1.0)?;
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
        let (width, height) = image.dimensions();
        let dx = (self.params.x_fraction.sample(rng) * f64::from(width)).round();
        let dy = (self.params.y_fraction.sample(rng) * f64::from(height)).round();
        log::trace!("{}: shift ({}, {})", Self::NAME, dx, dy);
        warp_centered(Self::NAME, &image, &boxes, &Affine::translation(dx, dy))
    }
}

/// Crops a random window whose sides are random fractions of the original.
pub struct RandomCrop {
    params: RandomCropParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomCropParams {
    /// Smallest side length kept, as a fraction of the original, in `(0, 1]`.
    pub min_fraction: f64,
}

impl Default for RandomCropParams {
    fn default() -> Self {
        Self { min_fraction: 0.6 }
    }
}

impl TypedAugmentation for RandomCrop {
    const NAME: &'static str = "RandomCrop";
    const KIND: AugmentationKind = AugmentationKind::Geometric;
    type Params = RandomCropParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        if !(params.min_fraction > 0.0 && params.min_fraction <= 1.0) {
            return Err(AugmentationError::invalid_parameter(
                Self::NAME,
                "min_fraction",
                format!("{} is not in (0, 1]", params.min_fraction),
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
        let (width, height) = image.dimensions();
        let sides = ValueRange::new(self.params.min_fraction, 1.0);

        let crop_width = ((sides.sample(rng) * f64::from(width)).round() as u32).clamp(1, width);
        let crop_height = ((sides.sample(rng) * f64::from(height)).round() as u32).clamp(1, height);
        let x = rng.gen_range(0..=width - crop_width);
        let y = rng.gen_range(0..=height - crop_height);
        log::trace!(
            "{}: window {}x{} at ({}, {})",
            Self::NAME,
            crop_width,
            crop_height,
            x,
            y
        );

        let cropped = imageops::crop_imm(&image, x, y, crop_width, crop_height).to_image();
        let shift = Affine::translation(-f64::from(x), -f64::from(y));
        Ok((
            cropped,
            transform_boxes(&boxes, &shift, crop_width, crop_height),
        ))
    }
}

/// Resizes to a fixed output size.
pub struct Resize {
    params: ResizeParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
}

impl Default for ResizeParams {
    fn default() -> Self {
        Self {
            width: 128,
            height: 96,
        }
    }
}

impl TypedAugmentation for Resize {
    const NAME: &'static str = "Resize";
    const KIND: AugmentationKind = AugmentationKind::Geometric;
    type Params = ResizeParams;

    fn from_params(params: Self::Params) -> Result<Self, AugmentationError> {
        if params.width == 0 || params.height == 0 {
            return Err(AugmentationError::invalid_parameter(
                Self::NAME,
                "width/height",
                "output size must be non-zero",
            ));
        }
        Ok(Self { params })
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn transform(
        &self,
        _rng: &mut StdRng,
        image: RgbImage,
        boxes: AnnotationArray,
    ) -> Result<Augmented, AugmentationError> {
        let ResizeParams { width, height } = self.params;
        let scale = Affine::scaling(
            f64::from(width) / f64::from(image.width()),
            f64::from(height) / f64::from(image.height()),
        );
        Ok((
            imageops::resize(&image, width, height, FilterType::Triangle),
            transform_boxes(&boxes, &scale, width, height),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augmentations::{Augmentation, Options, seeded_rng};
    use image::Rgb;
    use ndarray::array;

    fn image() -> RgbImage {
        RgbImage::from_fn(40, 20, |x, y| Rgb([(x * 6) as u8, (y * 12) as u8, 30]))
    }

    fn boxes() -> AnnotationArray {
        array![[4.0, 2.0, 14.0, 10.0, 1.0], [20.0, 5.0, 36.0, 18.0, 2.0]]
    }

    fn run<T: TypedAugmentation>(options: &str) -> Augmented {
        let options: Options = serde_yaml::from_str(options).unwrap();
        T::from_options(&options)
            .unwrap()
            .augment(&mut seeded_rng(1), image(), boxes())
            .unwrap()
    }

    #[test]
    fn test_horizontal_flip() {
        let (flipped, out) = run::<HorizontalFlip>("{}");
        assert_eq!(*flipped.get_pixel(0, 3), *image().get_pixel(39, 3));
        assert_eq!(
            out,
            array![[26.0, 2.0, 36.0, 10.0, 1.0], [4.0, 5.0, 20.0, 18.0, 2.0]]
        );
    }

    #[test]
    fn test_vertical_flip() {
        let (flipped, out) = run::<VerticalFlip>("{}");
        assert_eq!(*flipped.get_pixel(5, 0), *image().get_pixel(5, 19));
        assert_eq!(
            out,
            array![[4.0, 10.0, 14.0, 18.0, 1.0], [20.0, 2.0, 36.0, 15.0, 2.0]]
        );
    }

    #[test]
    fn test_double_flip_is_identity() {
        let flip = HorizontalFlip::from_options(&Options::new()).unwrap();
        let mut rng = seeded_rng(1);
        let (once, boxes_once) = flip.augment(&mut rng, image(), boxes()).unwrap();
        let (twice, boxes_twice) = flip.augment(&mut rng, once, boxes_once).unwrap();
        assert_eq!(twice, image());
        assert_eq!(boxes_twice, boxes());
    }

    #[test]
    fn test_zero_rotation_is_identity() {
        let (rotated, out) = run::<Rotate>("angle: 0");
        assert_eq!(rotated, image());
        assert_eq!(out, boxes());
    }

    #[test]
    fn test_rotation_grows_boxes() {
        let (_, out) = run::<Rotate>("angle: 45");
        let before = (boxes()[[0, 2]] - boxes()[[0, 0]]) * (boxes()[[0, 3]] - boxes()[[0, 1]]);
        let after = (out[[0, 2]] - out[[0, 0]]) * (out[[0, 3]] - out[[0, 1]]);
        assert!(after > before);
        assert_eq!(out[[0, 4]], 1.0);
    }

    #[test]
    fn test_resize_scales_boxes() {
        let (resized, out) = run::<Resize>("{width: 20, height: 10}");
        assert_eq!(resized.dimensions(), (20, 10));
        assert_eq!(
            out,
            array![[2.0, 1.0, 7.0, 5.0, 1.0], [10.0, 2.5, 18.0, 9.0, 2.0]]
        );
    }

    #[test]
    fn test_random_crop_stays_inside() {
        let (cropped, out) = run::<RandomCrop>("min_fraction: 0.5");
        let (w, h) = cropped.dimensions();
        assert!((20..=40).contains(&w) && (10..=20).contains(&h));
        for row in out.rows() {
            assert!(row[0] >= 0.0 && row[2] <= f64::from(w));
            assert!(row[1] >= 0.0 && row[3] <= f64::from(h));
        }
    }

    #[test]
    fn test_translate_is_seeded() {
        assert_eq!(run::<Translate>("{}"), run::<Translate>("{}"));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Scale::from_params(ScaleParams { factor: ValueRange::fixed(0.0) }).is_err());
        assert!(RandomCrop::from_params(RandomCropParams { min_fraction: 0.0 }).is_err());
        assert!(Resize::from_params(ResizeParams { width: 0, height: 5 }).is_err());
        assert!(Rotate::from_params(RotateParams { angle: ValueRange::new(10.0, -10.0) }).is_err());
    }
}
