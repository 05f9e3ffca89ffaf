//! Sample image fixture.
//!
//! Snapshot cases run every augmentation on the same image and annotations.
//! The default sample is generated procedurally so the fixture is identical
//! on every machine; a sample can also be loaded from an image file plus a
//! four-corner annotation file.

use std::path::Path;

use image::{Rgb, RgbImage};
use thiserror::Error;

use crate::annotation::{Annotation, BoundingBox};
use crate::constants::{SAMPLE_HEIGHT, SAMPLE_WIDTH};
use crate::writers::{WriterError, read_four_corners_csv};

/// Errors that can occur while loading a sample from disk.
#[derive(Error, Debug)]
pub enum SampleError {
    /// Image could not be opened or decoded
    #[error("Failed to load sample image {path:?}: {source}")]
    Image {
        /// Path of the image
        path: std::path::PathBuf,
        /// Underlying error
        #[source]
        source: image::ImageError,
    },

    /// Annotation file could not be read
    #[error("Failed to load sample annotations: {0}")]
    Annotations(#[from] WriterError),
}

/// An image paired with its annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: RgbImage,
    pub annotations: Vec<Annotation>,
}

/// Class indices of the generated sample's objects.
pub mod classes {
    pub const CHECKERBOARD: u32 = 0;
    pub const DISC: u32 = 1;
    pub const RINGS: u32 = 2;
    pub const NOISE: u32 = 3;
}

/// Object regions of the generated sample, as fractions of width/height.
const CHECKERBOARD_REGION: [f64; 4] = [0.09375, 0.125, 0.34375, 0.458333];
const DISC_REGION: [f64; 4] = [0.546875, 0.145833, 0.828125, 0.520833];
const RINGS_REGION: [f64; 4] = [0.46875, 0.572917, 0.90625, 0.916667];
const NOISE_REGION: [f64; 4] = [0.0625, 0.583333, 0.375, 0.916667];

impl Sample {
    /// Generate the default sample at the standard size.
    pub fn generate() -> Self {
        generate_sample(SAMPLE_WIDTH, SAMPLE_HEIGHT)
    }

    /// Load an image and the annotations in a four-corner file.
    ///
    /// Rows are matched to the image by file name; a file with a single
    /// image id is accepted regardless of name.
    pub fn load(
        image_path: &Path,
        annotations_path: &Path,
        normalized: bool,
    ) -> Result<Self, SampleError> {
        let image = image::open(image_path)
            .map_err(|source| SampleError::Image {
                path: image_path.to_path_buf(),
                source,
            })?
            .to_rgb8();

        let dimensions = normalized.then(|| image.dimensions());
        let records = read_four_corners_csv(annotations_path, dimensions)?;

        let file_name = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let single_image = records
            .first()
            .is_some_and(|first| records.iter().all(|r| r.image_id == first.image_id));

        let annotations: Vec<Annotation> = records
            .into_iter()
            .filter(|r| single_image || r.image_id == file_name)
            .map(|r| r.annotation)
            .collect();

        log::info!(
            "Loaded sample {:?}: {}x{} with {} annotations",
            image_path,
            image.width(),
            image.height(),
            annotations.len()
        );

        Ok(Self { image, annotations })
    }
}

fn region_box(region: [f64; 4], width: u32, height: u32) -> BoundingBox {
    let (w, h) = (f64::from(width), f64::from(height));
    BoundingBox::new(
        (region[0] * w).round(),
        (region[1] * h).round(),
        (region[2] * w).round(),
        (region[3] * h).round(),
    )
}

/// Generate a sample image with four distinct, annotated objects.
///
/// - Background: diagonal color gradient
/// - Class 0: checkerboard
/// - Class 1: red disc
/// - Class 2: concentric rings
/// - Class 3: noise-like texture
pub fn generate_sample(width: u32, height: u32) -> Sample {
    log::debug!("Generating sample image: {}x{}", width, height);

    let annotations = vec![
        Annotation::new(
            region_box(CHECKERBOARD_REGION, width, height),
            classes::CHECKERBOARD,
        ),
        Annotation::new(region_box(DISC_REGION, width, height), classes::DISC),
        Annotation::new(region_box(RINGS_REGION, width, height), classes::RINGS),
        Annotation::new(region_box(NOISE_REGION, width, height), classes::NOISE),
    ];

    let image = RgbImage::from_fn(width, height, |x, y| {
        let px = f64::from(x) + 0.5;
        let py = f64::from(y) + 0.5;
        for ann in &annotations {
            if ann.bbox.contains_point(px, py) {
                if let Some(pixel) = object_pixel(ann, px, py) {
                    return pixel;
                }
            }
        }
        background_pixel(x, y, width, height)
    });

    Sample { image, annotations }
}

fn background_pixel(x: u32, y: u32, width: u32, height: u32) -> Rgb<u8> {
    let fx = f64::from(x) / f64::from(width.max(1));
    let fy = f64::from(y) / f64::from(height.max(1));
    Rgb([
        (40.0 + fx * 150.0) as u8,
        (60.0 + fy * 120.0) as u8,
        (180.0 - (fx + fy) * 60.0) as u8,
    ])
}

/// Pixel of the object owning `ann`, or None where the object leaves the
/// background visible (outside the disc, between rings).
fn object_pixel(ann: &Annotation, px: f64, py: f64) -> Option<Rgb<u8>> {
    let b = &ann.bbox;
    let (lx, ly) = (px - b.x_min, py - b.y_min);
    let (cx, cy) = (b.x_min + b.width() / 2.0, b.y_min + b.height() / 2.0);
    let dist = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();

    match ann.class_idx {
        classes::CHECKERBOARD => {
            let checker = ((lx / 8.0) as u32 + (ly / 8.0) as u32) % 2 == 0;
            Some(if checker {
                Rgb([235, 235, 235])
            } else {
                Rgb([20, 20, 20])
            })
        }
        classes::DISC => {
            let radius = b.width().min(b.height()) / 2.0;
            (dist <= radius).then_some(Rgb([220, 40, 40]))
        }
        classes::RINGS => {
            let wave = (dist * 0.5).sin();
            (wave > 0.0).then(|| Rgb([30, (120.0 + wave * 120.0) as u8, 200]))
        }
        classes::NOISE => {
            let noise = ((px * 12.9898 + py * 78.233).sin() * 43758.5453).fract().abs();
            let value = (noise * 255.0) as u8;
            Some(Rgb([value, value / 2, 255 - value]))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_sample_is_stable() {
        assert_eq!(Sample::generate(), Sample::generate());
    }

    #[test]
    fn test_generated_annotations() {
        let sample = Sample::generate();
        assert_eq!(sample.image.dimensions(), (SAMPLE_WIDTH, SAMPLE_HEIGHT));
        assert_eq!(sample.annotations.len(), 4);
        assert_eq!(
            sample.annotations[0].bbox,
            BoundingBox::new(24.0, 24.0, 88.0, 88.0)
        );
        for ann in &sample.annotations {
            assert!(ann.bbox.area() > 0.0);
            assert!(ann.bbox.x_max <= f64::from(SAMPLE_WIDTH));
            assert!(ann.bbox.y_max <= f64::from(SAMPLE_HEIGHT));
        }
    }

    #[test]
    fn test_disc_is_red() {
        let sample = Sample::generate();
        let disc = sample.annotations[1].bbox;
        let center = sample.image.get_pixel(
            ((disc.x_min + disc.x_max) / 2.0) as u32,
            ((disc.y_min + disc.y_max) / 2.0) as u32,
        );
        assert_eq!(*center, Rgb([220, 40, 40]));
    }

    #[test]
    fn test_load_round_trip() {
        use crate::writers::{FourCornersCsvWriter, save_image};

        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("sample.png");
        let annotations_path = dir.path().join("sample.csv");
        let sample = generate_sample(64, 48);

        save_image(&image_path, &sample.image, 90).unwrap();
        let mut writer = FourCornersCsvWriter::create(&annotations_path, false).unwrap();
        writer
            .write_annotations_for_image("sample.png", &sample.image, &sample.annotations)
            .unwrap();
        writer.finish().unwrap();

        assert_eq!(Sample::load(&image_path, &annotations_path, false).unwrap(), sample);
    }

    #[test]
    fn test_load_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let err = Sample::load(&dir.path().join("nope.png"), &dir.path().join("nope.csv"), true)
            .unwrap_err();
        assert!(matches!(err, SampleError::Image { .. }));
    }
}
