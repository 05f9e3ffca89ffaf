//! Bounding-box annotations and their numeric array encoding.
//!
//! Augmentations operate on an `N x 5` array with one row per annotation:
//! `[x_min, y_min, x_max, y_max, class_idx]`. The conversion between
//! [`Annotation`] lists and that array is lossless in both directions.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of columns in an annotation array.
pub const ANNOTATION_COLUMNS: usize = 5;

/// Column holding the class index.
pub const CLASS_COLUMN: usize = 4;

/// Annotation array: one `[x_min, y_min, x_max, y_max, class_idx]` row per box.
pub type AnnotationArray = Array2<f64>;

/// Errors produced when decoding an annotation array.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotationError {
    /// The array does not have exactly five columns
    #[error("Annotation array must have {expected} columns, found {found}")]
    WrongShape {
        /// Expected column count
        expected: usize,
        /// Actual column count
        found: usize,
    },

    /// A coordinate is NaN or infinite
    #[error("Non-finite coordinate in annotation row {row}")]
    NonFinite {
        /// Offending row
        row: usize,
    },

    /// The class column is not a non-negative integer that fits in `u32`
    #[error("Invalid class index {value} in annotation row {row}")]
    InvalidClass {
        /// Offending row
        row: usize,
        /// Value found in the class column
        value: f64,
    },
}

/// Axis-aligned bounding box given by its corner coordinates (image pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    /// Create a box from its corner coordinates as given.
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Create a normalized box from two arbitrary opposite corners.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2))
    }

    /// Smallest box enclosing all given points. Returns None for no points.
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut points = points.into_iter();
        let (x, y) = points.next()?;
        let mut bbox = Self::new(x, y, x, y);
        for (x, y) in points {
            bbox.x_min = bbox.x_min.min(x);
            bbox.y_min = bbox.y_min.min(y);
            bbox.x_max = bbox.x_max.max(x);
            bbox.y_max = bbox.y_max.max(y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// The four corners, clockwise from top-left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.x_min, self.y_min),
            (self.x_max, self.y_min),
            (self.x_max, self.y_max),
            (self.x_min, self.y_max),
        ]
    }

    /// Clip the box to `[0, width] x [0, height]`.
    pub fn clipped(&self, width: f64, height: f64) -> Self {
        Self::new(
            self.x_min.clamp(0.0, width),
            self.y_min.clamp(0.0, height),
            self.x_max.clamp(0.0, width),
            self.y_max.clamp(0.0, height),
        )
    }

    /// Check if a point lies inside the box (edges included).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    fn is_finite(&self) -> bool {
        self.x_min.is_finite()
            && self.y_min.is_finite()
            && self.x_max.is_finite()
            && self.y_max.is_finite()
    }
}

/// A labelled bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// The box geometry.
    pub bbox: BoundingBox,
    /// Class index of the labelled object.
    pub class_idx: u32,
}

impl Annotation {
    /// Create a new annotation with the given box and class.
    pub fn new(bbox: BoundingBox, class_idx: u32) -> Self {
        Self { bbox, class_idx }
    }
}

/// Encode annotations as an `N x 5` array.
pub fn annotations_to_array(annotations: &[Annotation]) -> AnnotationArray {
    let mut array = Array2::zeros((annotations.len(), ANNOTATION_COLUMNS));
    for (mut row, ann) in array.rows_mut().into_iter().zip(annotations) {
        row[0] = ann.bbox.x_min;
        row[1] = ann.bbox.y_min;
        row[2] = ann.bbox.x_max;
        row[3] = ann.bbox.y_max;
        row[CLASS_COLUMN] = f64::from(ann.class_idx);
    }
    array
}

/// Decode an `N x 5` array back into annotations.
pub fn annotations_from_array(array: ArrayView2<'_, f64>) -> Result<Vec<Annotation>, AnnotationError> {
    if array.ncols() != ANNOTATION_COLUMNS {
        return Err(AnnotationError::WrongShape {
            expected: ANNOTATION_COLUMNS,
            found: array.ncols(),
        });
    }

    array
        .rows()
        .into_iter()
        .enumerate()
        .map(|(row_idx, row)| {
            let bbox = BoundingBox::new(row[0], row[1], row[2], row[3]);
            if !bbox.is_finite() {
                return Err(AnnotationError::NonFinite { row: row_idx });
            }
            let class_idx = class_from_f64(row[CLASS_COLUMN]).ok_or(
                AnnotationError::InvalidClass {
                    row: row_idx,
                    value: row[CLASS_COLUMN],
                },
            )?;
            Ok(Annotation::new(bbox, class_idx))
        })
        .collect()
}

fn class_from_f64(value: f64) -> Option<u32> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) {
        Some(value as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;

    fn arb_annotation() -> impl Strategy<Value = Annotation> {
        let coordinate = -1.0e6f64..1.0e6;
        (
            coordinate.clone(),
            coordinate.clone(),
            coordinate.clone(),
            coordinate,
            any::<u32>(),
        )
            .prop_map(|(x1, y1, x2, y2, class_idx)| {
                Annotation::new(BoundingBox::from_corners(x1, y1, x2, y2), class_idx)
            })
    }

    proptest! {
        #[test]
        fn prop_array_round_trip(annotations in prop::collection::vec(arb_annotation(), 0..32)) {
            let array = annotations_to_array(&annotations);
            prop_assert_eq!(array.dim(), (annotations.len(), ANNOTATION_COLUMNS));
            prop_assert_eq!(annotations_from_array(array.view()).unwrap(), annotations);
        }
    }

    fn sample_annotations() -> Vec<Annotation> {
        vec![
            Annotation::new(BoundingBox::new(10.0, 20.0, 50.5, 80.25), 0),
            Annotation::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 7),
            Annotation::new(BoundingBox::new(100.125, 3.0, 120.0, 64.0), 4_000_000_000),
        ]
    }

    #[test]
    fn test_round_trip_is_exact() {
        let annotations = sample_annotations();
        let array = annotations_to_array(&annotations);

        assert_eq!(array.dim(), (3, ANNOTATION_COLUMNS));
        assert_eq!(annotations_from_array(array.view()).unwrap(), annotations);
    }

    #[test]
    fn test_empty_round_trip() {
        let array = annotations_to_array(&[]);
        assert_eq!(array.dim(), (0, ANNOTATION_COLUMNS));
        assert!(annotations_from_array(array.view()).unwrap().is_empty());
    }

    #[test]
    fn test_array_layout() {
        let array = annotations_to_array(&sample_annotations()[..1]);
        assert_eq!(array, array![[10.0, 20.0, 50.5, 80.25, 0.0]]);
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let array = Array2::<f64>::zeros((2, 4));
        assert_eq!(
            annotations_from_array(array.view()),
            Err(AnnotationError::WrongShape {
                expected: 5,
                found: 4
            })
        );
    }

    #[test]
    fn test_invalid_class_rejected() {
        let fractional = array![[0.0, 0.0, 1.0, 1.0, 1.5]];
        let negative = array![[0.0, 0.0, 1.0, 1.0, -1.0]];

        assert!(matches!(
            annotations_from_array(fractional.view()),
            Err(AnnotationError::InvalidClass { row: 0, .. })
        ));
        assert!(matches!(
            annotations_from_array(negative.view()),
            Err(AnnotationError::InvalidClass { row: 0, .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let array = array![[0.0, 0.0, 1.0, 1.0, 0.0], [f64::NAN, 0.0, 1.0, 1.0, 0.0]];
        assert_eq!(
            annotations_from_array(array.view()),
            Err(AnnotationError::NonFinite { row: 1 })
        );
    }

    #[test]
    fn test_enclosing_and_corners() {
        let bbox = BoundingBox::from_corners(30.0, 40.0, 10.0, 5.0);
        assert_eq!(bbox, BoundingBox::new(10.0, 5.0, 30.0, 40.0));
        assert_eq!(BoundingBox::enclosing(bbox.corners()), Some(bbox));
        assert_eq!(BoundingBox::enclosing(Vec::new()), None);
        assert_eq!(bbox.area(), 20.0 * 35.0);
    }

    #[test]
    fn test_clipped() {
        let bbox = BoundingBox::new(-10.0, 5.0, 40.0, 200.0);
        assert_eq!(bbox.clipped(32.0, 100.0), BoundingBox::new(0.0, 5.0, 32.0, 100.0));
        assert!(bbox.contains_point(0.0, 5.0));
        assert!(!bbox.contains_point(41.0, 5.0));
    }
}
