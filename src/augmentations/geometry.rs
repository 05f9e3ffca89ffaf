//! Affine maps shared by the geometric augmentations.
//!
//! Images are warped by inverse mapping with bilinear sampling; boxes are
//! warped by mapping their four corners and taking the enclosing box.

use image::{Rgb, RgbImage};

use crate::annotation::{ANNOTATION_COLUMNS, AnnotationArray, BoundingBox, CLASS_COLUMN};
use crate::constants::MIN_VISIBLE_AREA_FRACTION;

/// Pixel value used where a warp uncovers the canvas.
const FILL: Rgb<u8> = Rgb([0, 0, 0]);

/// 2D affine map `(x, y) -> (a*x + b*y + c, d*x + e*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            c: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            e: sy,
            ..Self::IDENTITY
        }
    }

    /// Rotation by `degrees`, counter-clockwise as seen on screen (y down).
    pub fn rotation(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            a: cos,
            b: sin,
            c: 0.0,
            d: -sin,
            e: cos,
            f: 0.0,
        }
    }

    /// Horizontal shear: `x' = x + k*y`.
    pub fn shear_x(k: f64) -> Self {
        Self {
            b: k,
            ..Self::IDENTITY
        }
    }

    /// Mirror across the vertical line `x = width / 2`.
    pub fn mirror_x(width: f64) -> Self {
        Self {
            a: -1.0,
            c: width,
            ..Self::IDENTITY
        }
    }

    /// Mirror across the horizontal line `y = height / 2`.
    pub fn mirror_y(height: f64) -> Self {
        Self {
            e: -1.0,
            f: height,
            ..Self::IDENTITY
        }
    }

    /// Apply `self`, then `next`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: next.a * self.a + next.b * self.d,
            b: next.a * self.b + next.b * self.e,
            c: next.a * self.c + next.b * self.f + next.c,
            d: next.d * self.a + next.e * self.d,
            e: next.d * self.b + next.e * self.e,
            f: next.d * self.c + next.e * self.f + next.f,
        }
    }

    /// Conjugate this map so it acts around `(cx, cy)` instead of the origin.
    pub fn about(&self, cx: f64, cy: f64) -> Affine {
        Affine::translation(-cx, -cy)
            .then(self)
            .then(&Affine::translation(cx, cy))
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }

    /// Inverse map, or None if the map is singular.
    pub fn inverse(&self) -> Option<Affine> {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Some(Affine {
            a,
            b,
            c: -(a * self.c + b * self.f),
            d,
            e,
            f: -(d * self.c + e * self.f),
        })
    }
}

/// Warp `image` by `forward` onto an `out_width x out_height` canvas.
///
/// Returns None if `forward` is singular.
pub fn warp_affine(
    image: &RgbImage,
    forward: &Affine,
    out_width: u32,
    out_height: u32,
) -> Option<RgbImage> {
    let inverse = forward.inverse()?;
    let mut output = RgbImage::from_pixel(out_width, out_height, FILL);

    for (x, y, pixel) in output.enumerate_pixels_mut() {
        // Pixel centers sit at half-integer coordinates
        let (sx, sy) = inverse.apply(f64::from(x) + 0.5, f64::from(y) + 0.5);
        if let Some(sampled) = sample_bilinear(image, sx - 0.5, sy - 0.5) {
            *pixel = sampled;
        }
    }

    Some(output)
}

fn sample_bilinear(image: &RgbImage, u: f64, v: f64) -> Option<Rgb<u8>> {
    let (width, height) = (f64::from(image.width()), f64::from(image.height()));
    if u <= -1.0 || v <= -1.0 || u >= width || v >= height {
        return None;
    }

    let x0 = u.floor();
    let y0 = v.floor();
    let fx = u - x0;
    let fy = v - y0;

    let fetch = |x: f64, y: f64| -> [f64; 3] {
        if x < 0.0 || y < 0.0 || x >= width || y >= height {
            return FILL.0.map(f64::from);
        }
        image.get_pixel(x as u32, y as u32).0.map(f64::from)
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1.0, y0);
    let p01 = fetch(x0, y0 + 1.0);
    let p11 = fetch(x0 + 1.0, y0 + 1.0);

    let mut out = [0u8; 3];
    for (channel, value) in out.iter_mut().enumerate() {
        let top = p00[channel] * (1.0 - fx) + p10[channel] * fx;
        let bottom = p01[channel] * (1.0 - fx) + p11[channel] * fx;
        *value = super::to_channel(top * (1.0 - fy) + bottom * fy);
    }
    Some(Rgb(out))
}

/// Map every box through `forward`, clip to the output canvas and drop boxes
/// that are mostly outside it.
pub fn transform_boxes(
    boxes: &AnnotationArray,
    forward: &Affine,
    out_width: u32,
    out_height: u32,
) -> AnnotationArray {
    let (width, height) = (f64::from(out_width), f64::from(out_height));
    let mut kept: Vec<[f64; ANNOTATION_COLUMNS]> = Vec::with_capacity(boxes.nrows());

    for row in boxes.rows() {
        let original = BoundingBox::new(row[0], row[1], row[2], row[3]);
        let Some(hull) =
            BoundingBox::enclosing(original.corners().map(|(x, y)| forward.apply(x, y)))
        else {
            continue;
        };
        let clipped = hull.clipped(width, height);

        if clipped.area() > 0.0 && clipped.area() >= MIN_VISIBLE_AREA_FRACTION * hull.area() {
            kept.push([
                clipped.x_min,
                clipped.y_min,
                clipped.x_max,
                clipped.y_max,
                row[CLASS_COLUMN],
            ]);
        } else {
            log::warn!(
                "Dropping box of class {} ({:.1}% visible)",
                row[CLASS_COLUMN],
                if hull.area() > 0.0 {
                    100.0 * clipped.area() / hull.area()
                } else {
                    0.0
                }
            );
        }
    }

    let mut result = AnnotationArray::zeros((kept.len(), ANNOTATION_COLUMNS));
    for (mut row, values) in result.rows_mut().into_iter().zip(&kept) {
        for (slot, value) in row.iter_mut().zip(values) {
            *slot = *value;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: (f64, f64), b: (f64, f64)) {
        assert!((a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_inverse_round_trip() {
        let forward = Affine::rotation(30.0)
            .then(&Affine::scaling(1.5, 0.5))
            .then(&Affine::translation(4.0, -2.0));
        let inverse = forward.inverse().unwrap();
        let (x, y) = forward.apply(3.0, 7.0);
        assert_close(inverse.apply(x, y), (3.0, 7.0));
    }

    #[test]
    fn test_singular_has_no_inverse() {
        assert!(Affine::scaling(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_about_keeps_center_fixed() {
        let rotate = Affine::rotation(45.0).about(10.0, 20.0);
        assert_close(rotate.apply(10.0, 20.0), (10.0, 20.0));
    }

    #[test]
    fn test_mirror_boxes() {
        let boxes = array![[10.0, 5.0, 30.0, 15.0, 2.0]];
        let mirrored = transform_boxes(&boxes, &Affine::mirror_x(100.0), 100, 50);
        assert_eq!(mirrored, array![[70.0, 5.0, 90.0, 15.0, 2.0]]);
    }

    #[test]
    fn test_boxes_mostly_outside_are_dropped() {
        let boxes = array![[0.0, 0.0, 40.0, 40.0, 0.0], [50.0, 50.0, 60.0, 60.0, 1.0]];
        // Shift left by 35px: first box keeps 5/40 of its width, second stays whole
        let shifted = transform_boxes(&boxes, &Affine::translation(-35.0, 0.0), 100, 100);
        assert_eq!(shifted, array![[15.0, 50.0, 25.0, 60.0, 1.0]]);
    }

    #[test]
    fn test_identity_warp_preserves_pixels() {
        let image = RgbImage::from_fn(8, 6, |x, y| Rgb([(x * 30) as u8, (y * 40) as u8, 7]));
        let warped = warp_affine(&image, &Affine::IDENTITY, 8, 6).unwrap();
        assert_eq!(warped, image);
    }

    #[test]
    fn test_translation_warp_fills_black() {
        let image = RgbImage::from_pixel(4, 4, Rgb([200, 100, 50]));
        let warped = warp_affine(&image, &Affine::translation(2.0, 0.0), 4, 4).unwrap();
        assert_eq!(*warped.get_pixel(0, 0), FILL);
        assert_eq!(*warped.get_pixel(3, 3), Rgb([200, 100, 50]));
    }
}
