//! Four-corner CSV annotation files.
//!
//! One header line followed by one row per annotation:
//! `image_id,x_min,y_min,x_max,y_max,label`. Coordinates are optionally
//! normalized by the image width/height and always printed with a fixed
//! number of decimals so identical inputs give identical bytes.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::RgbImage;

use super::{FOUR_CORNERS_HEADER, WriterError};
use crate::annotation::{Annotation, BoundingBox};
use crate::constants::COORDINATE_PRECISION;

/// Writes annotations for one or more images to a single CSV file.
#[derive(Debug)]
pub struct FourCornersCsvWriter {
    path: PathBuf,
    normalized: bool,
    out: Option<BufWriter<File>>,
    rows: usize,
}

impl FourCornersCsvWriter {
    /// Create (truncate) the file at `path` and write the header.
    pub fn create(path: impl Into<PathBuf>, normalized: bool) -> Result<Self, WriterError> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| WriterError::io(&path, e))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{}", FOUR_CORNERS_HEADER).map_err(|e| WriterError::io(&path, e))?;

        Ok(Self {
            path,
            normalized,
            out: Some(out),
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row per annotation of `image_id`.
    ///
    /// `image` supplies the dimensions used for normalization.
    pub fn write_annotations_for_image(
        &mut self,
        image_id: &str,
        image: &RgbImage,
        annotations: &[Annotation],
    ) -> Result<(), WriterError> {
        if image_id.contains([',', '\n', '\r']) {
            return Err(WriterError::invalid_format(
                &self.path,
                self.rows + 2,
                format!("image id '{}' contains a field or line separator", image_id),
            ));
        }

        let (scale_x, scale_y) = if self.normalized {
            if image.width() == 0 || image.height() == 0 {
                return Err(WriterError::EmptyImage(image_id.to_string()));
            }
            (f64::from(image.width()), f64::from(image.height()))
        } else {
            (1.0, 1.0)
        };

        let path = &self.path;
        let out = self.out.as_mut().ok_or_else(|| {
            WriterError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "writer already finished"),
            )
        })?;

        for ann in annotations {
            let b = &ann.bbox;
            writeln!(
                out,
                "{},{:.p$},{:.p$},{:.p$},{:.p$},{}",
                image_id,
                b.x_min / scale_x,
                b.y_min / scale_y,
                b.x_max / scale_x,
                b.y_max / scale_y,
                ann.class_idx,
                p = COORDINATE_PRECISION
            )
            .map_err(|e| WriterError::io(path, e))?;
        }
        self.rows += annotations.len();
        Ok(())
    }

    /// Flush and close the file, returning the number of rows written.
    pub fn finish(mut self) -> Result<usize, WriterError> {
        if let Some(mut out) = self.out.take() {
            out.flush().map_err(|e| WriterError::io(&self.path, e))?;
        }
        log::debug!("Wrote {} annotation rows to {:?}", self.rows, self.path);
        Ok(self.rows)
    }
}

impl Drop for FourCornersCsvWriter {
    fn drop(&mut self) {
        if let Some(mut out) = self.out.take() {
            if let Err(e) = out.flush() {
                log::warn!("Failed to flush {:?}: {}", self.path, e);
            }
        }
    }
}

/// One row of a four-corner annotation file.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub image_id: String,
    pub annotation: Annotation,
}

/// Read a four-corner annotation file.
///
/// With `dimensions`, normalized coordinates are scaled back to pixels.
pub fn read_four_corners_csv(
    path: &Path,
    dimensions: Option<(u32, u32)>,
) -> Result<Vec<AnnotationRecord>, WriterError> {
    let content = std::fs::read_to_string(path).map_err(|e| WriterError::io(path, e))?;
    let (scale_x, scale_y) = dimensions.map_or((1.0, 1.0), |(w, h)| (f64::from(w), f64::from(h)));

    let mut lines = content.lines().enumerate();
    match lines.next() {
        Some((_, header)) if header.trim() == FOUR_CORNERS_HEADER => {}
        Some((_, header)) => {
            return Err(WriterError::invalid_format(
                path,
                1,
                format!("unexpected header '{}'", header),
            ));
        }
        None => return Err(WriterError::invalid_format(path, 1, "missing header")),
    }

    let mut records = Vec::new();
    for (idx, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 6 {
            return Err(WriterError::invalid_format(
                path,
                line_no,
                format!("expected 6 fields, found {}", fields.len()),
            ));
        }

        let coordinate = |i: usize| -> Result<f64, WriterError> {
            fields[i].trim().parse::<f64>().map_err(|e| {
                WriterError::invalid_format(path, line_no, format!("bad coordinate '{}': {}", fields[i], e))
            })
        };
        let bbox = BoundingBox::new(
            coordinate(1)? * scale_x,
            coordinate(2)? * scale_y,
            coordinate(3)? * scale_x,
            coordinate(4)? * scale_y,
        );
        let class_idx = fields[5].trim().parse::<u32>().map_err(|e| {
            WriterError::invalid_format(path, line_no, format!("bad label '{}': {}", fields[5], e))
        })?;

        records.push(AnnotationRecord {
            image_id: fields[0].to_string(),
            annotation: Annotation::new(bbox, class_idx),
        });
    }

    Ok(records)
}
