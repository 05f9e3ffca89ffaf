//! Image encoding and the directory image writer.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use serde::{Deserialize, Serialize};

use super::WriterError;
use crate::constants::DEFAULT_JPEG_QUALITY;

/// Encoding used for written images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum ImageFileFormat {
    /// Baseline JPEG at the given quality (1-100).
    Jpeg { quality: u8 },
    /// Lossless PNG.
    Png,
}

impl Default for ImageFileFormat {
    fn default() -> Self {
        ImageFileFormat::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ImageFileFormat {
    /// File extension written for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFileFormat::Jpeg { .. } => "jpg",
            ImageFileFormat::Png => "png",
        }
    }

    /// Resolve a format from a file extension. JPEG uses `jpeg_quality`.
    pub fn from_extension(extension: &str, jpeg_quality: u8) -> Result<Self, WriterError> {
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFileFormat::Jpeg {
                quality: jpeg_quality,
            }),
            "png" => Ok(ImageFileFormat::Png),
            other => Err(WriterError::UnsupportedExtension(other.to_string())),
        }
    }

    /// Resolve a format from a path's extension.
    pub fn from_path(path: &Path, jpeg_quality: u8) -> Result<Self, WriterError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| WriterError::UnsupportedExtension(path.display().to_string()))?;
        Self::from_extension(extension, jpeg_quality)
    }
}

/// Encode an RGB image to bytes.
pub fn encode_image(image: &RgbImage, format: ImageFileFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    let (width, height) = image.dimensions();
    match format {
        ImageFileFormat::Jpeg { quality } => {
            JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).write_image(
                image.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
        ImageFileFormat::Png => {
            PngEncoder::new(&mut bytes).write_image(
                image.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(bytes)
}

/// Encode and write an image, choosing the format from the path extension.
pub fn save_image(path: &Path, image: &RgbImage, jpeg_quality: u8) -> Result<(), WriterError> {
    let format = ImageFileFormat::from_path(path, jpeg_quality)?;
    write_encoded(path, &encode_image(image, format)?)
}

fn write_encoded(path: &Path, bytes: &[u8]) -> Result<(), WriterError> {
    let file = File::create(path).map_err(|e| WriterError::io(path, e))?;
    let mut out = BufWriter::new(file);
    out.write_all(bytes).map_err(|e| WriterError::io(path, e))?;
    out.flush().map_err(|e| WriterError::io(path, e))?;
    log::debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

/// Writes named images into one directory.
#[derive(Debug)]
pub struct DirectoryWriter {
    directory: PathBuf,
    jpeg_quality: u8,
    written: Vec<PathBuf>,
}

impl DirectoryWriter {
    /// Open `directory` for writing, creating it if needed.
    ///
    /// With `clean_directory`, files already in the directory are removed.
    pub fn new(
        directory: impl Into<PathBuf>,
        clean_directory: bool,
        jpeg_quality: u8,
    ) -> Result<Self, WriterError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| WriterError::io(&directory, e))?;

        if clean_directory {
            let entries = fs::read_dir(&directory).map_err(|e| WriterError::io(&directory, e))?;
            for entry in entries {
                let path = entry.map_err(|e| WriterError::io(&directory, e))?.path();
                if path.is_file() {
                    fs::remove_file(&path).map_err(|e| WriterError::io(&path, e))?;
                }
            }
        }

        Ok(Self {
            directory,
            jpeg_quality,
            written: Vec::new(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write `image` as `name` inside the directory. The file is closed on return.
    pub fn write_image(&mut self, name: &str, image: &RgbImage) -> Result<PathBuf, WriterError> {
        let path = self.directory.join(name);
        save_image(&path, image, self.jpeg_quality)?;
        self.written.push(path.clone());
        Ok(path)
    }

    /// Finish writing and return the paths of all written images.
    pub fn finish(self) -> Vec<PathBuf> {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn image() -> RgbImage {
        RgbImage::from_fn(16, 8, |x, y| Rgb([(x * 16) as u8, (y * 32) as u8, 64]))
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ImageFileFormat::from_extension("JPG", 80).unwrap(),
            ImageFileFormat::Jpeg { quality: 80 }
        );
        assert_eq!(
            ImageFileFormat::from_extension("png", 80).unwrap(),
            ImageFileFormat::Png
        );
        assert!(ImageFileFormat::from_extension("gif", 80).is_err());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        for format in [ImageFileFormat::default(), ImageFileFormat::Png] {
            assert_eq!(
                encode_image(&image(), format).unwrap(),
                encode_image(&image(), format).unwrap()
            );
        }
    }

    #[test]
    fn test_png_is_lossless() {
        let bytes = encode_image(&image(), ImageFileFormat::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded, image());
    }

    #[test]
    fn test_directory_writer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stale.txt"), "old").unwrap();

        let mut writer = DirectoryWriter::new(dir.path(), true, 90).unwrap();
        assert!(!dir.path().join("stale.txt").exists());

        let path = writer.write_image("out-image.jpg", &image()).unwrap();
        assert_eq!(writer.finish(), vec![path.clone()]);
        assert_eq!(
            std::fs::read(&path).unwrap(),
            encode_image(&image(), ImageFileFormat::Jpeg { quality: 90 }).unwrap()
        );
    }

    #[test]
    fn test_directory_writer_keeps_files_without_clean() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), "keep").unwrap();

        DirectoryWriter::new(dir.path(), false, 90).unwrap();
        assert!(dir.path().join("keep.txt").exists());
    }
}
