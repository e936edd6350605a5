//! Cover art matching.
//!
//! When a third-party covers module is configured, the cover a service
//! returns is only used as a reference: candidates from the covers module
//! are compared to it pixel by pixel and the first one that is close enough
//! replaces it (usually at a much higher resolution).
//!
//! # Design Principles
//!
//! - **Sequential**: candidates are tested in search order and the scan
//!   stops at the first match, so later candidates are never fetched
//! - **Graceful degradation**: a candidate that fails to download or decode
//!   is skipped; no match simply keeps the reference image
//!
//! Services that cannot scale covers on their side get them normalised here
//! with [`resize_cover`].

mod selector;

pub use selector::{CoverMatch, CoverSelector};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::model::{CoverCompression, CoverOptions, ImageFileType};

/// Decode by content, temp files do not always carry the right extension.
fn decode(path: &Path) -> Result<image::DynamicImage, image::ImageError> {
    image::ImageReader::open(path)?.with_guessed_format()?.decode()
}

/// Pixel dimensions of an image file.
pub fn image_resolution(path: &Path) -> Result<(u32, u32), image::ImageError> {
    image::ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()
}

fn jpeg_quality(compression: CoverCompression) -> u8 {
    match compression {
        CoverCompression::Low => 90,
        CoverCompression::High => 70,
    }
}

/// Rewrite a cover in place as a `resolution` x `resolution` image in the
/// requested file type.
pub fn resize_cover(path: &Path, options: &CoverOptions) -> Result<(), image::ImageError> {
    let image = decode(path)?;
    let size = options.resolution;
    let image = if size == 0 || (image.width() == size && image.height() == size) {
        image
    } else {
        image.resize_exact(size, size, FilterType::CatmullRom)
    };
    // Covers carry no alpha and JPEG cannot store it
    let image = DynamicImage::ImageRgb8(image.to_rgb8());

    let mut writer = BufWriter::new(File::create(path)?);
    match options.file_type {
        ImageFileType::Jpg => image.write_with_encoder(JpegEncoder::new_with_quality(
            &mut writer,
            jpeg_quality(options.compression),
        ))?,
        ImageFileType::Png => image.write_to(&mut writer, ImageFormat::Png)?,
        ImageFileType::Webp => image.write_to(&mut writer, ImageFormat::WebP)?,
    }
    writer.flush()?;
    Ok(())
}

/// Root-mean-square difference between two images, per RGB channel.
///
/// The candidate is resized to the reference's dimensions first. Identical
/// images score 0.0, the maximum is 255.0.
pub fn compare_images(reference: &Path, candidate: &Path) -> Result<f64, image::ImageError> {
    let reference = decode(reference)?.to_rgb8();
    let candidate = decode(candidate)?;
    let candidate = if candidate.width() == reference.width()
        && candidate.height() == reference.height()
    {
        candidate.to_rgb8()
    } else {
        candidate
            .resize_exact(reference.width(), reference.height(), FilterType::Triangle)
            .to_rgb8()
    };

    let samples = reference.as_raw().len();
    if samples == 0 {
        return Ok(0.0);
    }
    let sum_of_squares: f64 = reference
        .as_raw()
        .iter()
        .zip(candidate.as_raw())
        .map(|(&a, &b)| {
            let diff = f64::from(a) - f64::from(b);
            diff * diff
        })
        .sum();

    Ok((sum_of_squares / samples as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::solid_png;

    #[test]
    fn test_identical_images_score_zero() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        std::fs::write(&a, solid_png(120, 8, 8)).unwrap();
        assert_eq!(compare_images(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn test_uniform_difference() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        std::fs::write(&a, solid_png(100, 8, 8)).unwrap();
        std::fs::write(&b, solid_png(109, 8, 8)).unwrap();

        let rms = compare_images(&a, &b).unwrap();
        assert!((rms - 9.0).abs() < 1e-9, "rms was {rms}");
    }

    #[test]
    fn test_candidate_resized_to_reference() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.bin");
        // Extensions do not match the content on purpose
        std::fs::write(&a, solid_png(100, 8, 8)).unwrap();
        std::fs::write(&b, solid_png(109, 32, 32)).unwrap();

        let rms = compare_images(&a, &b).unwrap();
        assert!((rms - 9.0).abs() < 1.0, "rms was {rms}");
        assert_eq!(image_resolution(&b).unwrap(), (32, 32));
    }

    fn format_of(path: &Path) -> Option<ImageFormat> {
        image::ImageReader::open(path)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .format()
    }

    #[test]
    fn test_resize_cover_to_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let cover = dir.path().join("cover.jpg");
        std::fs::write(&cover, solid_png(100, 4, 4)).unwrap();

        let options = CoverOptions {
            file_type: ImageFileType::Jpg,
            resolution: 16,
            compression: CoverCompression::High,
        };
        resize_cover(&cover, &options).unwrap();

        assert_eq!(image_resolution(&cover).unwrap(), (16, 16));
        assert_eq!(format_of(&cover), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn test_resize_cover_keeps_png() {
        let dir = tempfile::tempdir().unwrap();
        let cover = dir.path().join("cover.png");
        std::fs::write(&cover, solid_png(100, 32, 32)).unwrap();

        let options = CoverOptions {
            file_type: ImageFileType::Png,
            resolution: 8,
            compression: CoverCompression::Low,
        };
        resize_cover(&cover, &options).unwrap();

        assert_eq!(image_resolution(&cover).unwrap(), (8, 8));
        assert_eq!(format_of(&cover), Some(ImageFormat::Png));
    }

    #[test]
    fn test_resize_cover_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let cover = dir.path().join("cover.jpg");
        std::fs::write(&cover, b"not an image").unwrap();
        let options = CoverOptions {
            file_type: ImageFileType::Jpg,
            resolution: 8,
            compression: CoverCompression::High,
        };
        assert!(resize_cover(&cover, &options).is_err());
        // Left untouched when decoding fails
        assert_eq!(std::fs::read(&cover).unwrap(), b"not an image");
    }

    #[test]
    fn test_undecodable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        std::fs::write(&a, solid_png(100, 4, 4)).unwrap();
        std::fs::write(&b, b"not an image").unwrap();
        assert!(compare_images(&a, &b).is_err());
    }
}
