//! Image decoding and validation.
//!
//! Only PNG and JPEG are accepted. The detected format is carried along so
//! the report can echo it back unchanged.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;

use crate::error::ScanError;

/// A decoded image together with the container format it came from.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

/// Decodes a PNG/JPEG byte buffer.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, ScanError> {
    let format = image::guess_format(bytes)?;

    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(ScanError::UnsupportedFormat(format!("{:?}", format)));
    }

    let image = image::load_from_memory_with_format(bytes, format)?;
    ensure_analyzable(&image)?;

    Ok(DecodedImage { image, format })
}

/// Reads and decodes an image file.
pub fn load_image(path: &Path) -> Result<DecodedImage, ScanError> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}

/// Rejects images with zero area or a single pixel.
pub fn ensure_analyzable(image: &DynamicImage) -> Result<(), ScanError> {
    let (width, height) = image.dimensions();
    if (width as u64) * (height as u64) < 2 {
        return Err(ScanError::InvalidImage { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};
    use std::io::Cursor;

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_png_keeps_format() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 4, Luma([200])));
        let decoded = decode_image(&encode(&img, ImageFormat::Png)).unwrap();

        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!(decoded.image.dimensions(), (8, 4));
    }

    #[test]
    fn test_decode_jpeg() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, image::Rgb([10, 20, 30])));
        let decoded = decode_image(&encode(&img, ImageFormat::Jpeg)).unwrap();
        assert_eq!(decoded.format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_rejects_other_formats() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let result = decode_image(&encode(&img, ImageFormat::Bmp));
        assert!(matches!(result, Err(ScanError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(decode_image(b"definitely not an image").is_err());
        assert!(decode_image(&[]).is_err());
    }

    #[test]
    fn test_rejects_single_pixel() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        assert!(matches!(
            ensure_analyzable(&img),
            Err(ScanError::InvalidImage { width: 1, height: 1 })
        ));
    }

    #[test]
    fn test_accepts_two_pixels() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(2, 1));
        assert!(ensure_analyzable(&img).is_ok());
    }
}
