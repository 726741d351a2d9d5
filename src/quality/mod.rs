//! Blur and image quality assessment.
//!
//! Three independent signals are computed from the intensity channel:
//! - spatial sharpness (Laplacian variance)
//! - a contrast/edge composite score
//! - the high-frequency share of the Fourier spectrum
//!
//! The analyzer only reports; deciding what to do with a blurry image is up
//! to the caller.

pub mod contrast;
pub mod frequency;
pub mod sharpness;

use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::input::ensure_analyzable;

pub use contrast::quality_score;
pub use frequency::high_frequency_ratio;
pub use sharpness::laplacian_variance;

/// Default Laplacian variance above which an image counts as sharp.
pub const DEFAULT_SHARPNESS_THRESHOLD: f64 = 100.0;

/// Default high-frequency ratio above which an image counts as sharp.
pub const DEFAULT_FREQUENCY_THRESHOLD: f64 = 0.1;

/// Result of analyzing one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    /// Laplacian variance
    pub sharpness_score: f64,
    /// `sharpness_score > sharpness threshold`
    pub is_sharp: bool,
    /// Contrast/edge composite, unbounded
    pub quality_score: f64,
    /// High-frequency energy ratio in [0, 1]
    pub frequency_score: f64,
    /// `frequency_score > frequency threshold`
    pub is_sharp_frequency: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub sharpness: f64,
    pub frequency: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            sharpness: DEFAULT_SHARPNESS_THRESHOLD,
            frequency: DEFAULT_FREQUENCY_THRESHOLD,
        }
    }
}

/// Holds the thresholds between calls. They are the analyzer's only state.
#[derive(Debug, Clone, Default)]
pub struct QualityAnalyzer {
    thresholds: QualityThresholds,
}

impl QualityAnalyzer {
    pub fn set_thresholds(&mut self, thresholds: QualityThresholds) {
        self.thresholds = thresholds;
    }

    /// Analyzes one image against the current thresholds.
    pub fn analyze(&self, image: &DynamicImage) -> Result<QualityReport, ScanError> {
        // Copy once so the whole request sees a single threshold pair.
        let thresholds = self.thresholds;
        analyze(image, thresholds.sharpness, thresholds.frequency)
    }
}

/// Computes every quality signal for `image`.
///
/// Fails with [`ScanError::InvalidImage`] for zero-area or single-pixel input.
pub fn analyze(
    image: &DynamicImage,
    sharpness_threshold: f64,
    frequency_threshold: f64,
) -> Result<QualityReport, ScanError> {
    ensure_analyzable(image)?;

    let gray = to_intensity(image);

    let sharpness_score = laplacian_variance(&gray);
    let frequency_score = high_frequency_ratio(&gray);

    Ok(QualityReport {
        sharpness_score,
        is_sharp: sharpness_score > sharpness_threshold,
        quality_score: quality_score(&gray),
        frequency_score,
        is_sharp_frequency: frequency_score > frequency_threshold,
    })
}

/// Converts any image to single-channel intensity.
///
/// Uses the ITU-R BT.601 luma formula: Y = 0.299*R + 0.587*G + 0.114*B,
/// rounded to the nearest integer.
pub fn to_intensity(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }

    let rgb = image.to_rgb8();
    let mut gray = GrayImage::new(rgb.width(), rgb.height());

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let r = pixel[0] as f32;
        let g = pixel[1] as f32;
        let b = pixel[2] as f32;
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        gray.put_pixel(x, y, Luma([luma.round().clamp(0.0, 255.0) as u8]));
    }

    gray
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::filter::gaussian_blur_f32;

    fn engraved_digits() -> GrayImage {
        // Dark background with bright vertical strokes, roughly like stamped digits.
        GrayImage::from_fn(120, 60, |x, y| {
            let stroke = (x / 6) % 3 == 0 && (15..45).contains(&y);
            if stroke { Luma([230]) } else { Luma([40]) }
        })
    }

    #[test]
    fn test_to_intensity_bt601() {
        let mut rgb = RgbImage::new(3, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 255, 0]));
        rgb.put_pixel(2, 0, Rgb([0, 0, 255]));

        let gray = to_intensity(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(2, 0)[0], 29);
    }

    #[test]
    fn test_uniform_images_are_not_sharp() {
        for value in [0u8, 255] {
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 40, Rgb([value; 3])));
            let report = analyze(&img, DEFAULT_SHARPNESS_THRESHOLD, DEFAULT_FREQUENCY_THRESHOLD)
                .unwrap();

            assert_eq!(report.sharpness_score, 0.0);
            assert!(!report.is_sharp);
            assert!(!report.is_sharp_frequency);
            assert!(report.quality_score.abs() < 1e-9);
        }
    }

    #[test]
    fn test_sharp_vs_blurred() {
        let analyzer = QualityAnalyzer::default();
        let sharp = engraved_digits();
        let blurred = gaussian_blur_f32(&sharp, 6.0);

        let sharp_report = analyzer.analyze(&DynamicImage::ImageLuma8(sharp)).unwrap();
        let blurred_report = analyzer.analyze(&DynamicImage::ImageLuma8(blurred)).unwrap();

        assert!(sharp_report.is_sharp, "{:?}", sharp_report);
        assert!(!blurred_report.is_sharp, "{:?}", blurred_report);
        assert!(sharp_report.frequency_score > blurred_report.frequency_score);
        assert!(sharp_report.quality_score > blurred_report.quality_score);
    }

    #[test]
    fn test_thresholds_can_be_updated() {
        let img = DynamicImage::ImageLuma8(engraved_digits());
        let mut analyzer = QualityAnalyzer::default();
        assert!(analyzer.analyze(&img).unwrap().is_sharp);

        analyzer.set_thresholds(QualityThresholds {
            sharpness: f64::MAX,
            frequency: 1.0,
        });
        let report = analyzer.analyze(&img).unwrap();
        assert!(!report.is_sharp);
        assert!(!report.is_sharp_frequency);
    }

    #[test]
    fn test_degenerate_images_rejected() {
        let one = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        assert!(matches!(
            analyze(&one, 100.0, 0.1),
            Err(ScanError::InvalidImage { .. })
        ));

        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 10));
        assert!(analyze(&empty, 100.0, 0.1).is_err());
    }

    #[test]
    fn test_scores_are_finite() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(2, 1, |x, _| Luma([x as u8 * 200])));
        let report = analyze(&img, 100.0, 0.1).unwrap();
        assert!(report.sharpness_score.is_finite());
        assert!(report.quality_score.is_finite());
        assert!(report.frequency_score.is_finite());
    }
}
