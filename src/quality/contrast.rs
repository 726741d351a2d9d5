use image::GrayImage;
use imageproc::edges::canny;

/// Canny hysteresis thresholds used for edge density.
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Blends global contrast with local edge coverage into one comparative scalar.
///
/// `(std_dev + edge_density * 1000) / 2`. Not bounded; only meaningful when
/// comparing images against each other or against an advisory threshold.
pub fn quality_score(gray: &GrayImage) -> f64 {
    (intensity_std_dev(gray) + edge_density(gray) * 1000.0) / 2.0
}

/// Population standard deviation of pixel intensity.
pub fn intensity_std_dev(gray: &GrayImage) -> f64 {
    let count = gray.width() as f64 * gray.height() as f64;
    if count == 0.0 {
        return 0.0;
    }

    let mean = gray.pixels().map(|p| p[0] as f64).sum::<f64>() / count;
    let variance = gray
        .pixels()
        .map(|p| {
            let diff = p[0] as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / count;

    variance.sqrt()
}

/// Fraction of pixels a Canny detector marks as edges.
///
/// Images narrower than the 3x3 gradient window have no interior to mark.
pub fn edge_density(gray: &GrayImage) -> f64 {
    if gray.width() < 3 || gray.height() < 3 {
        return 0.0;
    }
    let count = gray.width() as f64 * gray.height() as f64;

    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let edge_pixels = edges.pixels().filter(|p| p[0] > 0).count();

    edge_pixels as f64 / count
}
