use image::GrayImage;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Fraction of spectral magnitude lying outside a central low-frequency disk.
///
/// The spectrum is shifted so the zero frequency sits at `(h/2, w/2)`. The disk
/// radius is a third of the smaller half-dimension. Returns 0.0 when the
/// image carries no energy at all (all-black).
pub fn high_frequency_ratio(gray: &GrayImage) -> f64 {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    if width == 0 || height == 0 {
        return 0.0;
    }

    let spectrum = fft_2d(gray);

    let center_y = (height / 2) as i64;
    let center_x = (width / 2) as i64;
    let radius = center_y.min(center_x) / 3;
    let radius_sq = radius * radius;

    let mut total = 0.0f64;
    let mut high = 0.0f64;

    for v in 0..height {
        // fftshift: index i lands at (i + n/2) mod n
        let dy = ((v + height / 2) % height) as i64 - center_y;
        for u in 0..width {
            let dx = ((u + width / 2) % width) as i64 - center_x;
            let magnitude = spectrum[v * width + u].norm();
            total += magnitude;
            if dx * dx + dy * dy > radius_sq {
                high += magnitude;
            }
        }
    }

    if total <= 0.0 {
        return 0.0;
    }
    (high / total).clamp(0.0, 1.0)
}

/// Row-then-column 2-D DFT, row-major output.
fn fft_2d(gray: &GrayImage) -> Vec<Complex<f64>> {
    let width = gray.width() as usize;
    let height = gray.height() as usize;

    let mut data: Vec<Complex<f64>> = gray
        .pixels()
        .map(|p| Complex::new(p[0] as f64, 0.0))
        .collect();

    let mut planner = FftPlanner::<f64>::new();

    let row_fft = planner.plan_fft_forward(width);
    for row in data.chunks_exact_mut(width) {
        row_fft.process(row);
    }

    let col_fft = planner.plan_fft_forward(height);
    let mut column = vec![Complex::new(0.0, 0.0); height];
    for x in 0..width {
        for (y, slot) in column.iter_mut().enumerate() {
            *slot = data[y * width + x];
        }
        col_fft.process(&mut column);
        for (y, value) in column.iter().enumerate() {
            data[y * width + x] = *value;
        }
    }

    data
}
