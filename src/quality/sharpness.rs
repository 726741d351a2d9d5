use image::GrayImage;

/// Maps an out-of-range coordinate back into `0..n` by mirroring without
/// repeating the edge pixel (`dcb|abcd|cba`).
pub fn reflect_101(i: i64, n: u32) -> u32 {
    if n == 1 {
        return 0;
    }
    let n = n as i64;
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i >= n {
        i = 2 * n - 2 - i;
    }
    i.clamp(0, n - 1) as u32
}

/// Variance of the 3x3 Laplacian response `[0,1,0; 1,-4,1; 0,1,0]`.
///
/// In-focus images have a high-variance edge response; blur smooths edges
/// and pulls the variance down. Every pixel contributes, borders are
/// mirrored.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    let count = width as f64 * height as f64;
    if count == 0.0 {
        return 0.0;
    }

    let at = |x: i64, y: i64| -> f64 {
        gray.get_pixel(reflect_101(x, width), reflect_101(y, height))[0] as f64
    };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let response =
                at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::filter::gaussian_blur_f32;

    /// Vertical edge at the horizontal centre with a linear ramp `ramp` pixels wide.
    fn step_edge(ramp: u32) -> GrayImage {
        let (w, h) = (64u32, 32u32);
        let start = w / 2 - ramp / 2;
        GrayImage::from_fn(w, h, |x, _| {
            if x < start {
                Luma([0])
            } else if x >= start + ramp {
                Luma([255])
            } else {
                Luma([((x - start + 1) * 255 / (ramp + 1)) as u8])
            }
        })
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-1, 2), 1);
        assert_eq!(reflect_101(2, 2), 0);
        assert_eq!(reflect_101(-1, 1), 0);
    }

    #[test]
    fn test_uniform_images_score_zero() {
        for value in [0u8, 255] {
            let img = GrayImage::from_pixel(40, 30, Luma([value]));
            assert_eq!(laplacian_variance(&img), 0.0);
        }
    }

    #[test]
    fn test_sharper_edges_score_higher() {
        let scores: Vec<f64> = [1, 3, 7, 15]
            .iter()
            .map(|&ramp| laplacian_variance(&step_edge(ramp)))
            .collect();

        for pair in scores.windows(2) {
            assert!(pair[0] > pair[1], "expected strictly decreasing: {:?}", scores);
        }
    }

    #[test]
    fn test_blur_lowers_score() {
        let sharp = step_edge(0);
        let mut previous = laplacian_variance(&sharp);

        for sigma in [1.0f32, 2.0, 4.0] {
            let score = laplacian_variance(&gaussian_blur_f32(&sharp, sigma));
            assert!(
                score < previous,
                "sigma {} gave {} (previous {})",
                sigma,
                score,
                previous
            );
            previous = score;
        }
    }

    #[test]
    fn test_single_isolated_dot() {
        // One bright pixel: responses are -1020 at the dot and +255 at its
        // four neighbours, zero elsewhere.
        let mut img = GrayImage::new(5, 5);
        img.put_pixel(2, 2, Luma([255]));

        let n = 25.0;
        let values = [-1020.0f64, 255.0, 255.0, 255.0, 255.0];
        let mean = values.iter().sum::<f64>() / n;
        let expected = values.iter().map(|v| v * v).sum::<f64>() / n - mean * mean;

        assert!((laplacian_variance(&img) - expected).abs() < 1e-6);
    }
}
