use image::GrayImage;

/// Non-local means parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NlmParams {
    /// Filter strength; larger values smooth more aggressively
    pub h: f32,
    /// Half-size of the comparison patch
    pub patch_radius: u32,
    /// Half-size of the window searched for similar patches
    pub search_radius: u32,
}

impl Default for NlmParams {
    fn default() -> Self {
        Self {
            h: 3.0,
            patch_radius: 1,
            search_radius: 4,
        }
    }
}

/// Non-local means denoising for grayscale images.
///
/// Every pixel becomes a weighted mean of pixels in its search window. The
/// weight of a neighbour is `exp(-d / h^2)`, `d` being the mean squared
/// difference between the patches around the two pixels. Flat noise is
/// averaged away while strokes, whose patches do not match the background,
/// keep their edges. Borders are replicated.
///
/// Patch distances are taken per search offset from an integral image of
/// squared differences, so the cost does not grow with the patch size.
pub fn non_local_means(gray: &GrayImage, params: &NlmParams) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let (w, h) = (width as usize, height as usize);
    let pr = params.patch_radius as usize;
    let sr = params.search_radius as isize;
    let pad = pr + sr as usize;
    let h_sq = (params.h * params.h).max(f32::EPSILON);
    let k = 2 * pr + 1;
    let patch_len = (k * k) as f32;

    let src = gray.as_raw();
    let padded = pad_replicate(src, w, h, pad);
    let pw = w + 2 * pad;

    // Patch cells around in-image pixels, starting at padded (sr, sr)
    let (rw, rh) = (w + 2 * pr, h + 2 * pr);
    let stride = rw + 1;
    let origin = sr as usize;
    let mut integral = vec![0u64; stride * (rh + 1)];

    let mut weight_sum = vec![0.0f32; w * h];
    let mut acc = vec![0.0f32; w * h];

    for dy in -sr..=sr {
        for dx in -sr..=sr {
            for ry in 0..rh {
                let row = (origin + ry) * pw + origin;
                let shifted = ((origin + ry) as isize + dy) as usize * pw;
                let mut running = 0u64;
                for rx in 0..rw {
                    let qx = ((origin + rx) as isize + dx) as usize;
                    let d = padded[row + rx] as i32 - padded[shifted + qx] as i32;
                    running += (d * d) as u64;
                    integral[(ry + 1) * stride + rx + 1] = integral[ry * stride + rx + 1] + running;
                }
            }

            for y in 0..h {
                let ny = y as isize + dy;
                if ny < 0 || ny >= h as isize {
                    continue;
                }
                let top = y * stride;
                let bottom = (y + k) * stride;
                for x in 0..w {
                    let nx = x as isize + dx;
                    if nx < 0 || nx >= w as isize {
                        continue;
                    }
                    let dist = (integral[bottom + x + k] + integral[top + x])
                        - (integral[top + x + k] + integral[bottom + x]);
                    let weight = (-(dist as f32 / patch_len) / h_sq).exp();
                    let i = y * w + x;
                    weight_sum[i] += weight;
                    acc[i] += weight * src[ny as usize * w + nx as usize] as f32;
                }
            }
        }
    }

    // The centre pixel always contributes weight 1, so weight_sum >= 1
    let out = acc
        .iter()
        .zip(&weight_sum)
        .map(|(a, s)| (a / s).round().clamp(0.0, 255.0) as u8)
        .collect();
    GrayImage::from_raw(width, height, out).unwrap_or_else(|| gray.clone())
}

/// Copies `src` into a buffer grown by `pad` pixels on each side, repeating
/// the edge pixels.
fn pad_replicate(src: &[u8], w: usize, h: usize, pad: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity((w + 2 * pad) * (h + 2 * pad));
    for py in 0..h + 2 * pad {
        let y = py.saturating_sub(pad).min(h - 1);
        let row = &src[y * w..(y + 1) * w];
        out.extend(std::iter::repeat_n(row[0], pad));
        out.extend_from_slice(row);
        out.extend(std::iter::repeat_n(row[w - 1], pad));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use crate::quality::contrast::intensity_std_dev;

    #[test]
    fn test_uniform_unchanged() {
        let img = GrayImage::from_pixel(16, 12, Luma([140]));
        assert_eq!(non_local_means(&img, &NlmParams::default()), img);
    }

    #[test]
    fn test_reduces_fine_noise() {
        let noisy = GrayImage::from_fn(24, 24, |x, y| {
            if (x + y) % 2 == 0 { Luma([100]) } else { Luma([102]) }
        });
        let clean = non_local_means(&noisy, &NlmParams::default());
        assert!(intensity_std_dev(&clean) < intensity_std_dev(&noisy));
    }

    #[test]
    fn test_keeps_strong_edges() {
        let img = GrayImage::from_fn(20, 20, |x, _| if x < 10 { Luma([20]) } else { Luma([230]) });
        let out = non_local_means(&img, &NlmParams::default());
        assert!(out.get_pixel(2, 10)[0] < 40);
        assert!(out.get_pixel(17, 10)[0] > 210);
    }

    #[test]
    fn test_tiny_image() {
        let img = GrayImage::from_fn(2, 1, |x, _| Luma([x as u8 * 255]));
        assert_eq!(non_local_means(&img, &NlmParams::default()).dimensions(), (2, 1));
    }

    /// Direct evaluation of every patch pair with clamped coordinates.
    fn reference(gray: &GrayImage, params: &NlmParams) -> GrayImage {
        let (w, h) = (gray.width() as i64, gray.height() as i64);
        let (pr, sr) = (params.patch_radius as i64, params.search_radius as i64);
        let patch_len = ((2 * pr + 1) * (2 * pr + 1)) as f32;
        let h_sq = params.h * params.h;
        let at = |x: i64, y: i64| gray.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32)[0] as f32;

        GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let (x, y) = (x as i64, y as i64);
            let (mut weight_sum, mut acc) = (0.0f32, 0.0f32);
            for ny in (y - sr).max(0)..=(y + sr).min(h - 1) {
                for nx in (x - sr).max(0)..=(x + sr).min(w - 1) {
                    let mut dist = 0.0f32;
                    for py in -pr..=pr {
                        for px in -pr..=pr {
                            let d = at(x + px, y + py) - at(nx + px, ny + py);
                            dist += d * d;
                        }
                    }
                    let weight = (-(dist / patch_len) / h_sq).exp();
                    weight_sum += weight;
                    acc += weight * at(nx, ny);
                }
            }
            Luma([(acc / weight_sum).round().clamp(0.0, 255.0) as u8])
        })
    }

    #[test]
    fn test_matches_direct_evaluation() {
        let img = GrayImage::from_fn(23, 17, |x, y| {
            let stroke = if (6..11).contains(&x) { 120 } else { 0 };
            Luma([(60 + stroke + (x * 7 + y * 13) % 5) as u8])
        });
        for params in [
            NlmParams::default(),
            NlmParams { h: 10.0, patch_radius: 2, search_radius: 3 },
        ] {
            let fast = non_local_means(&img, &params);
            let slow = reference(&img, &params);
            for (a, b) in fast.pixels().zip(slow.pixels()) {
                assert!((a[0] as i32 - b[0] as i32).abs() <= 1, "{:?} vs {:?}", a, b);
            }
        }
    }
}
