use image::{GrayImage, Luma};

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `tiles_x` by `tiles_y` grid. Each tile gets its
/// own equalization curve built from a histogram clipped at
/// `clip_limit * tile_area / 256`, with the clipped excess spread evenly over
/// all bins. Output pixels blend the curves of the four nearest tile centres
/// bilinearly, so tile seams do not show.
pub fn apply_clahe(gray: &GrayImage, clip_limit: f32, tiles_x: u32, tiles_y: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tiles_x = tiles_x.clamp(1, width);
    let tiles_y = tiles_y.clamp(1, height);

    let x_bounds: Vec<u32> = (0..=tiles_x).map(|i| i * width / tiles_x).collect();
    let y_bounds: Vec<u32> = (0..=tiles_y).map(|i| i * height / tiles_y).collect();

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y as usize {
        for tx in 0..tiles_x as usize {
            let mut hist = [0u32; 256];
            for y in y_bounds[ty]..y_bounds[ty + 1] {
                for x in x_bounds[tx]..x_bounds[tx + 1] {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = (x_bounds[tx + 1] - x_bounds[tx]) * (y_bounds[ty + 1] - y_bounds[ty]);
            luts.push(clipped_lut(&mut hist, area, clip_limit));
        }
    }

    let tile_w = width as f32 / tiles_x as f32;
    let tile_h = height as f32 / tiles_y as f32;

    GrayImage::from_fn(width, height, |x, y| {
        let (tx0, tx1, wx) = neighbours(x, tile_w, tiles_x);
        let (ty0, ty1, wy) = neighbours(y, tile_h, tiles_y);
        let value = gray.get_pixel(x, y)[0] as usize;

        let lut = |tx: usize, ty: usize| luts[ty * tiles_x as usize + tx][value] as f32;

        let top = lut(tx0, ty0) * (1.0 - wx) + lut(tx1, ty0) * wx;
        let bottom = lut(tx0, ty1) * (1.0 - wx) + lut(tx1, ty1) * wx;
        let blended = top * (1.0 - wy) + bottom * wy;

        Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

/// Two tile indices bracketing `pos` and the weight of the second one.
fn neighbours(pos: u32, tile_size: f32, tiles: u32) -> (usize, usize, f32) {
    let f = (pos as f32 + 0.5) / tile_size - 0.5;
    let last = tiles as usize - 1;

    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let lower = f.floor() as usize;
    if lower >= last {
        return (last, last, 0.0);
    }
    (lower, lower + 1, f - lower as f32)
}

fn clipped_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if area == 0 {
        return lut;
    }

    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let bonus = excess / 256;
    let residual = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus;
        if i < residual {
            *bin += 1;
        }
    }

    let scale = 255.0 / area as f32;
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = (cdf as f32 * scale).round().min(255.0) as u8;
    }

    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_range(img: &GrayImage) -> (u8, u8) {
        let min = img.pixels().map(|p| p[0]).min().unwrap();
        let max = img.pixels().map(|p| p[0]).max().unwrap();
        (min, max)
    }

    #[test]
    fn test_preserves_dimensions() {
        let img = GrayImage::from_fn(37, 19, |x, y| Luma([((x + y) * 3) as u8]));
        assert_eq!(apply_clahe(&img, 3.0, 8, 8).dimensions(), (37, 19));
    }

    #[test]
    fn test_uniform_stays_uniform() {
        let img = GrayImage::from_pixel(64, 64, Luma([90]));
        let out = apply_clahe(&img, 3.0, 8, 8);
        let (min, max) = value_range(&out);
        assert_eq!(min, max);
    }

    #[test]
    fn test_stretches_low_contrast() {
        // Narrow band of values 100..=115
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([100 + ((x + y) % 16) as u8]));
        let out = apply_clahe(&img, 3.0, 8, 8);

        let (in_min, in_max) = value_range(&img);
        let (out_min, out_max) = value_range(&out);
        assert!(
            out_max - out_min > in_max - in_min,
            "range {}..{} not wider than {}..{}",
            out_min,
            out_max,
            in_min,
            in_max
        );
    }

    #[test]
    fn test_more_tiles_than_pixels() {
        let img = GrayImage::from_fn(3, 2, |x, _| Luma([x as u8 * 100]));
        assert_eq!(apply_clahe(&img, 3.0, 8, 8).dimensions(), (3, 2));
    }

    #[test]
    fn test_lut_is_monotonic() {
        let mut hist = [0u32; 256];
        hist[10] = 500;
        hist[200] = 12;
        let lut = clipped_lut(&mut hist, 512, 3.0);
        assert!(lut.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(lut[255], 255);
    }
}
