use image::imageops::{resize, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{equalize_histogram, otsu_level};
use imageproc::distance_transform::Norm;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::morphology::close;
use serde::{Deserialize, Serialize};

use super::clahe::apply_clahe;
use super::denoise::{non_local_means, NlmParams};
use super::extract::ExtractOptions;
use crate::quality::sharpness::reflect_101;
use crate::quality::to_intensity;

const CLAHE_CLIP_LIMIT: f32 = 3.0;
const CLAHE_TILES: u32 = 8;

/// Neighbourhood size of the adaptive threshold, in pixels.
const ADAPTIVE_BLOCK_SIZE: u32 = 11;
/// Subtracted from the local mean before comparing.
const ADAPTIVE_OFFSET: i16 = 2;

/// Preprocessing pipeline applied before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PreprocessingMode {
    /// Grayscale, upscale and contrast only
    Basic,
    /// Adds a local-mean threshold and a closing pass
    AdaptiveThreshold,
    /// Adds denoising and sharpening before the adaptive threshold
    #[default]
    DenoiseSharpen,
    /// Median blur then a global Otsu threshold
    Otsu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContrastMethod {
    /// Tile-wise equalization (8x8 tiles, clip limit 3)
    #[default]
    Clahe,
    /// Whole-image histogram equalization
    Global,
}

/// One image transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessStep {
    /// Enlarge by `factor`. Skipped when the shorter side already reaches `below`.
    Upscale { factor: f32, below: Option<u32> },
    Equalize(ContrastMethod),
    Denoise(NlmParams),
    Sharpen,
    MedianBlur { radius: u32 },
    /// Foreground where the pixel exceeds its Gaussian-weighted local mean minus `offset`.
    AdaptiveThreshold { block_size: u32, offset: i16, invert: bool },
    Otsu { invert: bool },
    Close { radius: u8 },
}

/// Grayscale image ready for recognition, plus how much it was enlarged.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub image: GrayImage,
    /// Source-to-prepared scale; divide engine boxes by this
    pub scale: f32,
}

/// Ordered list of steps run on the intensity channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preprocessor {
    steps: Vec<PreprocessStep>,
}

impl Preprocessor {
    /// Grayscale conversion only.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: PreprocessStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Builds the pipeline for the selected mode.
    ///
    /// Grayscale first, then upscaling, then contrast, then the mode-specific
    /// tail. Otsu mode has no contrast step.
    pub fn for_options(options: &ExtractOptions) -> Self {
        let mut pipeline = Self::new();

        if options.scale_factor > 1.0 {
            pipeline = pipeline.with_step(PreprocessStep::Upscale {
                factor: options.scale_factor,
                below: options.upscale_below,
            });
        }

        if options.enhance_contrast && options.preprocessing_mode != PreprocessingMode::Otsu {
            pipeline = pipeline.with_step(PreprocessStep::Equalize(options.contrast_method));
        }

        let adaptive = PreprocessStep::AdaptiveThreshold {
            block_size: ADAPTIVE_BLOCK_SIZE,
            offset: ADAPTIVE_OFFSET,
            invert: options.invert,
        };

        match options.preprocessing_mode {
            PreprocessingMode::Basic => pipeline,
            PreprocessingMode::AdaptiveThreshold => pipeline
                .with_step(adaptive)
                .with_step(PreprocessStep::Close { radius: 1 }),
            PreprocessingMode::DenoiseSharpen => pipeline
                .with_step(PreprocessStep::Denoise(NlmParams::default()))
                .with_step(PreprocessStep::Sharpen)
                .with_step(adaptive)
                .with_step(PreprocessStep::Close { radius: 1 }),
            PreprocessingMode::Otsu => pipeline
                .with_step(PreprocessStep::MedianBlur { radius: 1 })
                .with_step(PreprocessStep::Otsu {
                    invert: options.invert,
                }),
        }
    }

    pub fn steps(&self) -> &[PreprocessStep] {
        &self.steps
    }

    /// Runs every step in order. Does not modify `image`.
    pub fn run(&self, image: &DynamicImage) -> Prepared {
        let mut prepared = Prepared {
            image: to_intensity(image),
            scale: 1.0,
        };

        for step in &self.steps {
            prepared = apply_step(prepared, step);
        }

        prepared
    }
}

fn apply_step(prepared: Prepared, step: &PreprocessStep) -> Prepared {
    let Prepared { image, scale } = prepared;

    match step {
        PreprocessStep::Upscale { factor, below } => {
            let (w, h) = image.dimensions();
            let needed = below.is_none_or(|limit| w.min(h) < limit);
            if *factor <= 1.0 || !needed {
                return Prepared { image, scale };
            }
            let new_w = ((w as f32 * factor).round() as u32).max(1);
            let new_h = ((h as f32 * factor).round() as u32).max(1);
            Prepared {
                image: resize(&image, new_w, new_h, FilterType::CatmullRom),
                scale: scale * factor,
            }
        }
        PreprocessStep::Equalize(ContrastMethod::Clahe) => Prepared {
            image: apply_clahe(&image, CLAHE_CLIP_LIMIT, CLAHE_TILES, CLAHE_TILES),
            scale,
        },
        PreprocessStep::Equalize(ContrastMethod::Global) => Prepared {
            image: equalize_histogram(&image),
            scale,
        },
        PreprocessStep::Denoise(params) => Prepared {
            image: non_local_means(&image, params),
            scale,
        },
        PreprocessStep::Sharpen => Prepared {
            image: sharpen(&image),
            scale,
        },
        PreprocessStep::MedianBlur { radius } => Prepared {
            image: median_filter(&image, *radius, *radius),
            scale,
        },
        PreprocessStep::AdaptiveThreshold {
            block_size,
            offset,
            invert,
        } => Prepared {
            image: adaptive_threshold(&image, *block_size, *offset, *invert),
            scale,
        },
        PreprocessStep::Otsu { invert } => {
            let level = otsu_level(&image);
            Prepared {
                image: binarize(&image, |_, _, value| value > level, *invert),
                scale,
            }
        }
        PreprocessStep::Close { radius } => Prepared {
            image: close(&image, Norm::LInf, *radius),
            scale,
        },
    }
}

/// 3x3 sharpening kernel `[-1,-1,-1; -1,9,-1; -1,-1,-1]`, mirrored borders.
pub fn sharpen(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    GrayImage::from_fn(width, height, |x, y| {
        let mut sum = 0i32;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let sx = reflect_101(x as i64 + dx, width);
                let sy = reflect_101(y as i64 + dy, height);
                let value = gray.get_pixel(sx, sy)[0] as i32;
                sum += if dx == 0 && dy == 0 { 9 * value } else { -value };
            }
        }
        Luma([sum.clamp(0, 255) as u8])
    })
}

/// Local-mean binarization.
///
/// The local mean is a Gaussian-weighted average whose sigma matches a
/// `block_size` window. A pixel is foreground (255) when it is brighter than
/// `mean - offset`.
pub fn adaptive_threshold(gray: &GrayImage, block_size: u32, offset: i16, invert: bool) -> GrayImage {
    let sigma = 0.3 * ((block_size.max(3) as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let local_mean = gaussian_blur_f32(gray, sigma);

    binarize(
        gray,
        |x, y, value| value as i16 > local_mean.get_pixel(x, y)[0] as i16 - offset,
        invert,
    )
}

fn binarize(gray: &GrayImage, is_foreground: impl Fn(u32, u32, u8) -> bool, invert: bool) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let foreground = is_foreground(x, y, gray.get_pixel(x, y)[0]);
        if foreground != invert { Luma([255]) } else { Luma([0]) }
    })
}
