use image::DynamicImage;
use std::sync::Arc;

use super::engine::{OcrConfig, OcrEngine, TextDetection, ALPHANUMERIC, DIGITS};
use super::preprocess::{ContrastMethod, Preprocessor, Prepared, PreprocessingMode};
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::input::ensure_analyzable;
use crate::log;

/// Configuration used when fallback is disabled.
pub const SINGLE_CONFIG: OcrConfig = OcrConfig::new(6, Some(ALPHANUMERIC));

/// Configurations tried in order when fallback is enabled:
/// single word digits, single line, uniform block, raw line digits.
pub const FALLBACK_CONFIGS: [OcrConfig; 4] = [
    OcrConfig::new(8, Some(DIGITS)),
    OcrConfig::new(7, Some(ALPHANUMERIC)),
    OcrConfig::new(6, Some(ALPHANUMERIC)),
    OcrConfig::new(13, Some(DIGITS)),
];

/// Last-resort configuration run on the plain grayscale image.
pub const RAW_CONFIG: OcrConfig = OcrConfig::new(8, None);

/// Images whose shorter side reaches this size are not enlarged.
pub const DEFAULT_UPSCALE_BELOW: u32 = 100;

/// Knobs for one extraction request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub enhance_contrast: bool,
    pub contrast_method: ContrastMethod,
    pub scale_factor: f32,
    /// Only upscale images whose shorter side is below this many pixels
    pub upscale_below: Option<u32>,
    pub preprocessing_mode: PreprocessingMode,
    /// Treat dark-on-light text as foreground instead of light-on-dark
    pub invert: bool,
    /// Try [`FALLBACK_CONFIGS`] instead of [`SINGLE_CONFIG`] only
    pub fallback: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            enhance_contrast: true,
            contrast_method: ContrastMethod::Clahe,
            scale_factor: 2.0,
            upscale_below: Some(DEFAULT_UPSCALE_BELOW),
            preprocessing_mode: PreprocessingMode::DenoiseSharpen,
            invert: false,
            fallback: true,
        }
    }
}

impl ExtractOptions {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            enhance_contrast: config.enhance_contrast,
            contrast_method: config.contrast_method,
            scale_factor: config.scale_factor,
            upscale_below: config.upscale_below,
            preprocessing_mode: config.preprocessing_mode,
            invert: config.invert,
            fallback: config.ocr_fallback,
        }
    }

    /// Recognition configurations in the order they should be tried.
    pub fn ocr_configs(&self) -> &'static [OcrConfig] {
        if self.fallback {
            &FALLBACK_CONFIGS
        } else {
            std::slice::from_ref(&SINGLE_CONFIG)
        }
    }
}

/// Runs preprocessing and recognition through a shared engine.
#[derive(Clone)]
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
}

impl TextExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    /// Preprocesses `image` for the given options.
    pub fn prepare(&self, image: &DynamicImage, options: &ExtractOptions) -> Result<Prepared, ScanError> {
        ensure_analyzable(image)?;
        let pipeline = Preprocessor::for_options(options);
        log(&format!(
            "Preprocessing: {:?}, {} step(s)",
            options.preprocessing_mode,
            pipeline.steps().len()
        ));
        Ok(pipeline.run(image))
    }

    /// Grayscale only, no enhancement. Used by the raw fallback tier.
    pub fn prepare_raw(&self, image: &DynamicImage) -> Result<Prepared, ScanError> {
        ensure_analyzable(image)?;
        Ok(Preprocessor::new().run(image))
    }

    /// Returns the detections of the first configuration that finds any text.
    ///
    /// An empty list means no configuration produced text. Engine failures are
    /// logged and treated as "no text" for that configuration.
    pub fn extract_text(
        &self,
        image: &DynamicImage,
        options: &ExtractOptions,
    ) -> Result<Vec<TextDetection>, ScanError> {
        let prepared = self.prepare(image, options)?;

        for config in options.ocr_configs() {
            let detections = self.recognize(&prepared, config);
            if !detections.is_empty() {
                return Ok(detections);
            }
        }

        Ok(Vec::new())
    }

    /// Concatenation of all detected text, space separated.
    pub fn extract_raw_text(&self, image: &DynamicImage, options: &ExtractOptions) -> Result<String, ScanError> {
        let detections = self.extract_text(image, options)?;
        Ok(detections
            .iter()
            .map(|d| d.raw_text.as_str())
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// Runs a single configuration on a prepared image.
    ///
    /// Boxes are mapped back to source-image coordinates. Blank detections are
    /// dropped.
    pub fn recognize(&self, prepared: &Prepared, config: &OcrConfig) -> Vec<TextDetection> {
        match self.engine.recognize(&prepared.image, config) {
            Ok(detections) => detections
                .into_iter()
                .filter(|d| !d.raw_text.trim().is_empty())
                .map(|d| TextDetection {
                    region: d.region.unscaled(prepared.scale),
                    ..d
                })
                .collect(),
            Err(e) => {
                log(&format!("OCR {} failed: {}", config.describe(), e));
                Vec::new()
            }
        }
    }
}
