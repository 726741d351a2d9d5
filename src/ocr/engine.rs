use image::GrayImage;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;
use thiserror::Error;

use super::setup::TesseractPaths;

/// Characters allowed by the digits-only configurations.
pub const DIGITS: &str = "0123456789";

/// Characters allowed by the alphanumeric configurations.
pub const ALPHANUMERIC: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Maps a box found on an image upscaled by `scale` back to the source image.
    pub fn unscaled(&self, scale: f32) -> Self {
        if scale <= 0.0 || scale == 1.0 {
            return *self;
        }
        Self {
            x: self.x / scale,
            y: self.y / scale,
            width: self.width / scale,
            height: self.height / scale,
        }
    }
}

/// One span of text reported by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextDetection {
    pub raw_text: String,
    /// Engine confidence in [0, 1]
    pub confidence: f32,
    pub region: BoundingBox,
}

/// Page segmentation mode plus an optional character whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrConfig {
    pub page_seg_mode: u8,
    pub char_whitelist: Option<&'static str>,
}

impl OcrConfig {
    pub const fn new(page_seg_mode: u8, char_whitelist: Option<&'static str>) -> Self {
        Self {
            page_seg_mode,
            char_whitelist,
        }
    }

    /// Short label for logs, e.g. "psm 8 (digits)".
    pub fn describe(&self) -> String {
        let charset = match self.char_whitelist {
            Some(DIGITS) => "digits",
            Some(ALPHANUMERIC) => "alphanumeric",
            Some(_) => "custom",
            None => "any",
        };
        format!("psm {} ({})", self.page_seg_mode, charset)
    }
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to run OCR engine: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write OCR input image: {0}")]
    Image(#[from] image::ImageError),
    #[error("OCR engine failed: {0}")]
    EngineFailed(String),
}

/// Seam between the text extractor and whatever actually reads the pixels.
///
/// Implementations are constructed once and shared read-only across requests.
pub trait OcrEngine: Send + Sync {
    /// Recognizes text on an already-preprocessed image.
    ///
    /// Returns one detection per word span, in engine order, with boxes in
    /// the coordinates of `image`.
    fn recognize(
        &self,
        image: &GrayImage,
        config: &OcrConfig,
    ) -> Result<Vec<TextDetection>, OcrError>;
}

/// Runs the `tesseract` executable and parses its TSV output.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    language: String,
}

impl TesseractEngine {
    pub fn new(paths: TesseractPaths, language: impl Into<String>) -> Self {
        Self {
            executable: paths.executable,
            tessdata: paths.tessdata,
            language: language.into(),
        }
    }

    fn build_command(&self, input: &std::path::Path, output_base: &str, config: &OcrConfig) -> Command {
        let mut command = Command::new(&self.executable);
        command.arg(input).arg(output_base);

        if let Some(tessdata) = &self.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }

        command
            .arg("-l")
            .arg(&self.language)
            .arg("--oem")
            .arg("3")
            .arg("--psm")
            .arg(config.page_seg_mode.to_string());

        if let Some(whitelist) = config.char_whitelist {
            command
                .arg("-c")
                .arg(format!("tessedit_char_whitelist={}", whitelist));
        }

        command.arg("tsv");
        command
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(
        &self,
        image: &GrayImage,
        config: &OcrConfig,
    ) -> Result<Vec<TextDetection>, OcrError> {
        // Each call gets its own temp files so concurrent calls never collide.
        let temp_input = NamedTempFile::with_suffix(".png")?;
        image.save(temp_input.path())?;

        // Tesseract appends the .tsv extension itself
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let tsv = TsvFile(PathBuf::from(format!("{}.tsv", output_base)));

        let output = self
            .build_command(temp_input.path(), &output_base, config)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::EngineFailed(stderr.trim().to_string()));
        }

        Ok(parse_tsv_output(&std::fs::read_to_string(&tsv.0)?))
    }
}

/// The `<base>.tsv` file Tesseract writes next to the output base.
/// Removed on drop, whether or not the run succeeded.
struct TsvFile(PathBuf);

impl Drop for TsvFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Parses Tesseract TSV output into word-level detections.
///
/// Rows other than level 5 (word), rows with empty text and rows with a
/// negative confidence are skipped. Confidence is rescaled from 0-100 to 0-1.
pub fn parse_tsv_output(tsv: &str) -> Vec<TextDetection> {
    let mut detections = Vec::new();

    for line in tsv.lines().skip(1) {
        // Skip header
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let level: i32 = fields[0].trim().parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }

        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        if conf < 0.0 {
            continue;
        }

        let coord = |i: usize| -> f32 { fields[i].trim().parse().unwrap_or(0.0) };

        detections.push(TextDetection {
            raw_text: text.to_string(),
            confidence: (conf / 100.0).clamp(0.0, 1.0),
            region: BoundingBox {
                x: coord(6),
                y: coord(7),
                width: coord(8),
                height: coord(9),
            },
        });
    }

    detections
}
