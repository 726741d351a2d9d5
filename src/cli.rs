//! Command line arguments for the `serial-scan` binary.

use clap::Parser;
use std::path::PathBuf;

use crate::config::ScanConfig;
use crate::ocr::PreprocessingMode;

#[derive(Parser, Debug)]
#[command(
    name = "serial-scan",
    about = "Checks component photos for blur and reads their serial numbers",
    version
)]
pub struct Args {
    /// Config file (default: $SERIAL_SCAN_CONFIG, then config.json next to the binary)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the reports as JSON instead of a summary
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Laplacian variance above which an image counts as sharp
    #[arg(long, value_name = "N")]
    pub sharpness_threshold: Option<f64>,

    /// Minimum OCR confidence (0-1) for a serial candidate
    #[arg(long, value_name = "X")]
    pub min_confidence: Option<f32>,

    /// Preprocessing pipeline used before OCR
    #[arg(long, value_enum, value_name = "MODE")]
    pub mode: Option<PreprocessingMode>,

    /// Only report image quality
    #[arg(long, conflicts_with = "text")]
    pub no_ocr: bool,

    /// Print the raw OCR text of each image, skipping the blur check
    #[arg(long)]
    pub text: bool,

    /// Also write one <image>.json report per input into this directory
    #[arg(long, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// PNG or JPEG images to scan
    #[arg(required = true, value_name = "IMAGE")]
    pub images: Vec<PathBuf>,
}

impl Args {
    /// Applies flags that override config file values.
    pub fn apply_overrides(&self, config: &mut ScanConfig) {
        if let Some(threshold) = self.sharpness_threshold {
            config.sharpness_threshold = threshold;
        }
        if let Some(min_confidence) = self.min_confidence {
            config.min_confidence = min_confidence;
        }
        if let Some(mode) = self.mode {
            config.preprocessing_mode = mode;
        }
    }
}
