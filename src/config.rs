//! Scan configuration.
//!
//! Loaded once at startup from config.json. Every field has a default so a
//! partial file, or no file at all, still yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::ocr::extract::DEFAULT_UPSCALE_BELOW;
use crate::ocr::{ContrastMethod, PreprocessingMode};
use crate::quality::{QualityThresholds, DEFAULT_FREQUENCY_THRESHOLD, DEFAULT_SHARPNESS_THRESHOLD};

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<ScanConfig> = OnceLock::new();

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "SERIAL_SCAN_CONFIG";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Laplacian variance above which an image counts as sharp
    #[serde(default = "default_sharpness_threshold")]
    pub sharpness_threshold: f64,
    /// High-frequency energy ratio above which an image counts as sharp
    #[serde(default = "default_frequency_threshold")]
    pub frequency_threshold: f64,
    /// Quality score below which the report carries a low-contrast note.
    /// Never blocks processing.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    /// Detections at or below this confidence are not considered
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    #[serde(default = "default_true")]
    pub enhance_contrast: bool,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f32,
    /// Only upscale when the shorter side is below this many pixels
    #[serde(default = "default_upscale_below")]
    pub upscale_below: Option<u32>,
    #[serde(default)]
    pub preprocessing_mode: PreprocessingMode,
    #[serde(default)]
    pub contrast_method: ContrastMethod,
    /// Dark text on a light background
    #[serde(default)]
    pub invert: bool,
    /// Try several page segmentation modes before giving up
    #[serde(default = "default_true")]
    pub ocr_fallback: bool,
    #[serde(default = "default_true")]
    pub skip_ocr_when_blurry: bool,

    /// Tesseract language code
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub tesseract_path: Option<PathBuf>,
    #[serde(default)]
    pub tessdata_dir: Option<PathBuf>,
    /// Fetch missing traineddata from the tessdata repository
    #[serde(default = "default_true")]
    pub download_tessdata: bool,
}

fn default_sharpness_threshold() -> f64 {
    DEFAULT_SHARPNESS_THRESHOLD
}

fn default_frequency_threshold() -> f64 {
    DEFAULT_FREQUENCY_THRESHOLD
}

fn default_quality_threshold() -> f64 {
    50.0
}

fn default_min_confidence() -> f32 {
    0.3
}

fn default_scale_factor() -> f32 {
    2.0
}

fn default_upscale_below() -> Option<u32> {
    Some(DEFAULT_UPSCALE_BELOW)
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sharpness_threshold: default_sharpness_threshold(),
            frequency_threshold: default_frequency_threshold(),
            quality_threshold: default_quality_threshold(),
            min_confidence: default_min_confidence(),
            enhance_contrast: true,
            scale_factor: default_scale_factor(),
            upscale_below: default_upscale_below(),
            preprocessing_mode: PreprocessingMode::default(),
            contrast_method: ContrastMethod::default(),
            invert: false,
            ocr_fallback: true,
            skip_ocr_when_blurry: true,
            language: default_language(),
            tesseract_path: None,
            tessdata_dir: None,
            download_tessdata: true,
        }
    }
}

impl ScanConfig {
    pub fn thresholds(&self) -> QualityThresholds {
        QualityThresholds {
            sharpness: self.sharpness_threshold,
            frequency: self.frequency_threshold,
        }
    }
}

/// Picks the config file: explicit path, then `SERIAL_SCAN_CONFIG`, then
/// config.json next to the executable.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
        return PathBuf::from(path);
    }

    crate::paths::get_exe_dir().join("config.json")
}

/// Loads configuration from `path`, falling back to defaults on any problem.
pub fn load_config(path: &Path) -> ScanConfig {
    crate::log(&format!("Looking for config at: {}", path.display()));

    if !path.exists() {
        crate::log("Config file not found. Using default config.");
        return ScanConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                crate::log(&format!("Config loaded from {}", path.display()));
                config
            }
            Err(e) => {
                crate::log(&format!(
                    "Failed to parse {}: {}. Using defaults.",
                    path.display(),
                    e
                ));
                ScanConfig::default()
            }
        },
        Err(e) => {
            crate::log(&format!(
                "Failed to read {}: {}. Using defaults.",
                path.display(),
                e
            ));
            ScanConfig::default()
        }
    }
}

/// Stores the configuration for the rest of the run. Call once at startup;
/// later calls are ignored.
pub fn init_config(config: ScanConfig) {
    let _ = CONFIG.set(config);
}

/// Returns the global configuration, or defaults if `init_config` was never called.
pub fn get_config() -> &'static ScanConfig {
    CONFIG.get_or_init(ScanConfig::default)
}
