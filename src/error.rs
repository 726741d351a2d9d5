//! Error types surfaced by the scanning core.
//!
//! Application-level plumbing (config, engine setup, CLI) uses `anyhow`.
//! The conditions a caller is expected to branch on live here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Zero-area or single-pixel image; every score would divide by zero.
    #[error("invalid image: {width}x{height} is too small to analyze")]
    InvalidImage { width: u32, height: u32 },
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}
