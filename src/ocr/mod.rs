//! Text extraction: preprocessing, recognition configs and the engine seam.

pub mod clahe;
pub mod denoise;
pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod setup;

pub use engine::{OcrEngine, TesseractEngine, TextDetection};
pub use extract::{ExtractOptions, TextExtractor, RAW_CONFIG};
pub use preprocess::{ContrastMethod, PreprocessingMode};
pub use setup::ensure_tesseract;
