//! One request end to end: quality gate, serial search, report.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::input::{load_image, DecodedImage};
use crate::log;
use crate::ocr::{ExtractOptions, OcrEngine, TextDetection, TextExtractor, RAW_CONFIG};
use crate::quality::{QualityAnalyzer, QualityReport};
use crate::serial::{best_candidate, SerialCandidate, SerialFilter};

/// Attached to reports whose quality score is under the advisory threshold.
pub const LOW_QUALITY_ADVISORY: &str = "low contrast/edges";

/// Printed when a scanned image yields no serial.
pub const NO_SERIAL_HINT: &str =
    "no serial detected, try better lighting, a closer shot, or a different angle";

#[derive(Debug, Clone, Serialize)]
pub struct InspectionReport {
    /// Where the image came from, usually its path
    pub source: String,
    /// Container format as decoded, e.g. "png"
    pub format: String,
    pub quality: QualityReport,
    pub quality_advisory: Option<String>,
    pub ocr_skipped: bool,
    pub detections: Vec<TextDetection>,
    pub candidates: Vec<SerialCandidate>,
    pub best: Option<SerialCandidate>,
}

/// Owns everything a request needs. Built once, then used read-only.
pub struct Inspector {
    analyzer: QualityAnalyzer,
    extractor: Option<TextExtractor>,
    filter: SerialFilter,
    options: ExtractOptions,
    config: ScanConfig,
}

impl Inspector {
    /// `engine` is `None` when no OCR backend could be set up; reports then
    /// carry quality only.
    pub fn new(config: ScanConfig, engine: Option<Arc<dyn OcrEngine>>) -> Result<Self> {
        let mut analyzer = QualityAnalyzer::default();
        analyzer.set_thresholds(config.thresholds());

        Ok(Self {
            analyzer,
            extractor: engine.map(TextExtractor::new),
            filter: SerialFilter::new().context("Failed to compile serial rules")?,
            options: ExtractOptions::from_config(&config),
            config,
        })
    }

    pub fn ocr_available(&self) -> bool {
        self.extractor.is_some()
    }

    pub fn inspect_path(&self, path: &Path, run_ocr: bool) -> Result<InspectionReport, ScanError> {
        let decoded = load_image(path)?;
        self.inspect(&path.display().to_string(), &decoded, run_ocr)
    }

    /// Raw OCR text of one image plus any serial found in it.
    ///
    /// Skips the quality gate. Returns `None` when no engine is available.
    pub fn read_text(&self, path: &Path) -> Result<Option<(String, Option<SerialCandidate>)>, ScanError> {
        let Some(extractor) = &self.extractor else {
            return Ok(None);
        };
        let decoded = load_image(path)?;
        let text = extractor.extract_raw_text(&decoded.image, &self.options)?;
        let serial = self.filter.extract_serial_from_raw_text(&text);
        Ok(Some((text, serial)))
    }

    /// Analyzes quality and, unless skipped, searches for a serial number.
    ///
    /// OCR is skipped when `run_ocr` is false, when no engine is available, or
    /// when the image is blurry and `skip_ocr_when_blurry` is set.
    pub fn inspect(
        &self,
        source: &str,
        decoded: &DecodedImage,
        run_ocr: bool,
    ) -> Result<InspectionReport, ScanError> {
        let quality = self.analyzer.analyze(&decoded.image)?;
        log(&format!(
            "{}: sharpness {:.1} ({}), frequency {:.3}, quality {:.1}",
            source,
            quality.sharpness_score,
            if quality.is_sharp { "sharp" } else { "blurry" },
            quality.frequency_score,
            quality.quality_score
        ));

        let quality_advisory = (quality.quality_score < self.config.quality_threshold)
            .then(|| LOW_QUALITY_ADVISORY.to_string());

        let mut report = InspectionReport {
            source: source.to_string(),
            format: format_name(decoded.format),
            quality,
            quality_advisory,
            ocr_skipped: true,
            detections: Vec::new(),
            candidates: Vec::new(),
            best: None,
        };

        let Some(extractor) = self.extractor.as_ref().filter(|_| run_ocr) else {
            return Ok(report);
        };

        if !report.quality.is_sharp && self.config.skip_ocr_when_blurry {
            log(&format!("{}: image is blurry, skipping OCR", source));
            return Ok(report);
        }

        let (detections, candidates) = self.search_serial(extractor, &decoded.image)?;
        report.ocr_skipped = false;
        report.best = best_candidate(&candidates).cloned();
        report.detections = detections;
        report.candidates = candidates;

        Ok(report)
    }

    /// Tries each recognition configuration until one yields a candidate,
    /// then runs the raw grayscale tier once.
    ///
    /// Returns the detections of the attempt that produced candidates, or of
    /// the last attempt that read any text at all.
    fn search_serial(
        &self,
        extractor: &TextExtractor,
        image: &DynamicImage,
    ) -> Result<(Vec<TextDetection>, Vec<SerialCandidate>), ScanError> {
        let min_confidence = self.config.min_confidence;
        let prepared = extractor.prepare(image, &self.options)?;
        let mut last_text = Vec::new();

        for config in self.options.ocr_configs() {
            log(&format!("OCR attempt: {}", config.describe()));
            let detections = extractor.recognize(&prepared, config);
            let candidates = self.filter.filter_candidates(&detections, min_confidence);
            if !candidates.is_empty() {
                return Ok((detections, candidates));
            }
            if !detections.is_empty() {
                last_text = detections;
            }
        }

        log(&format!("OCR fallback: raw grayscale, {}", RAW_CONFIG.describe()));
        let raw = extractor.prepare_raw(image)?;
        let detections = extractor.recognize(&raw, &RAW_CONFIG);
        let candidates = self.filter.filter_candidates(&detections, min_confidence);
        if !candidates.is_empty() || !detections.is_empty() {
            return Ok((detections, candidates));
        }

        Ok((last_text, Vec::new()))
    }
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "png".to_string(),
        ImageFormat::Jpeg => "jpeg".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

/// Human-readable lines for one report.
pub fn summary_lines(report: &InspectionReport) -> Vec<String> {
    let q = &report.quality;
    let mut lines = vec![format!(
        "{} [{}]: sharpness {:.1} ({}), frequency {:.3} ({}), quality {:.1}",
        report.source,
        report.format,
        q.sharpness_score,
        if q.is_sharp { "sharp" } else { "blurry" },
        q.frequency_score,
        if q.is_sharp_frequency { "sharp" } else { "blurry" },
        q.quality_score
    )];

    if let Some(advisory) = &report.quality_advisory {
        lines.push(format!("  note: {}", advisory));
    }

    if report.ocr_skipped {
        lines.push("  OCR skipped".to_string());
        return lines;
    }

    match &report.best {
        Some(best) => {
            lines.push(format!(
                "  serial: {} ({}, confidence {:.2})",
                best.normalized_text,
                best.pattern.describe(),
                best.confidence
            ));
            for other in report.candidates.iter().filter(|c| *c != best) {
                lines.push(format!(
                    "  also: {} (confidence {:.2})",
                    other.normalized_text, other.confidence
                ));
            }
        }
        None => lines.push(format!("  {}", NO_SERIAL_HINT)),
    }

    lines
}

/// Writes a report as pretty-printed JSON.
pub fn export_report(report: &InspectionReport, output_path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    let mut file = File::create(output_path)
        .context(format!("Failed to create JSON file: {}", output_path.display()))?;

    file.write_all(json.as_bytes())
        .context("Failed to write JSON data")?;

    Ok(())
}
