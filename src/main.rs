//! Serial Scan
//!
//! Checks photos of engraved or printed component labels for blur, then
//! reads the serial number off the sharp ones with Tesseract.

mod cli;
mod config;
mod error;
mod input;
mod inspect;
mod ocr;
mod paths;
mod quality;
mod serial;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::Parser;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::inspect::{export_report, summary_lines, InspectionReport, Inspector};
use crate::ocr::{OcrEngine, TesseractEngine};

/// Console echo for `log`. Turned off when stdout carries JSON.
static LOG_TO_CONSOLE: AtomicBool = AtomicBool::new(true);

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    if LOG_TO_CONSOLE.load(Ordering::Relaxed) {
        print!("{}", line);
    }
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths::get_log_file())
    {
        let _ = file.write_all(line.as_bytes());
    }
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };
        let log_msg = format!("[PANIC]{} {}\n", location, msg);
        eprintln!("{}", log_msg);
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(paths::get_log_file())
        {
            let _ = file.write_all(log_msg.as_bytes());
        }
    }));
}

/// Locates Tesseract. A missing engine is not fatal; reports fall back to quality only.
fn setup_engine(config: &config::ScanConfig) -> Option<Arc<dyn OcrEngine>> {
    match ocr::ensure_tesseract(config) {
        Ok(paths) => {
            let engine: Arc<dyn OcrEngine> =
                Arc::new(TesseractEngine::new(paths, config.language.clone()));
            Some(engine)
        }
        Err(e) => {
            log(&format!("Warning: Failed to setup Tesseract: {}", e));
            log("OCR unavailable, reporting image quality only.");
            None
        }
    }
}

/// `--text` mode: raw OCR output per image, no quality gate.
fn print_text(inspector: &Inspector, images: &[std::path::PathBuf]) -> Result<()> {
    if !inspector.ocr_available() {
        return Err(anyhow!("--text needs Tesseract, which could not be set up"));
    }

    for image in images {
        match inspector.read_text(image) {
            Ok(Some((text, serial))) => {
                log(&format!("{}: \"{}\"", image.display(), text));
                match serial {
                    Some(candidate) => log(&format!(
                        "  serial: {} ({})",
                        candidate.normalized_text,
                        candidate.pattern.describe()
                    )),
                    None => log(&format!("  {}", inspect::NO_SERIAL_HINT)),
                }
            }
            Ok(None) => {}
            Err(e) => log(&format!("{}: {}", image.display(), e)),
        }
    }

    Ok(())
}

/// Per-image failure. With `--json` the console echo is off, so the line
/// also goes to `err` to stay visible without touching stdout.
fn report_failure(err: &mut impl Write, json: bool, image: &Path, e: &dyn std::fmt::Display) {
    let msg = format!("{}: {}", image.display(), e);
    log(&msg);
    if json {
        let _ = writeln!(err, "{}", msg);
    }
}

fn report_path(dir: &Path, image: &Path) -> std::path::PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "report".to_string());
    dir.join(format!("{}.json", stem))
}

fn main() -> Result<()> {
    install_panic_hook();

    let args = cli::Args::parse();
    if args.json {
        LOG_TO_CONSOLE.store(false, Ordering::Relaxed);
    }

    paths::ensure_directories()?;

    let config_path = config::resolve_config_path(args.config.as_deref());
    let mut scan_config = config::load_config(&config_path);
    args.apply_overrides(&mut scan_config);
    config::init_config(scan_config);
    let scan_config = config::get_config();

    let engine = if args.no_ocr {
        None
    } else {
        setup_engine(scan_config)
    };

    let inspector = Inspector::new(scan_config.clone(), engine)?;

    if args.text {
        return print_text(&inspector, &args.images);
    }

    if let Some(dir) = &args.report_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create report dir: {}", dir.display()))?;
    }

    let mut reports: Vec<InspectionReport> = Vec::new();
    let mut failures = 0usize;

    for image in &args.images {
        let report = match inspector.inspect_path(image, !args.no_ocr) {
            Ok(report) => report,
            Err(e) => {
                report_failure(&mut std::io::stderr(), args.json, image, &e);
                failures += 1;
                continue;
            }
        };

        if let Some(dir) = &args.report_dir {
            let path = report_path(dir, image);
            export_report(&report, &path)?;
            log(&format!("Report written to {}", path.display()));
        }

        if args.json {
            reports.push(report);
        } else {
            for line in summary_lines(&report) {
                log(&line);
            }
        }
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialize reports")?
        );
    }

    if failures == args.images.len() {
        return Err(anyhow!("None of the {} image(s) could be processed", failures));
    }

    Ok(())
}
