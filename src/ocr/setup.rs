use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::ScanConfig;
use crate::log;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "tesseract";

#[cfg(windows)]
const COMMON_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];
#[cfg(not(windows))]
const COMMON_INSTALL_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"];

#[cfg(windows)]
const SYSTEM_TESSDATA_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
];
#[cfg(not(windows))]
const SYSTEM_TESSDATA_DIRS: &[&str] = &[
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
];

/// Where the engine binary and its language data live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets Tesseract use its compiled-in data directory
    pub tessdata: Option<PathBuf>,
}

/// Directory for language data downloaded by this tool.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("serial-scan")
        .join("tesseract")
}

/// Resolves the Tesseract executable and language data, downloading the
/// `<language>.traineddata` model if nothing on the system provides it.
pub fn ensure_tesseract(config: &ScanConfig) -> Result<TesseractPaths> {
    let executable = match &config.tesseract_path {
        Some(path) => {
            if !responds_to_version(path) {
                return Err(anyhow!(
                    "Configured tesseract_path does not run: {}",
                    path.display()
                ));
            }
            path.clone()
        }
        None => find_tesseract_executable()?,
    };
    log(&format!("Tesseract executable: {}", executable.display()));

    let language = config.language.as_str();

    if let Some(dir) = &config.tessdata_dir {
        if !dir.join(traineddata_name(language)).exists() {
            log(&format!(
                "Warning: {} not found in configured tessdata_dir {}",
                traineddata_name(language),
                dir.display()
            ));
        }
        return Ok(TesseractPaths {
            executable,
            tessdata: Some(dir.clone()),
        });
    }

    if let Some(dir) = find_tessdata_dir(language) {
        log(&format!("Using tessdata at: {}", dir.display()));
        return Ok(TesseractPaths {
            executable,
            tessdata: Some(dir),
        });
    }

    if list_languages(&executable).iter().any(|l| l == language) {
        log(&format!("Tesseract reports built-in language data for '{}'", language));
        return Ok(TesseractPaths {
            executable,
            tessdata: None,
        });
    }

    if !config.download_tessdata {
        log(&format!(
            "Warning: no {} found and download_tessdata is disabled, using Tesseract defaults",
            traineddata_name(language)
        ));
        return Ok(TesseractPaths {
            executable,
            tessdata: None,
        });
    }

    let tessdata_dir = get_tesseract_dir().join("tessdata");
    match download_tessdata(&tessdata_dir, language) {
        Ok(()) => Ok(TesseractPaths {
            executable,
            tessdata: Some(tessdata_dir),
        }),
        Err(e) => {
            log(&format!(
                "Warning: tessdata download failed ({}), using Tesseract defaults",
                e
            ));
            Ok(TesseractPaths {
                executable,
                tessdata: None,
            })
        }
    }
}

fn traineddata_name(language: &str) -> String {
    format!("{}.traineddata", language)
}

fn responds_to_version(executable: &Path) -> bool {
    Command::new(executable)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Languages the executable can load without an explicit tessdata dir.
fn list_languages(executable: &Path) -> Vec<String> {
    let Ok(output) = Command::new(executable).arg("--list-langs").output() else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }
    parse_language_list(&String::from_utf8_lossy(&output.stdout))
}

/// Parses `tesseract --list-langs`, whose first line is a header.
fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Downloads `<language>.traineddata` into `tessdata_dir`
fn download_tessdata(tessdata_dir: &Path, language: &str) -> Result<()> {
    fs::create_dir_all(tessdata_dir)
        .with_context(|| format!("Failed to create {}", tessdata_dir.display()))?;

    let file_name = traineddata_name(language);
    let url = format!("{}/{}", TESSDATA_REPO, file_name);
    let target = tessdata_dir.join(&file_name);

    log(&format!("Downloading {}...", file_name));

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "serial-scan")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}: HTTP {}",
            file_name,
            response.status()
        ));
    }

    let bytes = response.bytes()?;

    // Write to a temp name first so an interrupted download never looks complete
    let partial = tessdata_dir.join(format!("{}.part", file_name));
    let mut file = fs::File::create(&partial)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&partial, &target)?;

    log(&format!("Downloaded {} ({} bytes)", file_name, bytes.len()));

    Ok(())
}

/// Finds the Tesseract executable: our local dir, PATH, then common install locations.
pub fn find_tesseract_executable() -> Result<PathBuf> {
    let local_exe = get_tesseract_dir().join(EXECUTABLE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    let on_path = PathBuf::from(EXECUTABLE_NAME);
    if responds_to_version(&on_path) {
        return Ok(on_path);
    }

    for dir in COMMON_INSTALL_DIRS {
        let candidate = Path::new(dir).join(EXECUTABLE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install tesseract-ocr or set tesseract_path in config.json."
    ))
}

/// Finds a tessdata directory holding `<language>.traineddata`.
///
/// Checks our download dir, then `TESSDATA_PREFIX` (both the dir itself and
/// its `tessdata` child), then well-known system locations.
pub fn find_tessdata_dir(language: &str) -> Option<PathBuf> {
    let mut candidates = vec![get_tesseract_dir().join("tessdata")];

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let prefix = PathBuf::from(prefix);
        candidates.push(prefix.join("tessdata"));
        candidates.push(prefix);
    }

    candidates.extend(SYSTEM_TESSDATA_DIRS.iter().map(PathBuf::from));

    first_with_language(&candidates, language)
}

fn first_with_language(candidates: &[PathBuf], language: &str) -> Option<PathBuf> {
    let file_name = traineddata_name(language);
    candidates
        .iter()
        .find(|dir| dir.join(&file_name).exists())
        .cloned()
}
