use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    // The binary looks for config.json next to itself, so ship the sample one there.
    if let Some(target_dir) = target_dir() {
        copy_config(&target_dir);
    }
    println!("cargo:rerun-if-changed=config.json");
}

/// Resolves target/<profile> from OUT_DIR (target/<profile>/build/<pkg>-<hash>/out).
fn target_dir() -> Option<PathBuf> {
    let out_dir = env::var("OUT_DIR").ok()?;
    Path::new(&out_dir).ancestors().nth(3).map(Path::to_path_buf)
}

/// Copies config.json to the target directory if the source tree has one.
fn copy_config(target_dir: &Path) {
    let config_src = Path::new("config.json");
    if config_src.exists() {
        let _ = fs::copy(config_src, target_dir.join("config.json"));
    }
}
