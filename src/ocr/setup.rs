use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::log;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Resolved Tesseract installation.
#[derive(Clone, Debug)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets Tesseract use its compiled-in data path.
    pub tessdata: Option<PathBuf>,
}

/// Returns the directory for locally managed Tesseract files
pub fn get_tesseract_dir() -> PathBuf {
    crate::paths::get_data_dir().join("tesseract")
}

fn executable_name() -> &'static str {
    if cfg!(windows) { "tesseract.exe" } else { "tesseract" }
}

/// Locates Tesseract and trained data for `lang`, downloading the trained data
/// into the local tessdata directory when it is missing everywhere.
pub fn ensure_tesseract(configured: Option<&Path>, lang: &str) -> Result<TesseractPaths> {
    let executable = find_tesseract_executable(configured)?;
    log(&format!("Tesseract executable: {}", executable.display()));

    let tessdata = match find_tessdata_dir(lang) {
        Some(dir) => Some(dir),
        None if system_has_language(&executable, lang) => None,
        None => {
            let dir = get_tesseract_dir().join("tessdata");
            download_tessdata(&dir, lang)?;
            Some(dir)
        }
    };

    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Finds the Tesseract executable: configured path, local dir, PATH, then common install paths
pub fn find_tesseract_executable(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        log(&format!(
            "Configured Tesseract path {} does not exist, searching elsewhere",
            path.display()
        ));
    }

    let local_exe = get_tesseract_dir().join(executable_name());
    if local_exe.exists() {
        return Ok(local_exe);
    }

    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    let common_paths = [
        r"C:\Program Files\Tesseract-OCR\tesseract.exe",
        r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
        "/usr/bin/tesseract",
        "/usr/local/bin/tesseract",
        "/opt/homebrew/bin/tesseract",
    ];

    for path in &common_paths {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory containing `<lang>.traineddata`
pub fn find_tessdata_dir(lang: &str) -> Option<PathBuf> {
    let file = format!("{}.traineddata", lang);
    let local = get_tesseract_dir().join("tessdata");
    if local.join(&file).exists() {
        return Some(local);
    }

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if p.join(&file).exists() {
            return Some(p);
        }
        let p = p.join("tessdata");
        if p.join(&file).exists() {
            return Some(p);
        }
    }

    let system_paths = [
        r"C:\Program Files\Tesseract-OCR\tessdata",
        r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
    ];
    system_paths
        .iter()
        .map(PathBuf::from)
        .find(|p| p.join(&file).exists())
}

/// Asks Tesseract whether its built-in data path already has the language.
fn system_has_language(executable: &Path, lang: &str) -> bool {
    match Command::new(executable).arg("--list-langs").output() {
        Ok(output) if output.status.success() => {
            // Tesseract prints the list on stdout or stderr depending on version
            let mut text = String::from_utf8_lossy(&output.stdout).to_string();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            text.lines().any(|line| line.trim() == lang)
        }
        _ => false,
    }
}

/// Downloads trained data for `lang` into `tessdata_dir`
fn download_tessdata(tessdata_dir: &Path, lang: &str) -> Result<()> {
    fs::create_dir_all(tessdata_dir).context("Failed to create tessdata directory")?;
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, lang);
    let target = tessdata_dir.join(format!("{}.traineddata", lang));

    log(&format!("Downloading {}.traineddata...", lang));

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "collection-scanner")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}.traineddata: HTTP {}",
            lang,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    fs::write(&target, &bytes)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    log(&format!(
        "Downloaded {}.traineddata ({} bytes)",
        lang,
        bytes.len()
    ));

    Ok(())
}
