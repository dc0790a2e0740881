//! Application configuration.
//!
//! Loads settings from config.json at startup. Covers the active user, storage
//! locations, the text recognition engine and the optional remote services.
//! Calibration parameters are not stored here; they live in the per-user
//! settings store.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "COLLECTION_SCANNER_CONFIG";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// User whose calibration is loaded and saved
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Root for settings, records and logs. Defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Explicit tesseract executable; otherwise searched in the data dir and PATH
    #[serde(default)]
    pub tesseract_path: Option<PathBuf>,
    #[serde(default = "default_tesseract_lang")]
    pub tesseract_lang: String,
    /// OCR brightness threshold (pixels with R, G, B all > threshold are kept)
    #[serde(default = "default_ocr_threshold")]
    pub ocr_threshold: u8,
    #[serde(default)]
    pub correction_endpoint: Option<String>,
    #[serde(default)]
    pub correction_api_key: Option<String>,
    #[serde(default)]
    pub lookup_endpoint: Option<String>,
    /// Local JSON catalogue; used when no lookup endpoint is configured
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    /// Classify cells on worker threads
    #[serde(default)]
    pub parallel_classification: bool,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_user_id() -> String {
    "default".to_string()
}

fn default_tesseract_lang() -> String {
    "eng".to_string()
}

fn default_ocr_threshold() -> u8 {
    150
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            data_dir: None,
            tesseract_path: None,
            tesseract_lang: default_tesseract_lang(),
            ocr_threshold: default_ocr_threshold(),
            correction_endpoint: None,
            correction_api_key: None,
            lookup_endpoint: None,
            catalog_path: None,
            parallel_classification: false,
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl AppConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Config file location: `$COLLECTION_SCANNER_CONFIG`, else config.json next
/// to the executable.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("config.json")))
        .unwrap_or_else(|| Path::new("config.json").to_path_buf())
}

/// Reads `path`, falling back to defaults when it is missing or malformed.
pub fn load_config_from(path: &Path) -> AppConfig {
    crate::log(&format!("Looking for config at: {}", path.display()));

    if !path.exists() {
        crate::log("config.json not found. Using default config.");
        return AppConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                crate::log("Config loaded from config.json");
                config
            }
            Err(e) => {
                crate::log(&format!("Failed to parse config.json: {}. Using defaults.", e));
                AppConfig::default()
            }
        },
        Err(e) => {
            crate::log(&format!("Failed to read config.json: {}. Using defaults.", e));
            AppConfig::default()
        }
    }
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() {
    let _ = CONFIG.set(load_config_from(&config_path()));
}

/// Returns the global configuration, or `None` before [`init_config`].
pub fn try_get_config() -> Option<&'static AppConfig> {
    CONFIG.get()
}

/// Returns a reference to the global configuration.
/// Panics if called before init_config().
pub fn get_config() -> &'static AppConfig {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
}
