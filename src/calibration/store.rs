//! Persistence for calibration settings and extracted records.
//!
//! Settings are kept per user as `settings_<user>.json`; every extraction run
//! is written to its own timestamped `records_<user>_<timestamp>.json`.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::PathBuf;

use crate::calibration::session::SettingsListener;
use crate::calibration::settings::CalibrationSettings;
use crate::extraction::ExtractedRecord;

/// Loads and saves calibration settings and final records.
pub trait SettingsStore {
    fn load(&self, user_id: &str) -> Result<Option<CalibrationSettings>>;
    fn save(&self, user_id: &str, settings: &CalibrationSettings) -> Result<()>;
    /// Persists one run's records and returns where they were written.
    fn save_records(&self, user_id: &str, records: &[ExtractedRecord]) -> Result<PathBuf>;
}

/// JSON files under a data directory.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn settings_path(&self, user_id: &str) -> PathBuf {
        self.root
            .join(format!("settings_{}.json", sanitize_user_id(user_id)))
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self, user_id: &str) -> Result<Option<CalibrationSettings>> {
        let path = self.settings_path(user_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(settings))
    }

    fn save(&self, user_id: &str, settings: &CalibrationSettings) -> Result<()> {
        fs::create_dir_all(&self.root).context("Failed to create data directory")?;
        let path = self.settings_path(user_id);
        let json = serde_json::to_string_pretty(settings)?;
        // Write then rename so a crash never leaves half a file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn save_records(&self, user_id: &str, records: &[ExtractedRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).context("Failed to create data directory")?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self.root.join(format!(
            "records_{}_{}.json",
            sanitize_user_id(user_id),
            timestamp
        ));
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Keeps user ids safe to embed in file names.
fn sanitize_user_id(user_id: &str) -> String {
    let cleaned: String = user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

/// Loads a user's settings, falling back to defaults when none are saved or the
/// saved file is unreadable or fails validation.
pub fn load_or_default(store: &dyn SettingsStore, user_id: &str) -> CalibrationSettings {
    match store.load(user_id) {
        Ok(Some(settings)) => match settings.validate() {
            Ok(()) => {
                crate::log(&format!("Calibration loaded for user '{}'", user_id));
                settings
            }
            Err(e) => {
                crate::log(&format!(
                    "Saved calibration for user '{}' is invalid: {:#}. Using defaults.",
                    user_id, e
                ));
                CalibrationSettings::default()
            }
        },
        Ok(None) => {
            crate::log(&format!("No calibration saved for user '{}'. Using defaults.", user_id));
            CalibrationSettings::default()
        }
        Err(e) => {
            crate::log(&format!("Failed to load calibration: {:#}. Using defaults.", e));
            CalibrationSettings::default()
        }
    }
}

/// Session listener that writes every emitted change through a store.
///
/// Save failures are logged and kept for display; calibration carries on.
pub struct PersistingListener<S: SettingsStore> {
    store: S,
    user_id: String,
    saves: usize,
    last_error: Option<String>,
}

impl<S: SettingsStore> PersistingListener<S> {
    pub fn new(store: S, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            saves: 0,
            last_error: None,
        }
    }

    pub fn saves(&self) -> usize {
        self.saves
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl<S: SettingsStore> SettingsListener for PersistingListener<S> {
    fn parameters_changed(&mut self, settings: &CalibrationSettings) {
        match self.store.save(&self.user_id, settings) {
            Ok(()) => {
                self.saves += 1;
                self.last_error = None;
            }
            Err(e) => {
                crate::log(&format!("Calibration: failed to save settings: {:#}", e));
                self.last_error = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Quantity;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("alice").unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));
        let mut settings = CalibrationSettings::default();
        settings.layout.start_x = 0.05;
        settings.occupancy.edge_threshold = 0.03;

        store.save("alice", &settings).unwrap();
        assert_eq!(store.load("alice").unwrap(), Some(settings));
        assert!(store.load("bob").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        fs::write(dir.path().join("settings_alice.json"), "{ not json").unwrap();
        assert!(store.load("alice").is_err());
        assert_eq!(load_or_default(&store, "alice"), CalibrationSettings::default());
    }

    #[test]
    fn test_invalid_saved_settings_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut settings = CalibrationSettings::default();
        // Grid would extend past the right edge
        settings.layout.start_x = 0.5;
        store.save("alice", &settings).unwrap();

        assert_eq!(store.load("alice").unwrap(), Some(settings));
        let loaded = load_or_default(&store, "alice");
        assert_eq!(loaded, CalibrationSettings::default());
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_user_id_is_sanitized() {
        assert_eq!(sanitize_user_id("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_user_id(""), "default");
    }

    #[test]
    fn test_persisting_listener_saves() {
        let dir = tempdir().unwrap();
        let mut listener = PersistingListener::new(JsonFileStore::new(dir.path()), "alice");
        let mut settings = CalibrationSettings::default();
        settings.layout.start_y = 0.25;
        listener.parameters_changed(&settings);
        assert_eq!(listener.saves(), 1);
        assert!(listener.last_error().is_none());

        let reloaded = JsonFileStore::new(dir.path()).load("alice").unwrap();
        assert_eq!(reloaded, Some(settings));
    }

    #[test]
    fn test_save_records_writes_json_array() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let records = vec![ExtractedRecord {
            column: 1,
            row: 1,
            raw_text: "Fire Drake".to_string(),
            name: "Fire Drake".to_string(),
            quantity: Quantity::Unlimited,
            confidence: Some(0.9),
            reference: None,
        }];
        let path = store.save_records("alice", &records).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json[0]["quantity"], -1);
        assert_eq!(json[0]["rawText"], "Fire Drake");
    }
}
