use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the data directory: configured `data_dir`, else
/// `<platform data dir>/collection-scanner/`, else `<exe_dir>/data/`.
///
/// Safe to call before the config is loaded.
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = crate::config::try_get_config().and_then(|c| c.data_dir.clone()) {
        return dir;
    }
    dirs::data_local_dir()
        .map(|d| d.join("collection-scanner"))
        .unwrap_or_else(|| get_exe_dir().join("data"))
}

/// Returns the logs directory: `<data_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_data_dir().join("logs")
}

/// Returns the per-user settings and records directory: `<data_dir>/users/`
pub fn get_users_dir() -> PathBuf {
    get_data_dir().join("users")
}

/// Returns the default preview output directory: `<data_dir>/previews/`
pub fn get_previews_dir() -> PathBuf {
    get_data_dir().join("previews")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_users_dir())?;
    std::fs::create_dir_all(get_previews_dir())?;
    Ok(())
}
