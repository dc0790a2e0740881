//! Calibration of the grid and per-cell regions.
//!
//! Provides the typed parameter sets, a live session that turns drag/resize
//! gestures and slider edits into validated settings, overlay previews, and
//! the per-user settings store.

pub mod coords;
pub mod preview;
pub mod session;
pub mod settings;
pub mod state;
pub mod store;

pub use session::CalibrationSession;
pub use settings::CalibrationSettings;
pub use state::CalibrationTarget;
pub use store::{load_or_default, JsonFileStore, PersistingListener, SettingsStore};
