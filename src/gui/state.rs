//! GUI application state management.
//!
//! Tracks view options and the last outcome shown in the status bar.

use std::path::PathBuf;

use crate::calibration::{CalibrationSession, JsonFileStore, PersistingListener};

/// Session type driven by the window: every emitted change is saved.
pub type PersistedSession = CalibrationSession<PersistingListener<JsonFileStore>>;

/// Last notable outcome, shown in the status bar.
#[derive(Clone, Debug, Default)]
pub enum StatusMessage {
    #[default]
    Idle,
    /// Settings rejected by validation
    Invalid(String),
    /// Preview image written
    Exported(PathBuf),
    Error(String),
}

impl StatusMessage {
    pub fn status_text(&self) -> String {
        match self {
            Self::Idle => "Ready".to_string(),
            Self::Invalid(msg) => format!("Rejected: {}", msg),
            Self::Exported(path) => format!("Preview saved to {}", path.display()),
            Self::Error(msg) => format!("Error: {}", msg),
        }
    }

    pub fn is_problem(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::Error(_))
    }
}

/// GUI application state.
#[derive(Debug)]
pub struct GuiState {
    /// Magnification of the quantity strip debug view.
    pub debug_zoom: u32,
    /// Overlay and debug textures must be re-uploaded.
    pub textures_dirty: bool,
    pub status: StatusMessage,
}

impl Default for GuiState {
    fn default() -> Self {
        Self {
            debug_zoom: 6,
            textures_dirty: true,
            status: StatusMessage::Idle,
        }
    }
}

impl GuiState {
    /// Records the outcome of a parameter edit.
    pub fn apply_result(&mut self, result: anyhow::Result<()>) {
        match result {
            Ok(()) => {
                self.textures_dirty = true;
                if matches!(self.status, StatusMessage::Invalid(_)) {
                    self.status = StatusMessage::Idle;
                }
            }
            Err(e) => self.status = StatusMessage::Invalid(format!("{:#}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_apply_result_tracks_validation() {
        let mut state = GuiState {
            textures_dirty: false,
            ..GuiState::default()
        };

        state.apply_result(Err(anyhow!("grid exceeds image")));
        assert!(state.status.is_problem());
        assert!(!state.textures_dirty);

        state.apply_result(Ok(()));
        assert!(!state.status.is_problem());
        assert!(state.textures_dirty);
    }
}
