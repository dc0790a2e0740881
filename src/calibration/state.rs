//! Calibration interaction state.
//!
//! Tracks whether the operator is idle, dragging the grid, or resizing it by a
//! corner, along with the pointer and parameters captured at gesture start.

use crate::calibration::coords::Handle;
use crate::calibration::settings::LayoutParameters;

/// Pointer gesture state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InteractionState {
    Idle,
    /// Translating the whole grid.
    Dragging,
    /// Moving one corner; the opposite corner stays fixed.
    Resizing(Handle),
}

impl Default for InteractionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl InteractionState {
    pub fn description(&self) -> String {
        match self {
            Self::Idle => "Idle".to_string(),
            Self::Dragging => "Dragging grid".to_string(),
            Self::Resizing(handle) => format!("Resizing from {:?}", handle),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Snapshot taken on pointer-down so moves are applied relative to the start.
#[derive(Clone, Copy, Debug)]
pub struct GestureAnchor {
    /// Pointer position in image pixels.
    pub pointer: (f64, f64),
    pub layout: LayoutParameters,
}

/// Which parameter set the operator is currently editing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CalibrationTarget {
    #[default]
    Grid,
    TextRegion,
    QuantityRegion,
}

impl CalibrationTarget {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Grid => "Grid",
            Self::TextRegion => "Name label",
            Self::QuantityRegion => "Quantity pips",
        }
    }
}
