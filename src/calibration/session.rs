//! Live calibration session.
//!
//! Binds operator gestures and slider edits to the calibration settings. Every
//! change recomputes the cell overlay and re-reads the selected cell; the
//! owning listener is notified only when the serialized settings differ from
//! what it last received, so a pointer-move storm produces one write.

use anyhow::{anyhow, Result};
use image::RgbaImage;

use crate::calibration::coords::{display_to_image, hit_test, Handle, HitTarget};
use crate::calibration::preview::{render_overlay, render_quantity_debug};
use crate::calibration::settings::{
    CalibrationSettings, LayoutParameters, OccupancyThresholds, QuantityRegionParameters,
    TextRegionParameters, MIN_GRID_FRACTION,
};
use crate::calibration::state::{CalibrationTarget, GestureAnchor, InteractionState};
use crate::grid::geometry::grid_bounds;
use crate::grid::{
    analyze_occupancy, analyze_quantity, compute_grid_cells, CollectingDiagnostics, GridCell,
    OccupancyAnalysis, QuantityAnalysis, CELL_COUNT,
};

/// Receives settings whenever they actually change.
pub trait SettingsListener {
    fn parameters_changed(&mut self, settings: &CalibrationSettings);
}

impl<F: FnMut(&CalibrationSettings)> SettingsListener for F {
    fn parameters_changed(&mut self, settings: &CalibrationSettings) {
        self(settings)
    }
}

/// Interactive calibration over one screenshot.
pub struct CalibrationSession<L: SettingsListener> {
    image: RgbaImage,
    settings: CalibrationSettings,
    /// Display pixels per image pixel.
    display_scale: f64,
    state: InteractionState,
    anchor: Option<GestureAnchor>,
    target: CalibrationTarget,
    cells: Vec<GridCell>,
    selected_cell: usize,
    occupancy_preview: OccupancyAnalysis,
    quantity_preview: QuantityAnalysis,
    preview_notes: Vec<String>,
    last_emitted: Option<serde_json::Value>,
    listener: L,
}

impl<L: SettingsListener> CalibrationSession<L> {
    /// Starts a session. Invalid settings are rejected up front.
    pub fn new(image: RgbaImage, settings: CalibrationSettings, listener: L) -> Result<Self> {
        settings.validate()?;
        let cells = compute_grid_cells(image.width(), image.height(), &settings.layout);
        let (occupancy_preview, quantity_preview, preview_notes) =
            classify_cell(&image, &cells[0], &settings);

        Ok(Self {
            image,
            settings,
            display_scale: 1.0,
            state: InteractionState::Idle,
            anchor: None,
            target: CalibrationTarget::Grid,
            cells,
            selected_cell: 0,
            occupancy_preview,
            quantity_preview,
            preview_notes,
            last_emitted: None,
            listener,
        })
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn target(&self) -> CalibrationTarget {
        self.target
    }

    /// Switches the edited parameter set, ending any gesture in progress.
    pub fn set_target(&mut self, target: CalibrationTarget) {
        self.target = target;
        self.pointer_up();
    }

    pub fn selected_cell(&self) -> &GridCell {
        &self.cells[self.selected_cell]
    }

    pub fn selected_index(&self) -> usize {
        self.selected_cell
    }

    pub fn occupancy_preview(&self) -> &OccupancyAnalysis {
        &self.occupancy_preview
    }

    pub fn quantity_preview(&self) -> &QuantityAnalysis {
        &self.quantity_preview
    }

    /// Diagnostic lines from the last classification of the selected cell.
    pub fn preview_notes(&self) -> &[String] {
        &self.preview_notes
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn set_display_scale(&mut self, scale: f64) {
        if scale.is_finite() && scale > 0.0 {
            self.display_scale = scale;
        }
    }

    /// Begins a drag or resize if the pointer lands on the grid or a corner.
    /// Only the grid is edited by gestures; other targets use setters.
    /// Returns true when a gesture started.
    pub fn pointer_down(&mut self, display_x: f64, display_y: f64) -> bool {
        if self.target != CalibrationTarget::Grid {
            self.state = InteractionState::Idle;
            self.anchor = None;
            return false;
        }
        let (x, y) = display_to_image(display_x, display_y, self.display_scale);
        let bounds = grid_bounds(self.image.width(), self.image.height(), &self.settings.layout);

        self.state = match hit_test(&bounds, x, y) {
            Some(HitTarget::Corner(handle)) => InteractionState::Resizing(handle),
            Some(HitTarget::Interior) => InteractionState::Dragging,
            None => InteractionState::Idle,
        };

        if self.state.is_active() {
            self.anchor = Some(GestureAnchor {
                pointer: (x, y),
                layout: self.settings.layout,
            });
            true
        } else {
            self.anchor = None;
            false
        }
    }

    /// Applies the current gesture. Moves while idle are ignored.
    pub fn pointer_move(&mut self, display_x: f64, display_y: f64) {
        let anchor = match (self.state, self.anchor) {
            (InteractionState::Idle, _) | (_, None) => return,
            (_, Some(anchor)) => anchor,
        };

        let (x, y) = display_to_image(display_x, display_y, self.display_scale);
        let dx = (x - anchor.pointer.0) / self.image.width().max(1) as f64;
        let dy = (y - anchor.pointer.1) / self.image.height().max(1) as f64;

        let layout = match self.state {
            InteractionState::Dragging => translated(&anchor.layout, dx, dy),
            InteractionState::Resizing(handle) => resized(&anchor.layout, handle, dx, dy),
            InteractionState::Idle => return,
        };

        // Gestures never push an invalid layout; the last valid one stays
        if layout.validate().is_ok() {
            self.settings.layout = layout;
        }
        self.recompute();
    }

    pub fn pointer_up(&mut self) {
        self.state = InteractionState::Idle;
        self.anchor = None;
    }

    pub fn set_layout(&mut self, layout: LayoutParameters) -> Result<()> {
        layout.validate()?;
        self.settings.layout = layout;
        self.recompute();
        Ok(())
    }

    pub fn set_text_region(&mut self, region: TextRegionParameters) -> Result<()> {
        region.validate()?;
        self.settings.text_region = region;
        self.recompute();
        Ok(())
    }

    pub fn set_quantity_region(&mut self, region: QuantityRegionParameters) -> Result<()> {
        region.validate()?;
        self.settings.quantity_region = region;
        self.recompute();
        Ok(())
    }

    pub fn set_occupancy_thresholds(&mut self, thresholds: OccupancyThresholds) -> Result<()> {
        thresholds.validate()?;
        self.settings.occupancy = thresholds;
        self.recompute();
        Ok(())
    }

    /// Replaces every parameter set at once, e.g. after "reset to defaults".
    pub fn set_settings(&mut self, settings: CalibrationSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        self.recompute();
        Ok(())
    }

    pub fn select_cell(&mut self, index: usize) -> Result<()> {
        if index >= CELL_COUNT {
            return Err(anyhow!("cell index {} out of range (0..{})", index, CELL_COUNT));
        }
        self.selected_cell = index;
        self.refresh_previews();
        Ok(())
    }

    /// Selects the cell under a display-space point. Returns false when the
    /// point lies between or outside the cells.
    pub fn select_cell_at(&mut self, display_x: f64, display_y: f64) -> bool {
        let (x, y) = display_to_image(display_x, display_y, self.display_scale);
        let hit = self
            .cells
            .iter()
            .find(|cell| cell.bounds.contains_with_tolerance(x, y, 0.0))
            .map(GridCell::index);
        match hit {
            Some(index) => self.select_cell(index).is_ok(),
            None => false,
        }
    }

    pub fn next_cell(&mut self) {
        self.selected_cell = (self.selected_cell + 1) % CELL_COUNT;
        self.refresh_previews();
    }

    pub fn previous_cell(&mut self) {
        self.selected_cell = (self.selected_cell + CELL_COUNT - 1) % CELL_COUNT;
        self.refresh_previews();
    }

    /// Screenshot with every region drawn on it.
    pub fn render_overlay(&self) -> RgbaImage {
        render_overlay(&self.image, &self.cells, &self.settings, Some(self.selected_cell))
    }

    /// Zoomed ink map of the selected cell's quantity strip.
    pub fn render_quantity_debug(&self, zoom: u32) -> RgbaImage {
        render_quantity_debug(
            &self.image,
            &self.quantity_preview,
            &self.settings.quantity_region.thresholds,
            zoom,
        )
    }

    fn recompute(&mut self) {
        self.cells = compute_grid_cells(self.image.width(), self.image.height(), &self.settings.layout);
        self.refresh_previews();
        self.emit_if_changed();
    }

    fn refresh_previews(&mut self) {
        let (occupancy, quantity, notes) =
            classify_cell(&self.image, &self.cells[self.selected_cell], &self.settings);
        self.occupancy_preview = occupancy;
        self.quantity_preview = quantity;
        self.preview_notes = notes;
    }

    fn emit_if_changed(&mut self) {
        let snapshot = match serde_json::to_value(self.settings) {
            Ok(value) => value,
            Err(e) => {
                crate::log(&format!("Calibration: failed to serialize settings: {}", e));
                return;
            }
        };
        if self.last_emitted.as_ref() == Some(&snapshot) {
            return;
        }
        self.listener.parameters_changed(&self.settings);
        self.last_emitted = Some(snapshot);
    }
}

fn classify_cell(
    image: &RgbaImage,
    cell: &GridCell,
    settings: &CalibrationSettings,
) -> (OccupancyAnalysis, QuantityAnalysis, Vec<String>) {
    let sink = CollectingDiagnostics::new();
    let occupancy = analyze_occupancy(image, &cell.bounds, &settings.occupancy, Some(&sink));
    let quantity = analyze_quantity(image, &cell.bounds, &settings.quantity_region, Some(&sink));
    (occupancy, quantity, sink.lines())
}

/// Moves the grid, keeping it inside the image.
fn translated(start: &LayoutParameters, dx: f64, dy: f64) -> LayoutParameters {
    LayoutParameters {
        start_x: (start.start_x + dx).clamp(0.0, (1.0 - start.grid_width).max(0.0)),
        start_y: (start.start_y + dy).clamp(0.0, (1.0 - start.grid_height).max(0.0)),
        ..*start
    }
}

/// Moves one corner. The opposite edges stay put and neither extent drops
/// below [`MIN_GRID_FRACTION`].
fn resized(start: &LayoutParameters, handle: Handle, dx: f64, dy: f64) -> LayoutParameters {
    let mut layout = *start;

    if handle.moves_left_edge() {
        let right = start.start_x + start.grid_width;
        let left = (start.start_x + dx).clamp(0.0, (right - MIN_GRID_FRACTION).max(0.0));
        layout.start_x = left;
        layout.grid_width = right - left;
    } else {
        layout.grid_width = (start.grid_width + dx)
            .clamp(MIN_GRID_FRACTION, (1.0 - start.start_x).max(MIN_GRID_FRACTION));
    }

    if handle.moves_top_edge() {
        let bottom = start.start_y + start.grid_height;
        let top = (start.start_y + dy).clamp(0.0, (bottom - MIN_GRID_FRACTION).max(0.0));
        layout.start_y = top;
        layout.grid_height = bottom - top;
    } else {
        layout.grid_height = (start.grid_height + dy)
            .clamp(MIN_GRID_FRACTION, (1.0 - start.start_y).max(MIN_GRID_FRACTION));
    }

    layout
}
