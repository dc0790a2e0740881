//! GUI rendering functions.
//!
//! Contains the parameter panels, the cell inspector and the status bar.

use std::ops::RangeInclusive;

use eframe::egui::{self, Color32, RichText, TextureHandle, Vec2};

use super::state::{GuiState, PersistedSession};
use crate::calibration::CalibrationTarget;
use crate::grid::{Quantity, CELL_COUNT};

/// Cell navigation requested by the inspector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellNav {
    Previous,
    Next,
}

fn slider(ui: &mut egui::Ui, value: &mut f64, range: RangeInclusive<f64>, label: &str) -> bool {
    ui.add(egui::Slider::new(value, range).text(label)).changed()
}

/// Tabs for choosing which parameter set is edited.
pub fn render_target_selector(ui: &mut egui::Ui, session: &mut PersistedSession) {
    let mut target = session.target();
    ui.horizontal(|ui| {
        for option in [
            CalibrationTarget::Grid,
            CalibrationTarget::TextRegion,
            CalibrationTarget::QuantityRegion,
        ] {
            ui.selectable_value(&mut target, option, option.description());
        }
    });
    if target != session.target() {
        session.set_target(target);
    }
}

/// Sliders for the selected target plus the empty-cell thresholds.
pub fn render_parameters(ui: &mut egui::Ui, session: &mut PersistedSession, state: &mut GuiState) {
    ui.add_space(8.0);

    match session.target() {
        CalibrationTarget::Grid => {
            let mut layout = session.settings().layout;
            let mut changed = false;
            ui.label("Drag the grid to move it, drag a corner to resize. Click a cell to inspect it.");
            changed |= slider(ui, &mut layout.start_x, 0.0..=1.0, "Left");
            changed |= slider(ui, &mut layout.start_y, 0.0..=1.0, "Top");
            changed |= slider(ui, &mut layout.grid_width, 0.1..=1.0, "Width");
            changed |= slider(ui, &mut layout.grid_height, 0.1..=1.0, "Height");
            changed |= slider(ui, &mut layout.card_gap_x, 0.0..=0.05, "Column gap");
            changed |= slider(ui, &mut layout.card_gap_y, 0.0..=0.1, "Row gap");
            if changed {
                state.apply_result(session.set_layout(layout));
            }
        }
        CalibrationTarget::TextRegion => {
            let mut region = session.settings().text_region;
            let mut changed = false;
            ui.label("Name label position, as a fraction of the cell.");
            changed |= slider(ui, &mut region.offset_x, 0.0..=1.0, "Offset X");
            changed |= slider(ui, &mut region.offset_y, 0.0..=1.0, "Offset Y");
            changed |= slider(ui, &mut region.width, 0.01..=1.0, "Width");
            changed |= slider(ui, &mut region.height, 0.01..=1.0, "Height");
            if changed {
                state.apply_result(session.set_text_region(region));
            }
        }
        CalibrationTarget::QuantityRegion => {
            let mut region = session.settings().quantity_region;
            let mut changed = false;
            ui.label("Indicator strip above the cell.");
            changed |= slider(ui, &mut region.offset_x, 0.0..=1.0, "Offset X");
            changed |= slider(ui, &mut region.offset_y, 0.0..=0.5, "Offset above");
            changed |= slider(ui, &mut region.width, 0.01..=1.0, "Width");
            changed |= slider(ui, &mut region.height, 0.01..=0.5, "Height");

            ui.add_space(4.0);
            ui.label(RichText::new("Pip detection").strong());
            let t = &mut region.thresholds;
            changed |= slider(ui, &mut t.brightness_threshold, 0.0..=255.0, "Ink brightness <");
            changed |= slider(ui, &mut t.saturation_threshold, 0.0..=255.0, "Ink saturation <");
            changed |= slider(ui, &mut t.fill_ratio_threshold, 0.0..=1.0, "Zone fill ratio >");
            changed |= slider(ui, &mut t.unlimited_brightness_threshold, 0.0..=255.0, "Unlimited brightness <");
            changed |= slider(ui, &mut t.unlimited_coverage_threshold, 0.0..=1.0, "Unlimited coverage >");
            if changed {
                state.apply_result(session.set_quantity_region(region));
            }
        }
    }

    ui.add_space(8.0);
    ui.separator();
    ui.label(RichText::new("Empty cell detection").strong());

    let mut occupancy = session.settings().occupancy;
    let mut changed = false;
    changed |= slider(ui, &mut occupancy.edge_threshold, 0.0..=0.5, "Edge density >");
    changed |= slider(ui, &mut occupancy.gradient_threshold, 1.0..=255.0, "Gradient >");
    changed |= slider(ui, &mut occupancy.variance_threshold, 0.0..=2000.0, "Variance (info)");
    if changed {
        state.apply_result(session.set_occupancy_thresholds(occupancy));
    }
}

/// Live reading of the selected cell with the zoomed strip.
/// Returns the navigation button pressed, if any.
pub fn render_cell_inspector(
    ui: &mut egui::Ui,
    session: &PersistedSession,
    debug_texture: Option<&TextureHandle>,
) -> Option<CellNav> {
    let mut nav = None;

    ui.add_space(8.0);
    ui.separator();

    ui.horizontal(|ui| {
        if ui.button("◀").clicked() {
            nav = Some(CellNav::Previous);
        }
        ui.label(
            RichText::new(format!(
                "Cell {} ({}/{})",
                session.selected_cell().label(),
                session.selected_index() + 1,
                CELL_COUNT
            ))
            .strong(),
        );
        if ui.button("▶").clicked() {
            nav = Some(CellNav::Next);
        }
    });

    let occupancy = session.occupancy_preview();
    let (occupancy_text, occupancy_color) = if occupancy.is_empty {
        ("empty", Color32::GRAY)
    } else {
        ("filled", Color32::from_rgb(0, 150, 0))
    };
    ui.horizontal(|ui| {
        ui.label("Occupancy:");
        ui.label(RichText::new(occupancy_text).color(occupancy_color));
        ui.label(format!(
            "(edges {:.3}, variance {:.0})",
            occupancy.edge_density, occupancy.color_variance
        ));
    });

    let quantity = session.quantity_preview();
    let quantity_text = match quantity.quantity {
        Quantity::Unlimited => "unlimited".to_string(),
        Quantity::Count(n) => n.to_string(),
    };
    ui.horizontal(|ui| {
        ui.label("Quantity:");
        ui.label(RichText::new(quantity_text).strong());
        ui.label(format!(
            "({} zones filled, dark {:.3})",
            quantity.filled_zones(),
            quantity.dark_coverage
        ));
    });

    if let Some(texture) = debug_texture {
        let size = texture.size_vec2();
        let scale = (ui.available_width() / size.x).min(1.0);
        ui.image((texture.id(), Vec2::new(size.x * scale, size.y * scale)));
    }

    ui.collapsing("Diagnostics", |ui| {
        for note in session.preview_notes() {
            ui.label(RichText::new(note).monospace().small());
        }
    });

    nav
}

/// Status line: last outcome plus persistence state.
pub fn render_status(ui: &mut egui::Ui, session: &PersistedSession, state: &GuiState) {
    ui.horizontal(|ui| {
        let color = if state.status.is_problem() {
            Color32::from_rgb(200, 0, 0)
        } else {
            Color32::GRAY
        };
        ui.label(RichText::new(state.status.status_text()).color(color));

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            let listener = session.listener();
            match listener.last_error() {
                Some(err) => {
                    ui.label(RichText::new(format!("Save failed: {}", err)).color(Color32::from_rgb(200, 0, 0)));
                }
                None => {
                    ui.label(format!("Saved {} times", listener.saves()));
                }
            }
            ui.label(session.state().description());
        });
    });
}
