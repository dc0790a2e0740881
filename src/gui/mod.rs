//! Calibration window.
//!
//! Shows the screenshot with the live overlay, forwards pointer gestures to the
//! calibration session and exposes the remaining parameters as sliders.

pub mod render;
pub mod state;

use anyhow::{anyhow, Result};
use eframe::egui::{self, Pos2, Rect, Sense, TextureHandle, Vec2};
use image::RgbaImage;

use crate::calibration::preview::save_preview;
use crate::calibration::{
    load_or_default, CalibrationSession, CalibrationSettings, JsonFileStore, PersistingListener,
};
use render::CellNav;
use state::{GuiState, PersistedSession, StatusMessage};

/// Main GUI application struct.
pub struct GuiApp {
    session: PersistedSession,
    state: GuiState,
    overlay_texture: Option<TextureHandle>,
    debug_texture: Option<TextureHandle>,
}

fn to_texture(ctx: &egui::Context, name: &str, img: &RgbaImage) -> TextureHandle {
    let size = [img.width() as usize, img.height() as usize];
    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, img.as_raw());
    ctx.load_texture(name, color_image, egui::TextureOptions::LINEAR)
}

impl GuiApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, session: PersistedSession) -> Self {
        Self {
            session,
            state: GuiState::default(),
            overlay_texture: None,
            debug_texture: None,
        }
    }

    /// Re-uploads the overlay and strip view after any change.
    fn refresh_textures(&mut self, ctx: &egui::Context) {
        if !self.state.textures_dirty && self.overlay_texture.is_some() {
            return;
        }
        let overlay = self.session.render_overlay();
        self.overlay_texture = Some(to_texture(ctx, "calibration_overlay", &overlay));
        let debug = self.session.render_quantity_debug(self.state.debug_zoom);
        self.debug_texture = Some(to_texture(ctx, "quantity_debug", &debug));
        self.state.textures_dirty = false;
    }

    /// Screenshot scaled to fit, with pointer events mapped to the session.
    fn render_canvas(&mut self, ui: &mut egui::Ui) {
        let Some(texture) = &self.overlay_texture else {
            return;
        };
        let image_size = texture.size_vec2();
        let available = ui.available_size();
        let scale = (available.x / image_size.x)
            .min(available.y / image_size.y)
            .clamp(0.05, 1.0);
        let display_size = Vec2::new(image_size.x * scale, image_size.y * scale);

        let (rect, response) = ui.allocate_exact_size(display_size, Sense::click_and_drag());
        ui.painter().image(
            texture.id(),
            rect,
            Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
            egui::Color32::WHITE,
        );

        self.session.set_display_scale(scale as f64);
        let local = response
            .interact_pointer_pos()
            .map(|pos| ((pos.x - rect.min.x) as f64, (pos.y - rect.min.y) as f64));

        if response.drag_started() {
            if let Some((x, y)) = local {
                self.session.pointer_down(x, y);
            }
        } else if response.dragged() {
            if let Some((x, y)) = local {
                self.session.pointer_move(x, y);
                self.state.textures_dirty = true;
            }
        }
        if response.drag_stopped() {
            self.session.pointer_up();
        }
        if response.clicked() {
            if let Some((x, y)) = local {
                if self.session.select_cell_at(x, y) {
                    self.state.textures_dirty = true;
                }
            }
        }
    }

    fn handle_nav(&mut self, nav: CellNav) {
        match nav {
            CellNav::Previous => self.session.previous_cell(),
            CellNav::Next => self.session.next_cell(),
        }
        self.state.textures_dirty = true;
    }

    fn handle_reset(&mut self) {
        let result = self.session.set_settings(CalibrationSettings::default());
        self.state.apply_result(result);
        crate::log("GUI: Calibration reset to defaults");
    }

    fn handle_export(&mut self) {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = crate::paths::get_previews_dir().join(format!("overlay_{}.png", timestamp));
        self.state.status = match save_preview(&self.session.render_overlay(), &path) {
            Ok(()) => {
                crate::log(&format!("GUI: Preview saved to {}", path.display()));
                StatusMessage::Exported(path)
            }
            Err(e) => {
                crate::log(&format!("GUI: Failed to save preview: {:#}", e));
                StatusMessage::Error(e.to_string())
            }
        };
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let (left, right) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::ArrowLeft),
                i.key_pressed(egui::Key::ArrowRight),
            )
        });
        if left {
            self.handle_nav(CellNav::Previous);
        } else if right {
            self.handle_nav(CellNav::Next);
        }

        self.refresh_textures(ctx);

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            render::render_status(ui, &self.session, &self.state);
        });

        egui::SidePanel::right("parameters")
            .default_width(340.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    render::render_target_selector(ui, &mut self.session);
                    render::render_parameters(ui, &mut self.session, &mut self.state);

                    let nav = render::render_cell_inspector(
                        ui,
                        &self.session,
                        self.debug_texture.as_ref(),
                    );
                    if let Some(nav) = nav {
                        self.handle_nav(nav);
                    }

                    ui.add_space(8.0);
                    ui.separator();
                    ui.horizontal(|ui| {
                        ui.label("Strip zoom:");
                        if ui
                            .add(egui::DragValue::new(&mut self.state.debug_zoom).range(1..=16))
                            .changed()
                        {
                            self.state.textures_dirty = true;
                        }
                    });
                    ui.horizontal(|ui| {
                        if ui.button("Reset to defaults").clicked() {
                            self.handle_reset();
                        }
                        if ui.button("Save preview").clicked() {
                            self.handle_export();
                        }
                    });
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_canvas(ui);
        });
    }
}

/// Opens the calibration window for `image` and `user_id`.
/// Blocks until the window is closed.
pub fn run_gui(image: RgbaImage, user_id: &str) -> Result<()> {
    let store = JsonFileStore::new(crate::paths::get_users_dir());
    let settings = load_or_default(&store, user_id);
    let session = CalibrationSession::new(image, settings, PersistingListener::new(store, user_id))?;

    crate::log("GUI: Creating native options...");
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(Vec2::new(1400.0, 820.0))
            .with_min_inner_size(Vec2::new(800.0, 500.0))
            .with_title("Collection Scanner Calibration"),
        ..Default::default()
    };

    eframe::run_native(
        "Collection Scanner Calibration",
        options,
        Box::new(move |cc| {
            crate::log("GUI: Creating GuiApp instance...");
            Ok(Box::new(GuiApp::new(cc, session)))
        }),
    )
    .map_err(|e| anyhow!("GUI error: {}", e))
}
