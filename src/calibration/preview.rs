//! Preview rendering for calibration visualization.
//!
//! Draws the cell grid, name label and quantity strip regions onto a copy of
//! the screenshot, and renders a zoomed, colour-coded view of which pixels the
//! quantity classifier counted as ink.

use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use std::path::Path;

use crate::calibration::settings::{CalibrationSettings, QuantityThresholds, TextRegionParameters};
use crate::grid::geometry::{grid_bounds, round_px};
use crate::grid::quantity::{indicator_region, is_ink, QuantityAnalysis, ZONE_COUNT};
use crate::grid::{BoundingBox, GridCell};

/// Color constants for preview rendering.
pub const COLOR_CELL: Rgba<u8> = Rgba([0, 255, 0, 255]); // Green
pub const COLOR_TEXT_REGION: Rgba<u8> = Rgba([0, 128, 255, 255]); // Blue
pub const COLOR_QUANTITY_REGION: Rgba<u8> = Rgba([255, 255, 0, 255]); // Yellow
pub const COLOR_HANDLE: Rgba<u8> = Rgba([255, 0, 0, 255]); // Red
pub const COLOR_HIGHLIGHT: Rgba<u8> = Rgba([255, 128, 0, 255]); // Orange

/// Ink tint per pip zone in the debug rendering.
pub const ZONE_COLORS: [Rgba<u8>; ZONE_COUNT] = [
    Rgba([255, 64, 64, 255]),
    Rgba([64, 220, 64, 255]),
    Rgba([64, 128, 255, 255]),
    Rgba([255, 0, 255, 255]),
];

const COLOR_ZONE_DIVIDER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Places the name label inside a cell.
pub fn text_region(cell: &BoundingBox, params: &TextRegionParameters) -> BoundingBox {
    let w = cell.width as f64;
    let h = cell.height as f64;
    BoundingBox::new(
        cell.x + round_px(params.offset_x * w),
        cell.y + round_px(params.offset_y * h),
        round_px(params.width * w),
        round_px(params.height * h),
    )
}

/// Renders every calibrated region onto a copy of the screenshot.
pub fn render_overlay(
    screenshot: &RgbaImage,
    cells: &[GridCell],
    settings: &CalibrationSettings,
    selected: Option<usize>,
) -> RgbaImage {
    let mut img = screenshot.clone();
    let (width, height) = img.dimensions();

    for cell in cells {
        draw_rect(&mut img, &cell.bounds, COLOR_CELL, 2);
        draw_rect(&mut img, &text_region(&cell.bounds, &settings.text_region), COLOR_TEXT_REGION, 1);
        draw_rect(
            &mut img,
            &indicator_region(&cell.bounds, &settings.quantity_region),
            COLOR_QUANTITY_REGION,
            1,
        );
    }

    if let Some(cell) = selected.and_then(|i| cells.get(i)) {
        draw_rect(&mut img, &cell.bounds, COLOR_HIGHLIGHT, 4);
    }

    // Resize handles at the grid corners
    let grid = grid_bounds(width, height, &settings.layout);
    for handle in crate::calibration::coords::Handle::ALL {
        let (x, y) = handle.point_on(&grid);
        draw_crosshair(&mut img, x as i32, y as i32, COLOR_HANDLE, 12);
    }

    img
}

/// Renders the quantity strip zoomed by `zoom`, tinting ink pixels by zone and
/// dimming everything else. Filled zones get a frame in their colour.
pub fn render_quantity_debug(
    screenshot: &RgbaImage,
    analysis: &QuantityAnalysis,
    thresholds: &QuantityThresholds,
    zoom: u32,
) -> RgbaImage {
    let zoom = zoom.max(1);
    let region = match analysis.region {
        Some(r) if !r.is_degenerate() => r,
        _ => return ImageBuffer::from_pixel(4 * zoom, zoom, Rgba([64, 64, 64, 255])),
    };

    let out_w = region.width as u32 * zoom;
    let out_h = region.height as u32 * zoom;
    let mut out = ImageBuffer::new(out_w, out_h);

    for (zone_idx, zone) in analysis.zones.iter().enumerate() {
        let zb = zone.bounds;
        for y in zb.y..zb.bottom() {
            for x in zb.x..zb.right() {
                let p = screenshot.get_pixel(x as u32, y as u32);
                let color = if is_ink(p[0], p[1], p[2], thresholds) {
                    ZONE_COLORS[zone_idx]
                } else {
                    let grey = ((p[0] as u32 + p[1] as u32 + p[2] as u32) / 6) as u8;
                    Rgba([grey, grey, grey, 255])
                };
                let ox = (x - region.x) as u32 * zoom;
                let oy = (y - region.y) as u32 * zoom;
                for dy in 0..zoom {
                    for dx in 0..zoom {
                        out.put_pixel(ox + dx, oy + dy, color);
                    }
                }
            }
        }

        let local = BoundingBox::new(
            (zb.x - region.x) * zoom as i32,
            0,
            zb.width * zoom as i32,
            out_h as i32,
        );
        if zone.filled {
            draw_rect(&mut out, &local, ZONE_COLORS[zone_idx], 2);
        }
        if zone_idx > 0 {
            for y in 0..out_h {
                put_clipped(&mut out, local.x, y as i32, COLOR_ZONE_DIVIDER);
            }
        }
    }

    out
}

/// Saves a preview image as PNG.
pub fn save_preview(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    img.save(path)
        .with_context(|| format!("Failed to save preview to {}", path.display()))
}

/// Draws a rectangle border on an image, clipping at the image edges.
pub fn draw_rect(img: &mut RgbaImage, bounds: &BoundingBox, color: Rgba<u8>, thickness: u32) {
    if bounds.is_degenerate() {
        return;
    }
    let t = (thickness as i32).min(bounds.width).min(bounds.height);

    for d in 0..t {
        for x in bounds.x..bounds.right() {
            put_clipped(img, x, bounds.y + d, color);
            put_clipped(img, x, bounds.bottom() - 1 - d, color);
        }
        for y in bounds.y..bounds.bottom() {
            put_clipped(img, bounds.x + d, y, color);
            put_clipped(img, bounds.right() - 1 - d, y, color);
        }
    }
}

/// Draws a three-pixel-thick crosshair centred at a point.
pub fn draw_crosshair(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>, arm_length: u32) {
    let arm = arm_length as i32;
    for d in -arm..=arm {
        for w in -1..=1 {
            put_clipped(img, x + d, y + w, color);
            put_clipped(img, x + w, y + d, color);
        }
    }
}

fn put_clipped(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}
