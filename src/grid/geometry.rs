//! Grid geometry calculation.
//!
//! Converts normalized layout parameters into pixel bounding boxes for the
//! fixed 12x3 cell grid.

use serde::{Deserialize, Serialize};

use crate::calibration::settings::LayoutParameters;

/// Number of cell columns in the collection grid.
pub const COLUMNS: u32 = 12;
/// Number of cell rows in the collection grid.
pub const ROWS: u32 = 3;
/// Total number of cells.
pub const CELL_COUNT: usize = (COLUMNS * ROWS) as usize;

/// A rectangle in integer pixel coordinates.
///
/// Signed so that malformed layouts yield degenerate boxes instead of wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// True if the box has no drawable area.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// True if the whole box lies inside an image of the given size.
    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && !self.is_degenerate()
            && self.right() as i64 <= image_width as i64
            && self.bottom() as i64 <= image_height as i64
    }

    /// Returns the part of the box that overlaps the image, if any.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Option<BoundingBox> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.right() as i64).min(image_width as i64) as i32;
        let y1 = (self.bottom() as i64).min(image_height as i64) as i32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Returns true if the point lies inside the box expanded by `tolerance` on every side.
    pub fn contains_with_tolerance(&self, px: f64, py: f64, tolerance: f64) -> bool {
        px >= self.x as f64 - tolerance
            && px <= self.right() as f64 + tolerance
            && py >= self.y as f64 - tolerance
            && py <= self.bottom() as f64 + tolerance
    }
}

/// One grid position with its pixel box. Column and row are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub column: u32,
    pub row: u32,
    pub bounds: BoundingBox,
}

impl GridCell {
    /// Zero-based index in row-major order.
    pub fn index(&self) -> usize {
        ((self.row - 1) * COLUMNS + (self.column - 1)) as usize
    }

    /// Short label such as "R2C7" for logs and overlays.
    pub fn label(&self) -> String {
        format!("R{}C{}", self.row, self.column)
    }
}

/// Computes the cell boxes for an image of `image_width` x `image_height` pixels.
///
/// Always returns exactly [`CELL_COUNT`] cells in row-major order. Parameters are
/// not validated here; out-of-range values produce degenerate boxes.
pub fn compute_grid_cells(
    image_width: u32,
    image_height: u32,
    layout: &LayoutParameters,
) -> Vec<GridCell> {
    let w = image_width as f64;
    let h = image_height as f64;

    let origin_x = w * layout.start_x;
    let origin_y = h * layout.start_y;
    let grid_w = w * layout.grid_width;
    let grid_h = h * layout.grid_height;

    let gap_x = layout.card_gap_x * w;
    let gap_y = layout.card_gap_y * h;

    let cell_w = (grid_w - (COLUMNS - 1) as f64 * gap_x) / COLUMNS as f64;
    let cell_h = (grid_h - (ROWS - 1) as f64 * gap_y) / ROWS as f64;

    let mut cells = Vec::with_capacity(CELL_COUNT);
    for row in 0..ROWS {
        for col in 0..COLUMNS {
            let x = origin_x + col as f64 * (cell_w + gap_x);
            let y = origin_y + row as f64 * (cell_h + gap_y);
            cells.push(GridCell {
                column: col + 1,
                row: row + 1,
                bounds: BoundingBox::new(
                    round_px(x),
                    round_px(y),
                    round_px(cell_w),
                    round_px(cell_h),
                ),
            });
        }
    }

    cells
}

/// Pixel extent of the whole grid (origin and size), used for hit testing.
pub fn grid_bounds(image_width: u32, image_height: u32, layout: &LayoutParameters) -> BoundingBox {
    let w = image_width as f64;
    let h = image_height as f64;
    BoundingBox::new(
        round_px(w * layout.start_x),
        round_px(h * layout.start_y),
        round_px(w * layout.grid_width),
        round_px(h * layout.grid_height),
    )
}

/// Rounds to the nearest pixel. Non-finite values collapse to 0.
pub(crate) fn round_px(value: f64) -> i32 {
    if value.is_finite() {
        value.round() as i32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_produces_36_cells() {
        let cells = compute_grid_cells(1920, 1080, &LayoutParameters::default());
        assert_eq!(cells.len(), CELL_COUNT);
        assert!(cells.iter().all(|c| c.bounds.width > 0 && c.bounds.height > 0));
    }

    #[test]
    fn test_first_cell_at_1080p() {
        let cells = compute_grid_cells(1920, 1080, &LayoutParameters::default());
        let first = cells[0].bounds;
        // origin 51.84 / 208.44, cell 137.12 x 257.76
        assert_eq!((first.x, first.y), (52, 208));
        assert_eq!(first.width, 137);
        assert_eq!(first.height, 258);
    }

    #[test]
    fn test_row_major_order_and_indices() {
        let cells = compute_grid_cells(1920, 1080, &LayoutParameters::default());
        for (i, cell) in cells.iter().enumerate() {
            assert_eq!(cell.index(), i);
        }
        assert_eq!((cells[0].column, cells[0].row), (1, 1));
        assert_eq!((cells[11].column, cells[11].row), (12, 1));
        assert_eq!((cells[12].column, cells[12].row), (1, 2));
        assert_eq!((cells[35].column, cells[35].row), (12, 3));
        assert_eq!(cells[35].label(), "R3C12");
    }

    #[test]
    fn test_positions_increase_monotonically() {
        let cells = compute_grid_cells(2560, 1440, &LayoutParameters::default());
        for row in cells.chunks(COLUMNS as usize) {
            for pair in row.windows(2) {
                assert!(pair[1].bounds.x > pair[0].bounds.x);
                assert_eq!(pair[1].bounds.y, pair[0].bounds.y);
            }
        }
        for col in 0..COLUMNS as usize {
            assert!(cells[col + 12].bounds.y > cells[col].bounds.y);
            assert!(cells[col + 24].bounds.y > cells[col + 12].bounds.y);
        }
    }

    #[test]
    fn test_idempotent() {
        let layout = LayoutParameters::default();
        let a = compute_grid_cells(1366, 768, &layout);
        let b = compute_grid_cells(1366, 768, &layout);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cells_stay_within_grid() {
        let layout = LayoutParameters::default();
        let bounds = grid_bounds(1920, 1080, &layout);
        let cells = compute_grid_cells(1920, 1080, &layout);
        let last = cells[CELL_COUNT - 1].bounds;
        // Local rounding may drift by a pixel
        assert!((last.right() - bounds.right()).abs() <= 1);
        assert!((last.bottom() - bounds.bottom()).abs() <= 1);
    }

    #[test]
    fn test_malformed_layout_yields_degenerate_boxes() {
        let layout = LayoutParameters {
            grid_width: 0.01,
            card_gap_x: 0.05,
            ..LayoutParameters::default()
        };
        let cells = compute_grid_cells(1000, 1000, &layout);
        assert_eq!(cells.len(), CELL_COUNT);
        assert!(cells[0].bounds.width < 0);
        assert!(cells[0].bounds.is_degenerate());
    }

    #[test]
    fn test_clamp_to_image() {
        let b = BoundingBox::new(-5, 90, 20, 20);
        assert_eq!(b.clamp_to(100, 100), Some(BoundingBox::new(0, 90, 15, 10)));
        assert_eq!(BoundingBox::new(120, 0, 10, 10).clamp_to(100, 100), None);
        assert!(!b.fits_within(100, 100));
        assert!(BoundingBox::new(0, 0, 100, 100).fits_within(100, 100));
    }
}
