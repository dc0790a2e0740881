//! Screenshot analysis core.
//!
//! Pure functions over an in-memory RGBA buffer:
//! - Cell geometry from normalized layout parameters
//! - Empty/filled classification per cell
//! - Quantity indicator reading per cell

pub mod diagnostics;
pub mod geometry;
pub mod occupancy;
pub mod quantity;

pub use diagnostics::{CollectingDiagnostics, Diagnostics, LogDiagnostics};
pub use geometry::{compute_grid_cells, BoundingBox, GridCell, CELL_COUNT, COLUMNS, ROWS};
pub use occupancy::{analyze_occupancy, OccupancyAnalysis};
pub use quantity::{analyze_quantity, Quantity, QuantityAnalysis};
