//! Calibration parameter types.
//!
//! All geometry is stored as fractions so one calibration works at any
//! screenshot resolution. Each concern gets its own typed struct.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Minimum grid extent on either axis while resizing.
pub const MIN_GRID_FRACTION: f64 = 0.1;

/// Grid placement as fractions of the image width/height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutParameters {
    pub start_x: f64,
    pub start_y: f64,
    pub grid_width: f64,
    pub grid_height: f64,
    /// Horizontal gap between cells, as a fraction of image width
    pub card_gap_x: f64,
    /// Vertical gap between rows, as a fraction of image height
    pub card_gap_y: f64,
}

impl Default for LayoutParameters {
    fn default() -> Self {
        Self {
            start_x: 0.027,
            start_y: 0.193,
            grid_width: 0.945,
            grid_height: 0.788,
            card_gap_x: 0.008,
            card_gap_y: 0.036,
        }
    }
}

impl LayoutParameters {
    /// Rejects non-finite values, negative fractions, grids leaving the image,
    /// and gaps that leave no room for cells.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("startX", self.start_x),
            ("startY", self.start_y),
            ("gridWidth", self.grid_width),
            ("gridHeight", self.grid_height),
            ("cardGapX", self.card_gap_x),
            ("cardGapY", self.card_gap_y),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                bail!("{} is not a finite number", name);
            }
            if !(0.0..1.0).contains(&value) && !(name.starts_with("grid") && value == 1.0) {
                bail!("{} = {} is outside [0, 1)", name, value);
            }
        }
        if self.grid_width <= 0.0 || self.grid_height <= 0.0 {
            bail!("grid extent must be positive");
        }
        if self.start_x + self.grid_width > 1.0 + f64::EPSILON {
            bail!(
                "startX + gridWidth = {:.4} exceeds the image width",
                self.start_x + self.grid_width
            );
        }
        if self.start_y + self.grid_height > 1.0 + f64::EPSILON {
            bail!(
                "startY + gridHeight = {:.4} exceeds the image height",
                self.start_y + self.grid_height
            );
        }
        let columns = crate::grid::COLUMNS as f64;
        let rows = crate::grid::ROWS as f64;
        if (columns - 1.0) * self.card_gap_x >= self.grid_width {
            bail!("cardGapX leaves no room for cells");
        }
        if (rows - 1.0) * self.card_gap_y >= self.grid_height {
            bail!("cardGapY leaves no room for cells");
        }
        Ok(())
    }
}

/// Name label position inside a cell, as fractions of the cell box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRegionParameters {
    pub offset_x: f64,
    /// Downward offset from the cell's top edge
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for TextRegionParameters {
    fn default() -> Self {
        Self {
            offset_x: 0.05,
            offset_y: 0.80,
            width: 0.90,
            height: 0.16,
        }
    }
}

impl TextRegionParameters {
    pub fn validate(&self) -> Result<()> {
        validate_region("text region", self.offset_x, self.offset_y, self.width, self.height)
    }
}

/// Pixel classification thresholds for the quantity strip.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityThresholds {
    /// Ink pixels have mean channel value below this
    pub brightness_threshold: f64,
    /// Ink pixels have channel spread below this
    pub saturation_threshold: f64,
    /// A zone is filled when its ink ratio exceeds this
    pub fill_ratio_threshold: f64,
    /// Brightness cut for the whole-strip infinity test
    #[serde(default = "default_unlimited_brightness")]
    pub unlimited_brightness_threshold: f64,
    /// Dark coverage above which an unfilled strip reads as unlimited
    #[serde(default = "default_unlimited_coverage")]
    pub unlimited_coverage_threshold: f64,
}

fn default_unlimited_brightness() -> f64 {
    80.0
}

fn default_unlimited_coverage() -> f64 {
    0.12
}

impl Default for QuantityThresholds {
    fn default() -> Self {
        Self {
            brightness_threshold: 50.0,
            saturation_threshold: 10.0,
            fill_ratio_threshold: 0.05,
            unlimited_brightness_threshold: default_unlimited_brightness(),
            unlimited_coverage_threshold: default_unlimited_coverage(),
        }
    }
}

/// Indicator strip position relative to a cell. The strip sits above the cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityRegionParameters {
    pub offset_x: f64,
    /// Upward offset from the cell's top edge
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub thresholds: QuantityThresholds,
}

impl Default for QuantityRegionParameters {
    fn default() -> Self {
        Self {
            offset_x: 0.28,
            offset_y: 0.08,
            width: 0.44,
            height: 0.07,
            thresholds: QuantityThresholds::default(),
        }
    }
}

impl QuantityRegionParameters {
    pub fn validate(&self) -> Result<()> {
        validate_region("quantity region", self.offset_x, self.offset_y, self.width, self.height)?;
        let t = &self.thresholds;
        for (name, value) in [
            ("brightnessThreshold", t.brightness_threshold),
            ("saturationThreshold", t.saturation_threshold),
            ("unlimitedBrightnessThreshold", t.unlimited_brightness_threshold),
        ] {
            if !value.is_finite() || !(0.0..=255.0).contains(&value) {
                bail!("{} = {} is outside [0, 255]", name, value);
            }
        }
        for (name, value) in [
            ("fillRatioThreshold", t.fill_ratio_threshold),
            ("unlimitedCoverageThreshold", t.unlimited_coverage_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                bail!("{} = {} is outside [0, 1]", name, value);
            }
        }
        Ok(())
    }
}

/// Occupancy classifier thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyThresholds {
    /// A cell is empty when its edge density is below this
    pub edge_threshold: f64,
    /// Reported alongside the measured variance; does not affect the decision
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f64,
    /// Gradient magnitude that counts as an edge
    #[serde(default = "default_gradient_threshold")]
    pub gradient_threshold: f64,
}

fn default_variance_threshold() -> f64 {
    100.0
}

fn default_gradient_threshold() -> f64 {
    30.0
}

impl Default for OccupancyThresholds {
    fn default() -> Self {
        Self {
            edge_threshold: 0.02,
            variance_threshold: default_variance_threshold(),
            gradient_threshold: default_gradient_threshold(),
        }
    }
}

impl OccupancyThresholds {
    pub fn validate(&self) -> Result<()> {
        if !self.edge_threshold.is_finite() || !(0.0..=1.0).contains(&self.edge_threshold) {
            bail!("edgeThreshold = {} is outside [0, 1]", self.edge_threshold);
        }
        if !self.gradient_threshold.is_finite() || self.gradient_threshold < 0.0 {
            bail!("gradientThreshold must be a non-negative number");
        }
        if !self.variance_threshold.is_finite() {
            bail!("varianceThreshold is not a finite number");
        }
        Ok(())
    }
}

/// Everything one user calibrates, persisted as a single record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationSettings {
    #[serde(default)]
    pub layout: LayoutParameters,
    #[serde(default)]
    pub text_region: TextRegionParameters,
    #[serde(default)]
    pub quantity_region: QuantityRegionParameters,
    #[serde(default)]
    pub occupancy: OccupancyThresholds,
}

impl CalibrationSettings {
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        self.text_region.validate()?;
        self.quantity_region.validate()?;
        self.occupancy.validate()?;
        Ok(())
    }
}

fn validate_region(label: &str, offset_x: f64, offset_y: f64, width: f64, height: f64) -> Result<()> {
    for (name, value) in [
        ("offsetX", offset_x),
        ("offsetY", offset_y),
        ("width", width),
        ("height", height),
    ] {
        if !value.is_finite() {
            bail!("{} {} is not a finite number", label, name);
        }
        if !(0.0..=1.0).contains(&value) {
            bail!("{} {} = {} is outside [0, 1]", label, name, value);
        }
    }
    if width <= 0.0 || height <= 0.0 {
        bail!("{} must have a positive size", label);
    }
    Ok(())
}
