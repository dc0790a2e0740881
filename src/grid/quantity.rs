//! Quantity indicator reading.
//!
//! Each item shows up to four pips above its cell, or an infinity glyph for
//! unlimited copies. The strip is split into four equal zones; a zone counts
//! when enough of it is dark and desaturated ("ink"). When no zone counts, a
//! coarser whole-strip darkness test detects the infinity glyph, which does not
//! line up with the zone boundaries.

use std::fmt;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::diagnostics::{emit, Diagnostics};
use super::geometry::{round_px, BoundingBox};
use crate::calibration::settings::{QuantityRegionParameters, QuantityThresholds};

/// Number of pip zones in the indicator strip.
pub const ZONE_COUNT: usize = 4;

/// Quantity returned when the strip cannot be read.
pub const FALLBACK_QUANTITY: Quantity = Quantity::Count(1);

/// How many copies of an item are owned.
///
/// Serialised as an integer, with `-1` meaning unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Quantity {
    Count(u8),
    Unlimited,
}

impl Quantity {
    pub fn as_i32(self) -> i32 {
        match self {
            Quantity::Count(n) => n as i32,
            Quantity::Unlimited => -1,
        }
    }
}

impl From<Quantity> for i32 {
    fn from(q: Quantity) -> i32 {
        q.as_i32()
    }
}

impl TryFrom<i32> for Quantity {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Quantity::Unlimited),
            0..=4 => Ok(Quantity::Count(value as u8)),
            other => Err(format!("quantity out of range: {}", other)),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Count(n) => write!(f, "{}", n),
            Quantity::Unlimited => write!(f, "∞"),
        }
    }
}

/// Per-zone ink statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ZoneStats {
    /// Zone rectangle in image pixels.
    pub bounds: BoundingBox,
    pub ink_pixels: u32,
    pub total_pixels: u32,
    pub fill_ratio: f64,
    pub filled: bool,
}

/// Full result of reading one strip.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuantityAnalysis {
    /// The indicator strip in image pixels, `None` when it could not be read.
    pub region: Option<BoundingBox>,
    pub zones: [ZoneStats; ZONE_COUNT],
    /// Share of the whole strip passing the loose darkness test.
    pub dark_coverage: f64,
    pub quantity: Quantity,
}

impl QuantityAnalysis {
    fn fallback(region: Option<BoundingBox>) -> Self {
        Self {
            region,
            zones: [ZoneStats::default(); ZONE_COUNT],
            dark_coverage: 0.0,
            quantity: FALLBACK_QUANTITY,
        }
    }

    pub fn filled_zones(&self) -> usize {
        self.zones.iter().filter(|z| z.filled).count()
    }
}

/// Brightness as the plain channel mean.
pub fn brightness(r: u8, g: u8, b: u8) -> f64 {
    (r as f64 + g as f64 + b as f64) / 3.0
}

/// Saturation as the channel spread.
pub fn saturation(r: u8, g: u8, b: u8) -> f64 {
    (r.max(g).max(b) - r.min(g).min(b)) as f64
}

/// True for dark, desaturated pip pixels.
pub fn is_ink(r: u8, g: u8, b: u8, thresholds: &QuantityThresholds) -> bool {
    brightness(r, g, b) < thresholds.brightness_threshold
        && saturation(r, g, b) < thresholds.saturation_threshold
}

/// True for pixels counted by the whole-strip infinity test.
pub fn is_loose_dark(r: u8, g: u8, b: u8, thresholds: &QuantityThresholds) -> bool {
    brightness(r, g, b) < thresholds.unlimited_brightness_threshold
}

/// Places the indicator strip relative to a cell. The strip sits above the cell,
/// so `offset_y` moves it upward.
pub fn indicator_region(cell: &BoundingBox, params: &QuantityRegionParameters) -> BoundingBox {
    let w = cell.width as f64;
    let h = cell.height as f64;
    BoundingBox::new(
        cell.x + round_px(params.offset_x * w),
        cell.y - round_px(params.offset_y * h),
        round_px(params.width * w),
        round_px(params.height * h),
    )
}

/// Splits a strip into four equal-width zones, left to right.
pub fn zone_bounds(region: &BoundingBox) -> [BoundingBox; ZONE_COUNT] {
    let mut zones = [BoundingBox::default(); ZONE_COUNT];
    for (i, zone) in zones.iter_mut().enumerate() {
        let start = region.width * i as i32 / ZONE_COUNT as i32;
        let end = region.width * (i as i32 + 1) / ZONE_COUNT as i32;
        *zone = BoundingBox::new(region.x + start, region.y, end - start, region.height);
    }
    zones
}

/// Reads the quantity indicator above `cell`.
///
/// Never fails: an unreadable buffer or a strip not lying entirely inside the
/// image yields [`FALLBACK_QUANTITY`].
pub fn analyze_quantity(
    img: &RgbaImage,
    cell: &BoundingBox,
    params: &QuantityRegionParameters,
    diagnostics: Option<&dyn Diagnostics>,
) -> QuantityAnalysis {
    let thresholds = &params.thresholds;
    let (img_w, img_h) = img.dimensions();
    if img_w == 0 || img_h == 0 {
        emit(diagnostics, || "no pixel data, defaulting to 1".to_string());
        return QuantityAnalysis::fallback(None);
    }

    let requested = indicator_region(cell, params);
    if requested.width < ZONE_COUNT as i32 || requested.height <= 0 {
        emit(diagnostics, || {
            format!("strip {:?} has no readable area, defaulting to 1", requested)
        });
        return QuantityAnalysis::fallback(None);
    }
    // Clipping would shift the zone boundaries, so partial strips are not read
    if !requested.fits_within(img_w, img_h) {
        emit(diagnostics, || {
            format!("strip {:?} extends outside the image, defaulting to 1", requested)
        });
        return QuantityAnalysis::fallback(None);
    }
    let region = requested;

    let mut zones = [ZoneStats::default(); ZONE_COUNT];
    let mut dark_pixels = 0u32;
    let mut total_pixels = 0u32;

    for (stats, bounds) in zones.iter_mut().zip(zone_bounds(&region)) {
        stats.bounds = bounds;
        for y in bounds.y..bounds.bottom() {
            for x in bounds.x..bounds.right() {
                let p = img.get_pixel(x as u32, y as u32);
                let (r, g, b) = (p[0], p[1], p[2]);
                if is_ink(r, g, b, thresholds) {
                    stats.ink_pixels += 1;
                }
                if is_loose_dark(r, g, b, thresholds) {
                    dark_pixels += 1;
                }
                stats.total_pixels += 1;
            }
        }
        total_pixels += stats.total_pixels;
        stats.fill_ratio = if stats.total_pixels > 0 {
            stats.ink_pixels as f64 / stats.total_pixels as f64
        } else {
            0.0
        };
        stats.filled = stats.fill_ratio > thresholds.fill_ratio_threshold;
    }

    let dark_coverage = if total_pixels > 0 {
        dark_pixels as f64 / total_pixels as f64
    } else {
        0.0
    };

    let filled = zones.iter().filter(|z| z.filled).count();
    let quantity = if filled == 0 && dark_coverage > thresholds.unlimited_coverage_threshold {
        Quantity::Unlimited
    } else {
        Quantity::Count(filled as u8)
    };

    emit(diagnostics, || {
        let ratios: Vec<String> = zones.iter().map(|z| format!("{:.3}", z.fill_ratio)).collect();
        format!(
            "strip {:?} zones [{}] dark={:.3} -> {}",
            region,
            ratios.join(", "),
            dark_coverage,
            quantity
        )
    });

    QuantityAnalysis {
        region: Some(region),
        zones,
        dark_coverage,
        quantity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CollectingDiagnostics;
    use image::{ImageBuffer, Rgba};

    const BRIGHT: Rgba<u8> = Rgba([200, 200, 200, 255]);
    const INK: Rgba<u8> = Rgba([30, 30, 30, 255]);

    /// Cell well below the top edge so the default strip fits.
    fn cell() -> BoundingBox {
        BoundingBox::new(100, 200, 200, 300)
    }

    fn params() -> QuantityRegionParameters {
        QuantityRegionParameters::default()
    }

    /// Image whose strip pixels are painted by `paint(local_x, local_y, strip_w)`.
    fn image_with_strip(paint: impl Fn(i32, i32, i32) -> Rgba<u8>) -> RgbaImage {
        let region = indicator_region(&cell(), &params());
        ImageBuffer::from_fn(500, 600, |x, y| {
            let (x, y) = (x as i32, y as i32);
            if x >= region.x && x < region.right() && y >= region.y && y < region.bottom() {
                paint(x - region.x, y - region.y, region.width)
            } else {
                BRIGHT
            }
        })
    }

    #[test]
    fn test_indicator_region_sits_above_cell() {
        let region = indicator_region(&cell(), &params());
        // 0.28*200=56, 0.08*300=24, 0.44*200=88, 0.07*300=21
        assert_eq!(region, BoundingBox::new(156, 176, 88, 21));
    }

    #[test]
    fn test_zone_bounds_cover_region() {
        let zones = zone_bounds(&BoundingBox::new(10, 5, 90, 4));
        assert_eq!(zones[0].x, 10);
        assert_eq!(zones[3].right(), 100);
        let total: i32 = zones.iter().map(|z| z.width).sum();
        assert_eq!(total, 90);
    }

    #[test]
    fn test_fully_dark_strip_reads_four() {
        let img = image_with_strip(|_, _, _| INK);
        assert_eq!(analyze_quantity(&img, &cell(), &params(), None).quantity, Quantity::Count(4));
    }

    #[test]
    fn test_bright_strip_reads_zero() {
        let img = ImageBuffer::from_pixel(500, 600, BRIGHT);
        assert_eq!(analyze_quantity(&img, &cell(), &params(), None).quantity, Quantity::Count(0));
    }

    #[test]
    fn test_two_left_pips() {
        let img = image_with_strip(|x, _, w| if x < w / 2 { INK } else { BRIGHT });
        let analysis = analyze_quantity(&img, &cell(), &params(), None);
        assert_eq!(analysis.quantity, Quantity::Count(2));
        assert!(analysis.zones[0].filled && analysis.zones[1].filled);
        assert!(!analysis.zones[2].filled && !analysis.zones[3].filled);
    }

    #[test]
    fn test_saturated_dark_pixels_are_not_ink() {
        // Dark red fails the saturation test
        let img = image_with_strip(|_, _, _| Rgba([60, 10, 10, 255]));
        let analysis = analyze_quantity(&img, &cell(), &params(), None);
        assert_eq!(analysis.filled_zones(), 0);
    }

    #[test]
    fn test_diffuse_dark_coverage_reads_unlimited() {
        // Roughly 15% of pixels dark but coloured: no zone passes the ink test,
        // the loose darkness test does
        let img = image_with_strip(|x, y, _| {
            if (x * 7 + y * 3) % 20 < 3 {
                Rgba([60, 20, 20, 255])
            } else {
                BRIGHT
            }
        });
        let analysis = analyze_quantity(&img, &cell(), &params(), None);
        assert_eq!(analysis.filled_zones(), 0);
        assert!(analysis.dark_coverage > 0.12 && analysis.dark_coverage < 0.2);
        assert_eq!(analysis.quantity, Quantity::Unlimited);
    }

    #[test]
    fn test_negative_origin_defaults_to_one() {
        let img = ImageBuffer::from_pixel(500, 600, INK);
        let near_top = BoundingBox::new(100, 5, 200, 300);
        let analysis = analyze_quantity(&img, &near_top, &params(), None);
        assert_eq!(analysis.quantity, Quantity::Count(1));
        assert!(analysis.region.is_none());
    }

    #[test]
    fn test_left_of_image_defaults_to_one() {
        let img = ImageBuffer::from_pixel(500, 600, INK);
        // Strip starts at x = -80 + 56
        let off_left = BoundingBox::new(-80, 200, 200, 300);
        let analysis = analyze_quantity(&img, &off_left, &params(), None);
        assert_eq!(analysis.quantity, Quantity::Count(1));
        assert!(analysis.region.is_none());
    }

    #[test]
    fn test_right_overhang_defaults_to_one() {
        // Strip x = 400..480 on a 440 px wide image, left half dark
        let cell = BoundingBox::new(400 - 56, 200, 200, 300);
        let region = indicator_region(&cell, &params());
        assert_eq!((region.x, region.width), (400, 88));
        let img = ImageBuffer::from_fn(440, 600, |x, y| {
            let (x, y) = (x as i32, y as i32);
            if x < region.x + region.width / 2 && x >= region.x && y >= region.y && y < region.bottom() {
                INK
            } else {
                BRIGHT
            }
        });

        let notes = CollectingDiagnostics::new();
        let analysis = analyze_quantity(&img, &cell, &params(), Some(&notes));
        assert_eq!(analysis.quantity, Quantity::Count(1));
        assert!(analysis.region.is_none());
        assert!(notes.lines().iter().any(|l| l.contains("outside the image")));
    }

    #[test]
    fn test_bottom_overhang_defaults_to_one() {
        let img = ImageBuffer::from_pixel(500, 190, INK);
        assert_eq!(analyze_quantity(&img, &cell(), &params(), None).quantity, FALLBACK_QUANTITY);
    }

    #[test]
    fn test_empty_buffer_defaults_to_one() {
        let img = RgbaImage::new(0, 0);
        assert_eq!(analyze_quantity(&img, &cell(), &params(), None).quantity, FALLBACK_QUANTITY);
    }

    #[test]
    fn test_quantity_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Quantity::Unlimited).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&Quantity::Count(3)).unwrap(), "3");
        let q: Quantity = serde_json::from_str("-1").unwrap();
        assert_eq!(q, Quantity::Unlimited);
        assert!(serde_json::from_str::<Quantity>("7").is_err());
    }
}
