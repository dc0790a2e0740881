//! Empty/filled detection for a single grid cell.
//!
//! Empty slots render as a flat background texture while filled slots carry
//! borders, text and artwork. The decision uses edge density only; colour
//! variance is reported for diagnostics.

use image::RgbaImage;
use serde::Serialize;

use super::diagnostics::{emit, Diagnostics};
use super::geometry::{round_px, BoundingBox};
use crate::calibration::settings::OccupancyThresholds;

/// Fraction stripped from each side of the cell before sampling.
pub const SAMPLE_MARGIN: f64 = 0.15;

/// Result of analysing one cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OccupancyAnalysis {
    /// Sampled region in image pixels, `None` if it could not be read.
    pub sample: Option<BoundingBox>,
    /// Number of pixels that had both a right and a lower neighbour.
    pub sampled_pixels: u32,
    /// Pixels whose gradient magnitude exceeded the threshold.
    pub edge_pixels: u32,
    pub edge_density: f64,
    /// Mean per-channel RGB variance over the sample. Diagnostic only.
    pub color_variance: f64,
    pub is_empty: bool,
}

impl OccupancyAnalysis {
    fn unreadable() -> Self {
        Self {
            sample: None,
            sampled_pixels: 0,
            edge_pixels: 0,
            edge_density: 0.0,
            color_variance: 0.0,
            is_empty: false,
        }
    }
}

/// Returns the centred sub-region that is sampled for a cell.
pub fn sample_region(cell: &BoundingBox) -> BoundingBox {
    let w = cell.width as f64;
    let h = cell.height as f64;
    BoundingBox::new(
        cell.x + round_px(w * SAMPLE_MARGIN),
        cell.y + round_px(h * SAMPLE_MARGIN),
        round_px(w * (1.0 - 2.0 * SAMPLE_MARGIN)),
        round_px(h * (1.0 - 2.0 * SAMPLE_MARGIN)),
    )
}

/// Classifies a cell as empty or filled.
///
/// Never fails. An empty image or a sample region outside the buffer yields
/// "not empty" so that real items are never dropped.
pub fn analyze_occupancy(
    img: &RgbaImage,
    cell: &BoundingBox,
    thresholds: &OccupancyThresholds,
    diagnostics: Option<&dyn Diagnostics>,
) -> OccupancyAnalysis {
    let (img_w, img_h) = img.dimensions();
    if img_w == 0 || img_h == 0 {
        emit(diagnostics, || "no pixel data, assuming filled".to_string());
        return OccupancyAnalysis::unreadable();
    }

    let region = sample_region(cell);
    // Need at least a 2x2 block to take one gradient
    if !region.fits_within(img_w, img_h) || region.width < 2 || region.height < 2 {
        emit(diagnostics, || {
            format!(
                "sample region {:?} outside {}x{} image, assuming filled",
                region, img_w, img_h
            )
        });
        return OccupancyAnalysis::unreadable();
    }

    let x0 = region.x as u32;
    let y0 = region.y as u32;
    let x1 = region.right() as u32;
    let y1 = region.bottom() as u32;

    let mut edge_pixels = 0u32;
    let mut sampled_pixels = 0u32;
    let threshold_sq = thresholds.gradient_threshold * thresholds.gradient_threshold;

    for y in y0..y1 - 1 {
        for x in x0..x1 - 1 {
            let here = intensity(img, x, y);
            let gx = intensity(img, x + 1, y) - here;
            let gy = intensity(img, x, y + 1) - here;
            if gx * gx + gy * gy > threshold_sq {
                edge_pixels += 1;
            }
            sampled_pixels += 1;
        }
    }

    let edge_density = edge_pixels as f64 / sampled_pixels as f64;
    let color_variance = color_variance(img, x0, y0, x1, y1);
    let is_empty = edge_density < thresholds.edge_threshold;

    emit(diagnostics, || {
        format!(
            "edges {}/{} density={:.4} variance={:.1} (advisory {:.1}) -> {}",
            edge_pixels,
            sampled_pixels,
            edge_density,
            color_variance,
            thresholds.variance_threshold,
            if is_empty { "empty" } else { "filled" }
        )
    });

    OccupancyAnalysis {
        sample: Some(region),
        sampled_pixels,
        edge_pixels,
        edge_density,
        color_variance,
        is_empty,
    }
}

fn intensity(img: &RgbaImage, x: u32, y: u32) -> f64 {
    let p = img.get_pixel(x, y);
    (p[0] as f64 + p[1] as f64 + p[2] as f64) / 3.0
}

/// Mean of the R, G and B variances over the half-open rectangle.
fn color_variance(img: &RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32) -> f64 {
    let mut sum = [0.0f64; 3];
    let mut sum_sq = [0.0f64; 3];
    let mut n = 0.0f64;

    for y in y0..y1 {
        for x in x0..x1 {
            let p = img.get_pixel(x, y);
            for c in 0..3 {
                let v = p[c] as f64;
                sum[c] += v;
                sum_sq[c] += v * v;
            }
            n += 1.0;
        }
    }

    if n == 0.0 {
        return 0.0;
    }

    (0..3)
        .map(|c| {
            let mean = sum[c] / n;
            (sum_sq[c] / n - mean * mean).max(0.0)
        })
        .sum::<f64>()
        / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn checkerboard(w: u32, h: u32) -> RgbaImage {
        ImageBuffer::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn test_sample_region_strips_margins() {
        let region = sample_region(&BoundingBox::new(100, 200, 100, 200));
        assert_eq!(region, BoundingBox::new(115, 230, 70, 140));
    }

    #[test]
    fn test_flat_region_is_empty() {
        let img = ImageBuffer::from_pixel(200, 200, Rgba([40, 60, 90, 255]));
        let cell = BoundingBox::new(20, 20, 100, 120);
        let analysis = analyze_occupancy(&img, &cell, &OccupancyThresholds::default(), None);
        assert!(analysis.is_empty);
        assert_eq!(analysis.edge_pixels, 0);
        assert_eq!(analysis.color_variance, 0.0);
    }

    #[test]
    fn test_checkerboard_is_filled() {
        let img = checkerboard(200, 200);
        let cell = BoundingBox::new(20, 20, 100, 120);
        assert!(!analyze_occupancy(&img, &cell, &OccupancyThresholds::default(), None).is_empty);
    }

    #[test]
    fn test_high_variance_without_edges_stays_empty() {
        // Left half dark, right half bright: one seam only, so density stays tiny
        let img = ImageBuffer::from_fn(400, 400, |x, _| {
            if x < 200 {
                Rgba([10, 10, 10, 255])
            } else {
                Rgba([240, 240, 240, 255])
            }
        });
        let cell = BoundingBox::new(0, 0, 400, 400);
        let analysis = analyze_occupancy(&img, &cell, &OccupancyThresholds::default(), None);
        assert!(analysis.color_variance > 1000.0);
        assert!(analysis.edge_density < 0.02);
        assert!(analysis.is_empty);
    }

    #[test]
    fn test_out_of_bounds_defaults_to_filled() {
        let img = ImageBuffer::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let cell = BoundingBox::new(80, 80, 100, 100);
        let analysis = analyze_occupancy(&img, &cell, &OccupancyThresholds::default(), None);
        assert!(!analysis.is_empty);
        assert!(analysis.sample.is_none());
    }

    #[test]
    fn test_empty_buffer_defaults_to_filled() {
        let img = RgbaImage::new(0, 0);
        let cell = BoundingBox::new(0, 0, 10, 10);
        assert!(!analyze_occupancy(&img, &cell, &OccupancyThresholds::default(), None).is_empty);
    }

    #[test]
    fn test_diagnostics_receive_summary() {
        let img = ImageBuffer::from_pixel(50, 50, Rgba([128, 128, 128, 255]));
        let sink = crate::grid::diagnostics::CollectingDiagnostics::new();
        analyze_occupancy(
            &img,
            &BoundingBox::new(0, 0, 50, 50),
            &OccupancyThresholds::default(),
            Some(&sink),
        );
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("-> empty"));
    }
}
