//! Coordinate conversion and hit testing.
//!
//! The calibration window shows the screenshot scaled to fit; pointer positions
//! arrive in display pixels and are converted to source-image pixels before
//! any hit test.

use crate::grid::BoundingBox;

/// Hit-test tolerance in source-image pixels.
pub const HIT_TOLERANCE_PX: f64 = 12.0;

/// One of the four grid corners that can be dragged to resize.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Handle {
    pub const ALL: [Handle; 4] = [
        Handle::TopLeft,
        Handle::TopRight,
        Handle::BottomLeft,
        Handle::BottomRight,
    ];

    /// Corner position on a box.
    pub fn point_on(&self, bounds: &BoundingBox) -> (f64, f64) {
        let (l, t) = (bounds.x as f64, bounds.y as f64);
        let (r, b) = (bounds.right() as f64, bounds.bottom() as f64);
        match self {
            Handle::TopLeft => (l, t),
            Handle::TopRight => (r, t),
            Handle::BottomLeft => (l, b),
            Handle::BottomRight => (r, b),
        }
    }

    pub fn moves_left_edge(&self) -> bool {
        matches!(self, Handle::TopLeft | Handle::BottomLeft)
    }

    pub fn moves_top_edge(&self) -> bool {
        matches!(self, Handle::TopLeft | Handle::TopRight)
    }
}

/// What a pointer-down landed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitTarget {
    Corner(Handle),
    Interior,
}

/// Converts a display-space position to source-image pixels.
///
/// `display_scale` is display pixels per image pixel; non-positive scales are
/// treated as 1.
pub fn display_to_image(display_x: f64, display_y: f64, display_scale: f64) -> (f64, f64) {
    let scale = if display_scale > 0.0 && display_scale.is_finite() {
        display_scale
    } else {
        1.0
    };
    (display_x / scale, display_y / scale)
}

/// Corners win over the interior so that resizing is possible at the edges.
pub fn hit_test(bounds: &BoundingBox, image_x: f64, image_y: f64) -> Option<HitTarget> {
    let corner = Handle::ALL.into_iter().find(|handle| {
        let (cx, cy) = handle.point_on(bounds);
        (image_x - cx).abs() <= HIT_TOLERANCE_PX && (image_y - cy).abs() <= HIT_TOLERANCE_PX
    });
    if let Some(handle) = corner {
        return Some(HitTarget::Corner(handle));
    }
    if bounds.contains_with_tolerance(image_x, image_y, HIT_TOLERANCE_PX) {
        return Some(HitTarget::Interior);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_to_image_uses_scale() {
        assert_eq!(display_to_image(50.0, 25.0, 0.5), (100.0, 50.0));
        assert_eq!(display_to_image(50.0, 25.0, 0.0), (50.0, 25.0));
        assert_eq!(display_to_image(50.0, 25.0, f64::NAN), (50.0, 25.0));
    }

    #[test]
    fn test_hit_test_prefers_corners() {
        let b = BoundingBox::new(100, 100, 400, 200);
        assert_eq!(hit_test(&b, 105.0, 95.0), Some(HitTarget::Corner(Handle::TopLeft)));
        assert_eq!(hit_test(&b, 510.0, 310.0), Some(HitTarget::Corner(Handle::BottomRight)));
        assert_eq!(hit_test(&b, 300.0, 200.0), Some(HitTarget::Interior));
        // Just outside an edge but within tolerance
        assert_eq!(hit_test(&b, 300.0, 90.0), Some(HitTarget::Interior));
        assert_eq!(hit_test(&b, 50.0, 50.0), None);
    }
}
