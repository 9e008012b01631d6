// THEORY:
// The `detection` module holds the per-frame snapshot of the subject. A `Detection`
// is a "dumb" data container: the single best foreground contour of one frame,
// reduced to an axis-aligned bounding box, a centroid and an area. It has no memory
// of earlier frames; persistence across frames is the job of `TrackState`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned box with inclusive pixel extents: a single pixel has width 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Midpoint of the box, truncated to integer pixels.
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2,
            y: self.y + self.height / 2,
        }
    }
}

/// The subject as seen in a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub centroid: Point,
    /// Area enclosed by the outer contour, in square pixels.
    pub area: f64,
}

impl Detection {
    pub fn from_box(bounding_box: BoundingBox, area: f64) -> Self {
        Self {
            centroid: bounding_box.center(),
            bounding_box,
            area,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_truncates_half_pixels() {
        let bbox = BoundingBox { x: 10, y: 20, width: 5, height: 8 };
        assert_eq!(bbox.center(), Point::new(12, 24));
    }

    #[test]
    fn detection_centroid_follows_box() {
        let detection = Detection::from_box(BoundingBox { x: 0, y: 0, width: 31, height: 31 }, 900.0);
        assert_eq!(detection.centroid, Point::new(15, 15));
    }
}
