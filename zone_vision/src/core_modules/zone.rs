// THEORY:
// Zones are the user's regions of interest: plain rectangles in frame pixel
// coordinates, identified by the order in which they were drawn. They are gathered
// during setup and frozen into a `ZoneIndex` before the tracking loop begins.
//
// Two rules give containment its exact meaning:
// 1.  **Open rectangles**: a point is inside a zone only if it lies strictly between
//     its edges. A centroid sitting exactly on an edge belongs to no zone.
// 2.  **Most specific wins**: zones may overlap. When several contain a point, the one
//     with the smallest area is chosen, and equal areas keep the earlier zone.

use crate::core_modules::detection::Point;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// 1-based zone identity in definition order. Never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub u32);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Bounding rectangle of a drag gesture, inclusive of both endpoints.
    pub fn from_corners(start: Point, end: Point) -> Self {
        Self {
            x: start.x.min(end.x),
            y: start.y.min(end.y),
            width: start.x.abs_diff(end.x) + 1,
            height: start.y.abs_diff(end.y) + 1,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Strict containment: points on an edge are outside.
    pub fn contains(&self, point: Point) -> bool {
        let (px, py) = (point.x as u64, point.y as u64);
        let (x, y) = (self.x as u64, self.y as u64);
        x < px && px < x + self.width as u64 && y < py && py < y + self.height as u64
    }
}

/// A zone as it is described by the setup phase: either a finished rectangle or the
/// two endpoints of a pointer drag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneSpec {
    Rect(Rect),
    Drag { start: [u32; 2], end: [u32; 2] },
}

impl ZoneSpec {
    pub fn to_rect(&self) -> Rect {
        match *self {
            ZoneSpec::Rect(rect) => rect,
            ZoneSpec::Drag { start, end } => {
                Rect::from_corners(Point::new(start[0], start[1]), Point::new(end[0], end[1]))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    pub id: ZoneId,
    pub rect: Rect,
}

/// The frozen, ordered list of zones for a run.
#[derive(Debug, Clone, Default)]
pub struct ZoneIndex {
    zones: Vec<Zone>,
}

impl ZoneIndex {
    pub fn new(rects: impl IntoIterator<Item = Rect>) -> Self {
        let zones = rects
            .into_iter()
            .enumerate()
            .map(|(i, rect)| Zone {
                id: ZoneId(i as u32 + 1),
                rect,
            })
            .collect();
        Self { zones }
    }

    pub fn from_specs(specs: &[ZoneSpec]) -> Self {
        Self::new(specs.iter().map(ZoneSpec::to_rect))
    }

    /// Loads zone specs from a JSON array; array order is definition order.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let specs: Vec<ZoneSpec> = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(Self::from_specs(&specs))
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Every zone that strictly contains `point`, in definition order.
    pub fn containing(&self, point: Point) -> impl Iterator<Item = &Zone> {
        self.zones.iter().filter(move |zone| zone.rect.contains(point))
    }

    /// The most specific zone containing `point`.
    pub fn resolve(&self, point: Point) -> Option<ZoneId> {
        let mut best: Option<&Zone> = None;
        for zone in self.containing(point) {
            // Strict `<` keeps the earlier zone on equal areas.
            if best.is_none_or(|b| zone.rect.area() < b.rect.area()) {
                best = Some(zone);
            }
        }
        best.map(|zone| zone.id)
    }
}
