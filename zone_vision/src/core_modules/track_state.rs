// THEORY:
// `TrackState` is the only memory the tracking loop carries from one frame to the
// next. It gives the system "object permanence" for a single subject: when a frame
// yields nothing usable, the resolver falls back on what was last known here.
//
// There is exactly one live instance per run. It is owned by the pipeline and lent
// mutably to the resolver once per frame, in strict frame order.

use crate::core_modules::detection::Point;
use crate::core_modules::zone::ZoneId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackState {
    /// The most recent zone resolved by containment.
    pub last_known_zone: Option<ZoneId>,
    /// The most recent detection centroid, whether or not it fell inside a zone.
    pub last_detected_position: Option<Point>,
    /// Number of genuine detections seen so far.
    pub detections: u64,
}

impl TrackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a centroid to the detection history.
    pub fn record_detection(&mut self, centroid: Point) {
        self.last_detected_position = Some(centroid);
        self.detections += 1;
    }

    pub fn has_zone(&self) -> bool {
        self.last_known_zone.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detections_update_last_position() {
        let mut state = TrackState::new();
        assert!(!state.has_zone());
        state.record_detection(Point::new(1, 2));
        state.record_detection(Point::new(3, 4));
        assert_eq!(state.last_detected_position, Some(Point::new(3, 4)));
        assert_eq!(state.detections, 2);
        assert_eq!(state.last_known_zone, None);
    }
}
