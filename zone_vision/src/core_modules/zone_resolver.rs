// THEORY:
// The `ZoneResolver` turns "what the camera saw this frame" into "where the subject
// is this frame". It is the single place that owns the fallback policy, and it is the
// only writer of `TrackState`.
//
// Per frame:
// 1.  A genuine detection is recorded in the track history and (subject to the
//     heatmap policy) counted on the heatmap, even if it lies outside every zone.
// 2.  The centroid is resolved against the `ZoneIndex` by strict containment, most
//     specific zone first.
// 3.  If containment found nothing but a zone has been seen before, the last-known
//     zone is emitted together with the most recent detection position. That position
//     may be this frame's own out-of-zone centroid: the fallback is positional, not
//     zone-consistent.
// 4.  If containment found a zone, it is emitted with the current centroid and becomes
//     the last-known zone.
// 5.  Otherwise nothing is known yet: the centroid (if any) is emitted with no zone.
//
// The resolver has no notion of time and never skips a frame; the pipeline turns
// every `Resolution` into exactly one `PositionRecord`.

use crate::config::HeatmapPolicy;
use crate::core_modules::detection::{Detection, Point};
use crate::core_modules::heatmap::HeatmapGrid;
use crate::core_modules::track_state::TrackState;
use crate::core_modules::zone::{ZoneId, ZoneIndex};

/// The resolved position and zone for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub position: Option<Point>,
    pub zone: Option<ZoneId>,
}

pub struct ZoneResolver {
    zones: ZoneIndex,
    heatmap_policy: HeatmapPolicy,
}

impl ZoneResolver {
    pub fn new(zones: ZoneIndex, heatmap_policy: HeatmapPolicy) -> Self {
        Self {
            zones,
            heatmap_policy,
        }
    }

    pub fn zones(&self) -> &ZoneIndex {
        &self.zones
    }

    pub fn resolve(
        &self,
        detection: Option<&Detection>,
        state: &mut TrackState,
        heatmap: &mut HeatmapGrid,
    ) -> Resolution {
        let centroid = detection.map(|d| d.centroid);
        let contained = centroid.and_then(|c| self.zones.resolve(c));

        if let Some(c) = centroid {
            state.record_detection(c);
            let counts = match self.heatmap_policy {
                HeatmapPolicy::EveryDetection => true,
                HeatmapPolicy::ZonedOnly => contained.is_some(),
            };
            if counts {
                heatmap.increment(c);
            }
        }

        match (contained, state.last_known_zone) {
            (None, Some(last_zone)) => Resolution {
                position: state.last_detected_position,
                zone: Some(last_zone),
            },
            (Some(zone), _) => {
                state.last_known_zone = Some(zone);
                Resolution {
                    position: centroid,
                    zone: Some(zone),
                }
            }
            (None, None) => Resolution {
                position: centroid,
                zone: None,
            },
        }
    }
}
