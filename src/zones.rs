// SPDX-License-Identifier: GPL-3.0-only

//! Zone model and zone-attribution contract
//!
//! Zone geometry computation lives outside this crate; the agent only
//! carries the zone definitions from the camera record and the contract
//! a geometry engine implements to stamp per-track zone membership.

use crate::predict::TrackMap;
use serde::{Deserialize, Serialize};

/// Per-track membership of a named zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneLocation {
    Inside,
    Outside,
}

/// One entry of a track's zone attribution map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneAttribution {
    pub location: ZoneLocation,
}

/// A named polygonal region attached to a camera
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub zone_id: String,
    pub name: String,
    pub zone_type: String,
    /// Polygon vertices in pixel coordinates
    pub roi: Vec<(f64, f64)>,
    /// Outline color as a hex string, e.g. "#09467c"
    pub colour_hex: String,
}

/// Contract for the external zone geometry engine.
///
/// Each returned track gains (or keeps) an `instance_dict` mapping zone
/// names to their attribution.
pub trait ZoneAttributor: Send {
    fn update_track_status(&self, tracks: TrackMap) -> TrackMap;
}

/// Attributor used when no geometry engine is wired in; leaves every
/// track untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAttributor;

impl ZoneAttributor for PassthroughAttributor {
    fn update_track_status(&self, tracks: TrackMap) -> TrackMap {
        tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::TrackEntry;

    #[test]
    fn passthrough_keeps_tracks_untouched() {
        let mut tracks = TrackMap::new();
        tracks.insert(
            "7".to_string(),
            TrackEntry::new("7", [1.0, 2.0, 3.0, 4.0], 0.9, 0, "person"),
        );
        let out = PassthroughAttributor.update_track_status(tracks.clone());
        assert_eq!(out, tracks);
    }

    #[test]
    fn zone_location_serializes_lowercase() {
        let json = serde_json::to_string(&ZoneLocation::Inside).unwrap();
        assert_eq!(json, "\"inside\"");
        let back: ZoneLocation = serde_json::from_str("\"outside\"").unwrap();
        assert_eq!(back, ZoneLocation::Outside);
    }
}
