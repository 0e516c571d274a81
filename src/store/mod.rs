// SPDX-License-Identifier: GPL-3.0-only

//! Document shapes and store seams
//!
//! The agent reads its camera and service configuration from a document
//! store at startup and emits detection records and camera status during
//! operation. Everything outside this module talks to the store through
//! the narrow traits below, so the driver never leaks into the pipeline.

pub mod mongo;

pub use mongo::DocumentStore;

use crate::errors::StoreError;
use crate::predict::{TrackEntry, TrackMap};
use crate::zones::{Zone, ZoneAttribution};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Camera document (collection `cameras`)
///
/// snake_case is authoritative; camelCase spellings are accepted for
/// migration tolerance.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(alias = "deviceName")]
    pub device_name: String,
    #[serde(alias = "cameraAddress")]
    pub camera_address: String,
    #[serde(default, alias = "processSkipFrame")]
    pub process_skip_frame: u32,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub zones: Vec<ObjectId>,
}

fn default_true() -> bool {
    true
}

/// Service document (collection `services`)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(alias = "serviceName")]
    pub service_name: String,
    #[serde(alias = "pipelinePath")]
    pub pipeline_path: String,
}

/// Zone document (collection `zones`)
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneDoc {
    pub zone_id: String,
    pub name: String,
    #[serde(default)]
    pub zone_type: String,
    #[serde(default)]
    pub roi: Vec<Vec<f64>>,
    #[serde(default = "default_zone_colour", alias = "colourHex")]
    pub colour_hex: String,
}

fn default_zone_colour() -> String {
    "#09467c".to_string()
}

impl From<ZoneDoc> for Zone {
    fn from(doc: ZoneDoc) -> Self {
        Zone {
            zone_id: doc.zone_id,
            name: doc.name,
            zone_type: doc.zone_type,
            roi: doc
                .roi
                .into_iter()
                .filter(|p| p.len() >= 2)
                .map(|p| (p[0], p[1]))
                .collect(),
            colour_hex: doc.colour_hex,
        }
    }
}

/// Camera status document (collection `camera_status`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStatusDoc {
    pub device_name: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub connection: bool,
    pub frame_corruption: bool,
}

/// Normalized per-track info as persisted in a detection record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub track_id: String,
    pub bbox: [i64; 4],
    pub confidence: f64,
    pub label: i64,
    pub label_name: String,
    #[serde(default)]
    pub instance_dict: BTreeMap<String, ZoneAttribution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub track_id_path_list: Vec<String>,
}

impl TrackInfo {
    /// Coerce a predictor track entry into the persisted shape.
    ///
    /// Returns `None` when the entry carries non-finite geometry or
    /// confidence; such entries cannot be stored meaningfully.
    pub fn normalized(entry: &TrackEntry) -> Option<TrackInfo> {
        if !entry.confidence.is_finite() || entry.bbox.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(TrackInfo {
            track_id: entry.track_id.clone(),
            bbox: [
                entry.bbox[0].round() as i64,
                entry.bbox[1].round() as i64,
                entry.bbox[2].round() as i64,
                entry.bbox[3].round() as i64,
            ],
            confidence: entry.confidence,
            label: entry.label,
            label_name: entry.label_name.clone(),
            instance_dict: entry.instance_dict.clone(),
            track_id_path_list: entry.crop_paths.clone(),
        })
    }
}

/// One persisted detection record (collection `metadata`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub frame_number: u64,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub time_stamp: DateTime<Utc>,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub inference_time: f64,
    pub raw_frame_path: String,
    #[serde(default)]
    pub plotted_frame_path: String,
    pub track_ids_info: BTreeMap<String, TrackInfo>,
}

/// Normalize a full track map, dropping entries that fail coercion
pub fn normalize_tracks(tracks: &TrackMap) -> BTreeMap<String, TrackInfo> {
    let mut normalized = BTreeMap::new();
    for (key, entry) in tracks {
        match TrackInfo::normalized(entry) {
            Some(info) => {
                normalized.insert(key.clone(), info);
            }
            None => {
                warn!(track_id = %entry.track_id, "Dropping track with non-finite values");
            }
        }
    }
    normalized
}

/// Bulk writer for detection records
pub trait DetectionWriter: Send + Sync {
    fn insert_batch(&self, records: &[DetectionRecord]) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(conf: f64, bbox: [f64; 4]) -> TrackEntry {
        TrackEntry::new("3", bbox, conf, 1, "person")
    }

    #[test]
    fn normalization_rounds_bboxes() {
        let info = TrackInfo::normalized(&entry(0.87, [10.4, 20.6, 110.5, 220.1])).unwrap();
        assert_eq!(info.bbox, [10, 21, 111, 220]);
        assert_eq!(info.confidence, 0.87);
        assert_eq!(info.label, 1);
    }

    #[test]
    fn non_finite_entries_are_rejected() {
        assert!(TrackInfo::normalized(&entry(f64::NAN, [0.0, 0.0, 1.0, 1.0])).is_none());
        assert!(TrackInfo::normalized(&entry(0.5, [0.0, f64::INFINITY, 1.0, 1.0])).is_none());
    }

    #[test]
    fn normalize_tracks_drops_only_bad_entries() {
        let mut tracks = TrackMap::new();
        tracks.insert("1".into(), entry(0.9, [0.0, 0.0, 5.0, 5.0]));
        tracks.insert("2".into(), entry(f64::NAN, [0.0, 0.0, 5.0, 5.0]));
        let normalized = normalize_tracks(&tracks);
        assert_eq!(normalized.len(), 1);
        assert!(normalized.contains_key("1"));
    }

    #[test]
    fn zone_doc_roi_converts_to_points() {
        let doc = ZoneDoc {
            zone_id: "z1".into(),
            name: "dock".into(),
            zone_type: "polygon".into(),
            roi: vec![vec![0.0, 0.0], vec![10.0, 0.0], vec![10.0], vec![10.0, 10.0]],
            colour_hex: "#09467c".into(),
        };
        let zone: Zone = doc.into();
        assert_eq!(zone.roi, vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
    }

    #[test]
    fn camera_doc_accepts_both_spellings() {
        let snake: CameraDoc = bson::from_document(bson::doc! {
            "_id": ObjectId::new(),
            "device_name": "Camera-001",
            "camera_address": "rtsp://cam/1",
            "process_skip_frame": 2,
            "rotation": 90,
        })
        .unwrap();
        assert_eq!(snake.device_name, "Camera-001");
        assert_eq!(snake.process_skip_frame, 2);
        assert!(snake.active);

        let camel: CameraDoc = bson::from_document(bson::doc! {
            "_id": ObjectId::new(),
            "deviceName": "Camera-002",
            "cameraAddress": "rtsp://cam/2",
        })
        .unwrap();
        assert_eq!(camel.device_name, "Camera-002");
        assert_eq!(camel.camera_address, "rtsp://cam/2");
        assert_eq!(camel.process_skip_frame, 0);
    }

    #[test]
    fn detection_record_round_trips_through_bson() {
        let mut tracks = TrackMap::new();
        let mut e = entry(0.75, [1.0, 2.0, 3.0, 4.0]);
        e.instance_dict.insert(
            "dock".into(),
            ZoneAttribution {
                location: crate::zones::ZoneLocation::Inside,
            },
        );
        tracks.insert("9".into(), e);

        let record = DetectionRecord {
            frame_number: 42,
            time_stamp: Utc::now(),
            device_name: "Camera-001".into(),
            device_id: None,
            inference_time: 0.031,
            raw_frame_path: "/a/raw.jpg".into(),
            plotted_frame_path: "/a/plotted.jpg".into(),
            track_ids_info: normalize_tracks(&tracks),
        };

        let doc = bson::to_document(&record).unwrap();
        let back: DetectionRecord = bson::from_document(doc).unwrap();
        // BSON datetimes carry millisecond precision; compare the rest
        // field-wise and the timestamp at that granularity.
        assert_eq!(back.frame_number, record.frame_number);
        assert_eq!(back.device_name, record.device_name);
        assert_eq!(back.track_ids_info, record.track_ids_info);
        assert_eq!(back.raw_frame_path, record.raw_frame_path);
        assert_eq!(
            back.time_stamp.timestamp_millis(),
            record.time_stamp.timestamp_millis()
        );
    }
}
