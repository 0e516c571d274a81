// SPDX-License-Identifier: GPL-3.0-only

//! The per-frame packet threaded through the pipeline

use crate::predict::TrackMap;
use crate::source::Frame;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Known meta keys written by the built-in stages
pub mod keys {
    pub const RAW_FRAME_PATH: &str = "raw_frame_path";
    pub const PLOTTED_FRAME_PATH: &str = "plotted_frame_path";
    pub const INFERENCE_TIME: &str = "inference_time";
    pub const TRACK_IDS_INFO: &str = "track_ids_info";
}

/// A stage-defined meta value
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Float(f64),
    Integer(i64),
    Tracks(TrackMap),
}

/// Open map of stage results accumulated along the pipeline.
///
/// Keys are stage-defined; the ones produced by built-in stages are
/// listed in [`keys`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta(BTreeMap<String, MetaValue>);

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_text(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), MetaValue::Text(value.into()));
    }

    pub fn insert_float(&mut self, key: &str, value: f64) {
        self.0.insert(key.to_string(), MetaValue::Float(value));
    }

    pub fn insert_integer(&mut self, key: &str, value: i64) {
        self.0.insert(key.to_string(), MetaValue::Integer(value));
    }

    pub fn insert_tracks(&mut self, key: &str, value: TrackMap) {
        self.0.insert(key.to_string(), MetaValue::Tracks(value));
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(MetaValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(MetaValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(MetaValue::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn tracks(&self, key: &str) -> Option<&TrackMap> {
        match self.0.get(key) {
            Some(MetaValue::Tracks(t)) => Some(t),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-frame packet: current frame, preserved original, and accumulated
/// stage results
#[derive(Debug, Clone)]
pub struct Payload {
    /// Current frame, possibly transformed by upstream stages
    pub frame: Frame,
    /// Untouched copy of the captured frame
    pub original: Frame,
    pub timestamp: DateTime<Utc>,
    pub frame_number: u64,
    pub meta: Meta,
}

impl Payload {
    /// Build a fresh payload at pipeline entry
    pub fn new(frame: Frame) -> Self {
        let timestamp = frame.timestamp;
        let frame_number = frame.number;
        let original = frame.clone();
        Self {
            frame,
            original,
            timestamp,
            frame_number,
            meta: Meta::new(),
        }
    }
}

/// Why a stage aborted the current frame
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// The frame carries no pixels
    EmptyFrame,
    /// Inter-arrival gap below the configured rate limit
    RateLimited,
    Other(String),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::EmptyFrame => write!(f, "empty frame"),
            AbortReason::RateLimited => write!(f, "rate limited"),
            AbortReason::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// What a stage did with the payload
#[derive(Debug)]
pub enum StageOutcome {
    /// Pass the (possibly mutated) payload to the next stage
    Continue(Payload),
    /// Halt processing of this frame; later stages are not invoked
    Abort(AbortReason),
}
