// SPDX-License-Identifier: GPL-3.0-only

//! Predictor contract and predictor registry
//!
//! Model inference is an external collaborator: the detector stage only
//! depends on the `Predictor` trait. Concrete predictors register a
//! factory under a `kind` string at program start, mirroring the stage
//! registry, and the detector's static config selects one.

use crate::errors::ConfigError;
use crate::zones::ZoneAttribution;
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, OnceLock};

/// One tracked object in a frame, as reported by the predictor
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    pub track_id: String,
    /// Bounding box as x1, y1, x2, y2
    pub bbox: [f64; 4],
    pub confidence: f64,
    pub label: i64,
    pub label_name: String,
    /// Zone attribution, filled in by the zone engine
    pub instance_dict: BTreeMap<String, ZoneAttribution>,
    /// Paths of persisted crops for this track, filled in by the detector
    pub crop_paths: Vec<String>,
}

impl TrackEntry {
    pub fn new(
        track_id: impl Into<String>,
        bbox: [f64; 4],
        confidence: f64,
        label: i64,
        label_name: impl Into<String>,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            bbox,
            confidence,
            label,
            label_name: label_name.into(),
            instance_dict: BTreeMap::new(),
            crop_paths: Vec::new(),
        }
    }
}

/// Tracks keyed by track id
pub type TrackMap = BTreeMap<String, TrackEntry>;

/// Contract the detector stage expects from a model backend.
///
/// `predict` returns the tracked objects and an annotated copy of the
/// frame. The run tag identifies the agent run that produced the data.
pub trait Predictor: Send {
    fn predict(
        &mut self,
        frame: &RgbImage,
        timestamp: DateTime<Utc>,
        run_tag: &str,
    ) -> Result<(TrackMap, RgbImage), String>;
}

/// Builds a predictor from the detector's static config
pub type PredictorFactory = fn(&serde_json::Value) -> Result<Box<dyn Predictor>, ConfigError>;

fn registry() -> &'static Mutex<HashMap<String, PredictorFactory>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, PredictorFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a predictor backend under a kind string
pub fn register_predictor(kind: &str, factory: PredictorFactory) {
    if let Ok(mut map) = registry().lock() {
        map.insert(kind.to_string(), factory);
    }
}

/// Resolve a predictor kind; unknown kinds are a configuration error
/// surfaced at pipeline-build time.
pub fn resolve_predictor(
    kind: &str,
    config: &serde_json::Value,
) -> Result<Box<dyn Predictor>, ConfigError> {
    let factory = registry()
        .lock()
        .ok()
        .and_then(|map| map.get(kind).copied())
        .ok_or_else(|| ConfigError::UnknownPredictor(kind.to_string()))?;
    factory(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoPredictor;

    impl Predictor for EchoPredictor {
        fn predict(
            &mut self,
            frame: &RgbImage,
            _timestamp: DateTime<Utc>,
            _run_tag: &str,
        ) -> Result<(TrackMap, RgbImage), String> {
            Ok((TrackMap::new(), frame.clone()))
        }
    }

    #[test]
    fn unknown_kind_is_a_config_error() {
        let err = resolve_predictor("no-such-kind", &serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPredictor(_)));
    }

    #[test]
    fn registered_kind_resolves() {
        register_predictor("echo-test", |_| Ok(Box::new(EchoPredictor)));
        let mut predictor =
            resolve_predictor("echo-test", &serde_json::Value::Null).expect("resolve");
        let frame = RgbImage::new(2, 2);
        let (tracks, annotated) = predictor
            .predict(&frame, Utc::now(), "run-tag")
            .expect("predict");
        assert!(tracks.is_empty());
        assert_eq!(annotated.dimensions(), (2, 2));
    }
}
