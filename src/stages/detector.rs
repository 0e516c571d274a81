// SPDX-License-Identifier: GPL-3.0-only

//! Detector stage
//!
//! The archetype stage: runs the predictor over the current frame,
//! stamps zone attributions, persists raw/plotted (and optionally crop)
//! artifacts through the async sink, and emits a detection record. The
//! artifact paths are claimed synchronously so the metadata record can
//! reference files that are still being written.

use crate::constants::sink as sink_consts;
use crate::errors::{ConfigError, StageError};
use crate::pipeline::payload::{AbortReason, Payload, StageOutcome, keys};
use crate::pipeline::registry::StageContext;
use crate::plot;
use crate::predict::{self, Predictor, TrackMap};
use crate::sink::{
    ArtifactKind, ArtifactSink, ArtifactSinkConfig, DetectionEvent, MetadataSink,
    MetadataSinkConfig,
};
use crate::source::Rotation;
use crate::stages::Stage;
use crate::store::DetectionWriter;
use crate::zones::{PassthroughAttributor, Zone, ZoneAttributor};
use chrono::{DateTime, Utc};
use image::RgbImage;
use image::imageops;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Static configuration of the detector stage
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Predictor kind resolved through the predictor registry
    pub predictor: String,
    /// Opaque model configuration handed to the predictor factory
    pub model: serde_json::Value,
    /// Extra rotation applied before inference
    pub rotation: i32,
    /// Overlay zone outlines on the plotted artifact
    pub plot_zones: bool,
    /// Persist per-track crops
    pub store_crops: bool,
    /// Padding around each crop in pixels
    pub crop_padding: u32,
    /// Artifact root directory
    pub base_dir: String,
    pub jpeg_quality: u8,
    pub encode_workers: usize,
    pub io_workers: usize,
    pub batch_size: usize,
    pub flush_interval_secs: f64,
    /// Optional store-side device id carried on records
    pub device_id: Option<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            predictor: String::new(),
            model: serde_json::Value::Null,
            rotation: 0,
            plot_zones: true,
            store_crops: false,
            crop_padding: 10,
            base_dir: sink_consts::BASE_DIR.to_string(),
            jpeg_quality: sink_consts::JPEG_QUALITY,
            encode_workers: sink_consts::ENCODE_WORKERS,
            io_workers: sink_consts::IO_WORKERS,
            batch_size: sink_consts::BATCH_SIZE,
            flush_interval_secs: sink_consts::FLUSH_INTERVAL.as_secs_f64(),
            device_id: None,
        }
    }
}

pub struct DetectorStage {
    predictor: Box<dyn Predictor>,
    attributor: Box<dyn ZoneAttributor>,
    zones: Vec<Zone>,
    artifacts: ArtifactSink,
    metadata: MetadataSink,
    rotation: Rotation,
    plot_zones: bool,
    store_crops: bool,
    crop_padding: u32,
    /// Identifies this agent run on every prediction
    run_tag: String,
}

impl DetectorStage {
    /// Registry factory: resolves the predictor kind and wires the
    /// stage's own sinks from its static config.
    pub fn factory(ctx: &StageContext) -> Result<Box<dyn Stage>, ConfigError> {
        let config: DetectorConfig = if ctx.config.is_null() {
            DetectorConfig::default()
        } else {
            serde_json::from_value(ctx.config.clone())
                .map_err(|e| ConfigError::Invalid(format!("detector config: {}", e)))?
        };
        if config.predictor.is_empty() {
            return Err(ConfigError::Invalid(
                "detector requires a predictor kind".into(),
            ));
        }
        let predictor = predict::resolve_predictor(&config.predictor, &config.model)?;
        let stage = Self::assemble(
            config,
            &ctx.device_name,
            ctx.zones.clone(),
            Arc::clone(&ctx.detections),
            predictor,
            Box::new(PassthroughAttributor),
        );
        Ok(Box::new(stage))
    }

    /// Build the stage from explicit collaborators
    pub fn assemble(
        config: DetectorConfig,
        device_name: &str,
        zones: Vec<Zone>,
        detections: Arc<dyn DetectionWriter>,
        predictor: Box<dyn Predictor>,
        attributor: Box<dyn ZoneAttributor>,
    ) -> Self {
        let mut artifact_config = ArtifactSinkConfig::new(&config.base_dir, device_name);
        artifact_config.jpeg_quality = config.jpeg_quality;
        artifact_config.encode_workers = config.encode_workers;
        artifact_config.io_workers = config.io_workers;
        let artifacts = ArtifactSink::new(artifact_config);

        let mut metadata_config = MetadataSinkConfig::new(device_name);
        metadata_config.device_id = config.device_id.clone();
        metadata_config.batch_size = config.batch_size;
        metadata_config.flush_interval =
            std::time::Duration::from_secs_f64(config.flush_interval_secs.max(0.0));
        let metadata = MetadataSink::new(detections, metadata_config);

        let run_tag = Utc::now().format("%d%m%Y%H%M%S%6f").to_string();
        info!(device = device_name, run_tag = %run_tag, "Detector stage initialized");

        Self {
            predictor,
            attributor,
            zones,
            artifacts,
            metadata,
            rotation: Rotation::from_degrees(config.rotation),
            plot_zones: config.plot_zones,
            store_crops: config.store_crops,
            crop_padding: config.crop_padding,
            run_tag,
        }
    }

    fn persist_crops(
        &self,
        annotated: &RgbImage,
        tracks: &mut TrackMap,
        timestamp: DateTime<Utc>,
        frame_number: u64,
    ) {
        let width = annotated.width() as f64;
        let height = annotated.height() as f64;
        let padding = self.crop_padding as f64;

        for entry in tracks.values_mut() {
            let [x1, y1, x2, y2] = entry.bbox;
            let x1p = (x1 - padding).max(0.0);
            let y1p = (y1 - padding).max(0.0);
            let x2p = (x2 + padding).min(width);
            let y2p = (y2 + padding).min(height);
            if x2p <= x1p || y2p <= y1p {
                continue;
            }

            let crop = imageops::crop_imm(
                annotated,
                x1p as u32,
                y1p as u32,
                (x2p - x1p) as u32,
                (y2p - y1p) as u32,
            )
            .to_image();
            let path = self.artifacts.submit(
                crop,
                timestamp,
                frame_number,
                ArtifactKind::Crop {
                    track_id: entry.track_id.clone(),
                },
            );
            entry.crop_paths.push(path.display().to_string());
        }
    }
}

impl Stage for DetectorStage {
    fn process(&mut self, mut payload: Payload) -> Result<StageOutcome, StageError> {
        if payload.frame.is_empty() {
            return Ok(StageOutcome::Abort(AbortReason::EmptyFrame));
        }

        let mut pixels = payload.frame.pixels.clone();
        if self.rotation != Rotation::None {
            pixels = self.rotation.apply(pixels);
        }

        let started = Instant::now();
        let raw_path = self.artifacts.submit(
            pixels.clone(),
            payload.timestamp,
            payload.frame_number,
            ArtifactKind::Raw,
        );

        let (tracks, mut annotated) = self
            .predictor
            .predict(&pixels, payload.timestamp, &self.run_tag)
            .map_err(StageError::Predictor)?;

        let mut tracks = self.attributor.update_track_status(tracks);

        if self.plot_zones && !self.zones.is_empty() {
            plot::draw_zones(&mut annotated, &self.zones);
        }

        let plotted_path = self.artifacts.submit(
            annotated.clone(),
            payload.timestamp,
            payload.frame_number,
            ArtifactKind::Plotted,
        );
        let inference_time = started.elapsed().as_secs_f64();

        if self.store_crops && !tracks.is_empty() {
            self.persist_crops(&annotated, &mut tracks, payload.timestamp, payload.frame_number);
        }

        self.metadata.submit(DetectionEvent {
            frame_number: payload.frame_number,
            time_stamp: payload.timestamp,
            raw_frame_path: raw_path.display().to_string(),
            plotted_frame_path: plotted_path.display().to_string(),
            inference_time,
            tracks: tracks.clone(),
        });

        payload
            .meta
            .insert_text(keys::RAW_FRAME_PATH, raw_path.display().to_string());
        payload
            .meta
            .insert_text(keys::PLOTTED_FRAME_PATH, plotted_path.display().to_string());
        payload.meta.insert_float(keys::INFERENCE_TIME, inference_time);
        payload.meta.insert_tracks(keys::TRACK_IDS_INFO, tracks);
        payload.frame.pixels = annotated;

        Ok(StageOutcome::Continue(payload))
    }

    fn close(&mut self) {
        self.artifacts.close();
        self.metadata.close();
    }
}
