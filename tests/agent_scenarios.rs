// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end scenarios over the public API: a rate-limited detector
//! pipeline fed synthetic frames, with a fake predictor and an in-memory
//! detection writer standing in for the external collaborators.

use chrono::{DateTime, Duration, TimeZone, Utc};
use image::{Rgb, RgbImage};
use std::sync::{Arc, Mutex};
use vigil::errors::StoreError;
use vigil::pipeline::{PipelineDescriptor, PipelineRuntime, RuntimeInjections};
use vigil::predict::{Predictor, TrackEntry, TrackMap, register_predictor};
use vigil::shutdown::ShutdownFlag;
use vigil::source::{Frame, FrameSource, SourceConfig};
use vigil::store::{DetectionRecord, DetectionWriter};

#[derive(Default)]
struct CollectingWriter {
    batches: Mutex<Vec<Vec<DetectionRecord>>>,
}

impl CollectingWriter {
    fn records(&self) -> Vec<DetectionRecord> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|b| b.iter().cloned())
            .collect()
    }
}

impl DetectionWriter for CollectingWriter {
    fn insert_batch(&self, records: &[DetectionRecord]) -> Result<(), StoreError> {
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(())
    }
}

/// Reports one person track on every even frame, none on odd frames
struct AlternatingPredictor {
    invocations: u64,
}

impl Predictor for AlternatingPredictor {
    fn predict(
        &mut self,
        frame: &RgbImage,
        _timestamp: DateTime<Utc>,
        _run_tag: &str,
    ) -> Result<(TrackMap, RgbImage), String> {
        let call = self.invocations;
        self.invocations += 1;
        let mut tracks = TrackMap::new();
        if call % 2 == 0 {
            tracks.insert(
                "1".into(),
                TrackEntry::new("1", [4.0, 4.0, 20.0, 28.0], 0.88, 0, "person"),
            );
        }
        Ok((tracks, frame.clone()))
    }
}

fn frame_at(number: u64, base: DateTime<Utc>, period_ms: i64) -> Frame {
    Frame {
        pixels: RgbImage::from_pixel(48, 48, Rgb([80, 90, 100])),
        timestamp: base + Duration::milliseconds(number as i64 * period_ms),
        number,
        device: "camera-e2e".into(),
    }
}

#[test]
fn rate_limited_detector_pipeline_end_to_end() {
    register_predictor("scenario-alternating", |_config| {
        Ok(Box::new(AlternatingPredictor { invocations: 0 }))
    });

    let tmp = tempfile::tempdir().unwrap();
    let writer = Arc::new(CollectingWriter::default());

    let raw = format!(
        r#"{{
            "modules": [
                {{ "name": "limiter", "module_path": "vigil::stages::rate_limit",
                   "class_name": "RateLimit", "config": {{ "target_fps": 5 }} }},
                {{ "name": "detector", "module_path": "vigil::stages::detector",
                   "class_name": "Detector",
                   "config": {{
                       "predictor": "scenario-alternating",
                       "base_dir": "{base}",
                       "encode_workers": 1,
                       "io_workers": 1,
                       "batch_size": 100,
                       "flush_interval_secs": 60
                   }} }}
            ]
        }}"#,
        base = tmp.path().display()
    );
    let descriptor = PipelineDescriptor::from_json(&raw).expect("descriptor");

    let injections = RuntimeInjections {
        source: Arc::new(FrameSource::new(SourceConfig::new(
            "rtsp://test/e2e",
            "camera-e2e",
        ))),
        device_name: "camera-e2e".into(),
        zones: Vec::new(),
        detections: writer.clone(),
        shutdown: ShutdownFlag::new(),
        process_skip_frame: 0,
    };
    let mut runtime = PipelineRuntime::build(&descriptor, injections).expect("build");

    // 50 frames at 25 fps (40 ms apart). The 5 fps limiter passes every
    // 200 ms: frames 0, 5, 10, ... 45 reach the detector.
    let base = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
    let mut completed = 0;
    for n in 0..50 {
        if runtime.process_frame(frame_at(n, base, 40)) {
            completed += 1;
        }
    }
    assert_eq!(completed, 10);

    // Stage close hooks flush the metadata sink and drain artifact pools
    runtime.close();

    // The predictor alternates: 10 invocations, 5 with detections
    let records = writer.records();
    assert_eq!(records.len(), 5);
    for record in &records {
        assert_eq!(record.device_name, "camera-e2e");
        assert!(record.track_ids_info.contains_key("1"));
        assert_eq!(record.track_ids_info["1"].bbox, [4, 4, 20, 28]);
        // Claimed artifact paths exist on disk after close()
        assert!(std::path::Path::new(&record.raw_frame_path).exists());
        assert!(std::path::Path::new(&record.plotted_frame_path).exists());
    }

    // Frame numbers preserved in capture order
    let numbers: Vec<u64> = records.iter().map(|r| r.frame_number).collect();
    let mut sorted = numbers.clone();
    sorted.sort_unstable();
    assert_eq!(numbers, sorted);
}

#[test]
fn frames_without_detections_leave_no_records() {
    register_predictor("scenario-empty", |_config| {
        struct EmptyPredictor;
        impl Predictor for EmptyPredictor {
            fn predict(
                &mut self,
                frame: &RgbImage,
                _timestamp: DateTime<Utc>,
                _run_tag: &str,
            ) -> Result<(TrackMap, RgbImage), String> {
                Ok((TrackMap::new(), frame.clone()))
            }
        }
        Ok(Box::new(EmptyPredictor))
    });

    let tmp = tempfile::tempdir().unwrap();
    let writer = Arc::new(CollectingWriter::default());

    let raw = format!(
        r#"{{
            "modules": [
                {{ "name": "detector", "module_path": "vigil::stages::detector",
                   "class_name": "Detector",
                   "config": {{
                       "predictor": "scenario-empty",
                       "base_dir": "{base}",
                       "encode_workers": 1,
                       "io_workers": 1
                   }} }}
            ]
        }}"#,
        base = tmp.path().display()
    );
    let descriptor = PipelineDescriptor::from_json(&raw).expect("descriptor");

    let injections = RuntimeInjections {
        source: Arc::new(FrameSource::new(SourceConfig::new(
            "rtsp://test/e2e",
            "camera-e2e",
        ))),
        device_name: "camera-e2e".into(),
        zones: Vec::new(),
        detections: writer.clone(),
        shutdown: ShutdownFlag::new(),
        process_skip_frame: 0,
    };
    let mut runtime = PipelineRuntime::build(&descriptor, injections).expect("build");

    let base = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
    for n in 0..10 {
        assert!(runtime.process_frame(frame_at(n, base, 200)));
    }
    runtime.close();

    assert!(writer.records().is_empty());
}
