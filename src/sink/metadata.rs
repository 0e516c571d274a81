// SPDX-License-Identifier: GPL-3.0-only

//! Metadata sink
//!
//! Decouples pipeline latency from document-store latency: detection
//! events are queued, normalized, batched, and bulk-inserted by a single
//! background worker. Delivery is at-most-once; a failed batch is logged
//! and discarded.

use crate::constants::{sink, timing};
use crate::predict::TrackMap;
use crate::shutdown::{ShutdownFlag, join_with_budget};
use crate::store::{DetectionRecord, DetectionWriter, normalize_tracks};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// One frame's worth of detection output, pre-normalization
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub frame_number: u64,
    pub time_stamp: DateTime<Utc>,
    pub raw_frame_path: String,
    pub plotted_frame_path: String,
    pub inference_time: f64,
    pub tracks: TrackMap,
}

/// Static configuration for the metadata sink
#[derive(Debug, Clone)]
pub struct MetadataSinkConfig {
    pub device_name: String,
    /// Optional store-side device id; the name stays authoritative
    pub device_id: Option<String>,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl MetadataSinkConfig {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            device_id: None,
            batch_size: sink::BATCH_SIZE,
            flush_interval: sink::FLUSH_INTERVAL,
        }
    }
}

/// Batch-and-flush writer of detection records
pub struct MetadataSink {
    tx: Option<Sender<DetectionEvent>>,
    worker: Option<JoinHandle<()>>,
    stop: ShutdownFlag,
}

impl MetadataSink {
    pub fn new(writer: Arc<dyn DetectionWriter>, config: MetadataSinkConfig) -> Self {
        let (tx, rx) = unbounded::<DetectionEvent>();
        let stop = ShutdownFlag::new();
        let worker_stop = stop.clone();
        let name = format!("{}-metadata", config.device_name);

        info!(
            device = %config.device_name,
            batch_size = config.batch_size,
            flush_interval_secs = config.flush_interval.as_secs(),
            "Metadata batch writer started"
        );

        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || batch_worker(rx, writer, config, worker_stop))
            .ok();
        if worker.is_none() {
            error!("Failed to spawn metadata worker thread");
        }

        Self {
            tx: Some(tx),
            worker,
            stop,
        }
    }

    /// Non-blocking enqueue. Events without detections are dropped to
    /// save space.
    pub fn submit(&self, event: DetectionEvent) {
        if event.tracks.is_empty() {
            debug!(frame = event.frame_number, "No detections, skipping record");
            return;
        }
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                error!("Metadata sink worker is gone, dropping record");
            }
        }
    }

    /// Stop the worker, flush whatever remains in the buffer, and join
    /// within the metadata budget. Safe to call once; later calls no-op.
    pub fn close(&mut self) {
        if self.tx.take().is_none() {
            return;
        }
        info!("Stopping metadata sink");
        self.stop.trigger();
        if let Some(handle) = self.worker.take() {
            join_with_budget(handle, timing::METADATA_JOIN_BUDGET, "metadata");
        }
        info!("Metadata sink stopped");
    }
}

impl Drop for MetadataSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn batch_worker(
    rx: Receiver<DetectionEvent>,
    writer: Arc<dyn DetectionWriter>,
    config: MetadataSinkConfig,
    stop: ShutdownFlag,
) {
    let mut buffer: Vec<DetectionRecord> = Vec::new();
    let mut last_flush = Instant::now();

    loop {
        if stop.is_set() {
            break;
        }

        // 1s poll timeout so shutdown is observed promptly
        match rx.recv_timeout(timing::POLL_TIMEOUT) {
            Ok(event) => {
                if let Some(record) = format_record(event, &config) {
                    buffer.push(record);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let buffer_full = buffer.len() >= config.batch_size;
        let time_up = last_flush.elapsed() >= config.flush_interval;
        if !buffer.is_empty() && (buffer_full || time_up) {
            flush(writer.as_ref(), &mut buffer);
            last_flush = Instant::now();
        }
    }

    // Drain anything still queued, then one final flush
    while let Ok(event) = rx.try_recv() {
        if let Some(record) = format_record(event, &config) {
            buffer.push(record);
        }
    }
    if !buffer.is_empty() {
        flush(writer.as_ref(), &mut buffer);
    }
}

/// Normalize an event into the persisted record shape.
///
/// Returns `None` when every track fails coercion; the record would
/// carry no detections.
fn format_record(event: DetectionEvent, config: &MetadataSinkConfig) -> Option<DetectionRecord> {
    let track_ids_info = normalize_tracks(&event.tracks);
    if track_ids_info.is_empty() {
        error!(
            frame = event.frame_number,
            "Metadata formatting dropped every track, skipping record"
        );
        return None;
    }
    Some(DetectionRecord {
        frame_number: event.frame_number,
        time_stamp: event.time_stamp,
        device_name: config.device_name.clone(),
        device_id: config.device_id.clone(),
        inference_time: event.inference_time,
        raw_frame_path: event.raw_frame_path,
        plotted_frame_path: event.plotted_frame_path,
        track_ids_info,
    })
}

fn flush(writer: &dyn DetectionWriter, buffer: &mut Vec<DetectionRecord>) {
    match writer.insert_batch(buffer) {
        Ok(()) => debug!(count = buffer.len(), "Flushed records"),
        Err(e) => error!(count = buffer.len(), error = %e, "Database batch insert error, discarding batch"),
    }
    buffer.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::predict::TrackEntry;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWriter {
        batches: Mutex<Vec<Vec<DetectionRecord>>>,
    }

    impl RecordingWriter {
        fn batch_sizes(&self) -> Vec<usize> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .map(|b| b.len())
                .collect()
        }
    }

    impl DetectionWriter for RecordingWriter {
        fn insert_batch(&self, records: &[DetectionRecord]) -> Result<(), StoreError> {
            self.batches.lock().unwrap().push(records.to_vec());
            Ok(())
        }
    }

    fn event(frame: u64, with_tracks: bool) -> DetectionEvent {
        let mut tracks = TrackMap::new();
        if with_tracks {
            tracks.insert(
                "1".into(),
                TrackEntry::new("1", [0.0, 0.0, 4.0, 4.0], 0.8, 0, "person"),
            );
        }
        DetectionEvent {
            frame_number: frame,
            time_stamp: Utc::now(),
            raw_frame_path: format!("/frames/raw/{}.jpg", frame),
            plotted_frame_path: format!("/frames/plotted/{}.jpg", frame),
            inference_time: 0.02,
            tracks,
        }
    }

    fn sink_with(
        writer: Arc<RecordingWriter>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> MetadataSink {
        let mut config = MetadataSinkConfig::new("camera-m");
        config.batch_size = batch_size;
        config.flush_interval = flush_interval;
        MetadataSink::new(writer, config)
    }

    #[test]
    fn final_flush_on_close_delivers_partial_batch() {
        let writer = Arc::new(RecordingWriter::default());
        let mut sink = sink_with(writer.clone(), 100, Duration::from_secs(60));

        for n in 0..50 {
            sink.submit(event(n, true));
        }
        sink.close();

        let sizes = writer.batch_sizes();
        assert_eq!(sizes.iter().sum::<usize>(), 50);
    }

    #[test]
    fn batch_size_triggers_flush() {
        let writer = Arc::new(RecordingWriter::default());
        let mut sink = sink_with(writer.clone(), 5, Duration::from_secs(60));

        for n in 0..5 {
            sink.submit(event(n, true));
        }
        // The worker polls with a 1s timeout; give it time to flush
        let deadline = Instant::now() + Duration::from_secs(5);
        while writer.batch_sizes().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(writer.batch_sizes().first().copied(), Some(5));
        sink.close();
    }

    #[test]
    fn empty_events_are_dropped() {
        let writer = Arc::new(RecordingWriter::default());
        let mut sink = sink_with(writer.clone(), 10, Duration::from_secs(60));

        sink.submit(event(1, false));
        sink.close();

        assert!(writer.batch_sizes().is_empty());
    }

    #[test]
    fn close_within_budget_and_idempotent() {
        let writer = Arc::new(RecordingWriter::default());
        let mut sink = sink_with(writer.clone(), 10, Duration::from_secs(60));
        sink.submit(event(1, true));

        let start = Instant::now();
        sink.close();
        assert!(start.elapsed() <= timing::METADATA_JOIN_BUDGET + Duration::from_secs(1));
        sink.close();

        assert_eq!(writer.batch_sizes(), vec![1]);
    }

    #[test]
    fn records_carry_device_identity() {
        let writer = Arc::new(RecordingWriter::default());
        let mut config = MetadataSinkConfig::new("camera-m");
        config.device_id = Some("64f0".into());
        let mut sink = MetadataSink::new(writer.clone(), config);
        sink.submit(event(9, true));
        sink.close();

        let batches = writer.batches.lock().unwrap();
        let record = &batches[0][0];
        assert_eq!(record.device_name, "camera-m");
        assert_eq!(record.device_id.as_deref(), Some("64f0"));
        assert_eq!(record.frame_number, 9);
    }
}
