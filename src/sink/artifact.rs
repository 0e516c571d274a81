// SPDX-License-Identifier: GPL-3.0-only

//! Frame artifact sink
//!
//! Persists frames to disk without blocking the pipeline. `submit`
//! computes the final path synchronously and returns it immediately;
//! JPEG encoding runs on a CPU-bound pool and writing on an I/O pool.
//! The returned path may dangle if a later encode or write fails; the
//! metadata record stays queryable and missing artifacts are detected
//! downstream.

use crate::constants::{sink, timing};
use crate::shutdown::join_with_budget;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// What a persisted frame is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Frame as captured
    Raw,
    /// Frame annotated by the detector
    Plotted,
    /// Per-track region cut out of a frame
    Crop { track_id: String },
}

impl ArtifactKind {
    /// Directory segment for this kind
    pub fn dir(&self) -> &'static str {
        match self {
            ArtifactKind::Raw => "raw",
            ArtifactKind::Plotted => "plotted",
            ArtifactKind::Crop { .. } => "crop",
        }
    }
}

/// Static configuration for one artifact sink
#[derive(Debug, Clone)]
pub struct ArtifactSinkConfig {
    pub base_dir: PathBuf,
    pub device_name: String,
    pub jpeg_quality: u8,
    pub encode_workers: usize,
    pub io_workers: usize,
}

impl ArtifactSinkConfig {
    pub fn new(base_dir: impl Into<PathBuf>, device_name: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            device_name: device_name.into(),
            jpeg_quality: sink::JPEG_QUALITY,
            encode_workers: sink::ENCODE_WORKERS,
            io_workers: sink::IO_WORKERS,
        }
    }
}

struct EncodeJob {
    pixels: RgbImage,
    path: PathBuf,
}

struct WriteJob {
    bytes: Vec<u8>,
    path: PathBuf,
}

/// Asynchronous frame persistence over two worker pools
pub struct ArtifactSink {
    config: ArtifactSinkConfig,
    encode_tx: Option<Sender<EncodeJob>>,
    io_tx: Option<Sender<WriteJob>>,
    encoders: Vec<JoinHandle<()>>,
    writers: Vec<JoinHandle<()>>,
}

impl ArtifactSink {
    pub fn new(config: ArtifactSinkConfig) -> Self {
        let (encode_tx, encode_rx) = unbounded::<EncodeJob>();
        let (io_tx, io_rx) = unbounded::<WriteJob>();

        let mut writers = Vec::with_capacity(config.io_workers.max(1));
        for index in 0..config.io_workers.max(1) {
            let rx = io_rx.clone();
            let name = format!("{}-io-{}", config.device_name, index);
            if let Ok(handle) = thread::Builder::new()
                .name(name)
                .spawn(move || write_loop(rx))
            {
                writers.push(handle);
            }
        }

        let mut encoders = Vec::with_capacity(config.encode_workers.max(1));
        for index in 0..config.encode_workers.max(1) {
            let rx = encode_rx.clone();
            let tx = io_tx.clone();
            let quality = config.jpeg_quality;
            let name = format!("{}-enc-{}", config.device_name, index);
            if let Ok(handle) = thread::Builder::new()
                .name(name)
                .spawn(move || encode_loop(rx, tx, quality))
            {
                encoders.push(handle);
            }
        }

        info!(
            device = %config.device_name,
            encode_workers = encoders.len(),
            io_workers = writers.len(),
            base_dir = %config.base_dir.display(),
            "Artifact sink started"
        );

        Self {
            config,
            encode_tx: Some(encode_tx),
            io_tx: Some(io_tx),
            encoders,
            writers,
        }
    }

    /// Path the artifact will occupy once written:
    /// `{base_dir}/{YYYY-MM-DD}/{device}/{kind}/{frame_number}-{timestamp}.jpg`
    /// (crops carry the track id in the filename).
    pub fn artifact_path(
        &self,
        timestamp: DateTime<Utc>,
        frame_number: u64,
        kind: &ArtifactKind,
    ) -> PathBuf {
        let date = timestamp.format("%Y-%m-%d").to_string();
        let stamp = timestamp.format("%Y%m%dT%H%M%S%6fZ").to_string();
        let file_name = match kind {
            ArtifactKind::Crop { track_id } => {
                format!("{}-{}-{}.jpg", frame_number, stamp, track_id)
            }
            _ => format!("{}-{}.jpg", frame_number, stamp),
        };
        self.config
            .base_dir
            .join(date)
            .join(&self.config.device_name)
            .join(kind.dir())
            .join(file_name)
    }

    /// Queue a frame for persistence and return its final path
    /// immediately, even though encoding and writing happen later.
    pub fn submit(
        &self,
        pixels: RgbImage,
        timestamp: DateTime<Utc>,
        frame_number: u64,
        kind: ArtifactKind,
    ) -> PathBuf {
        let path = self.artifact_path(timestamp, frame_number, &kind);
        match &self.encode_tx {
            Some(tx) => {
                if tx
                    .send(EncodeJob {
                        pixels,
                        path: path.clone(),
                    })
                    .is_err()
                {
                    warn!(path = %path.display(), "Artifact sink is shut down, dropping frame");
                }
            }
            None => {
                warn!(path = %path.display(), "Artifact sink is closed, dropping frame");
            }
        }
        path
    }

    /// Drain both pools, flush pending writes, and join the workers
    /// within a bounded wait. Safe to call once; later calls no-op.
    pub fn close(&mut self) {
        if self.encode_tx.take().is_none() {
            return;
        }
        for handle in self.encoders.drain(..) {
            join_with_budget(handle, timing::ARTIFACT_JOIN_BUDGET, "artifact-encode");
        }
        self.io_tx.take();
        for handle in self.writers.drain(..) {
            join_with_budget(handle, timing::ARTIFACT_JOIN_BUDGET, "artifact-io");
        }
        info!(device = %self.config.device_name, "Artifact sink closed");
    }
}

impl Drop for ArtifactSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn encode_loop(rx: Receiver<EncodeJob>, tx: Sender<WriteJob>, quality: u8) {
    loop {
        match rx.recv_timeout(timing::POLL_TIMEOUT) {
            Ok(job) => match encode_jpeg(&job.pixels, quality) {
                Ok(bytes) => {
                    if tx.send(WriteJob { bytes, path: job.path }).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!(path = %job.path.display(), error = %e, "JPEG encoding failed");
                }
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn write_loop(rx: Receiver<WriteJob>) {
    loop {
        match rx.recv_timeout(timing::POLL_TIMEOUT) {
            Ok(job) => {
                if let Err(e) = write_bytes(&job.path, &job.bytes) {
                    error!(path = %job.path.display(), error = %e, "Artifact write failed");
                } else {
                    debug!(path = %job.path.display(), size = job.bytes.len(), "Artifact written");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn encode_jpeg(pixels: &RgbImage, quality: u8) -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder
        .encode(
            pixels.as_raw(),
            pixels.width(),
            pixels.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| e.to_string())?;
    Ok(buffer)
}

fn write_bytes(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgb;
    use std::time::{Duration, Instant};

    fn test_sink(dir: &Path) -> ArtifactSink {
        let mut config = ArtifactSinkConfig::new(dir, "camera-a");
        config.encode_workers = 2;
        config.io_workers = 1;
        ArtifactSink::new(config)
    }

    #[test]
    fn path_layout_matches_convention() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = test_sink(tmp.path());
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();

        let path = sink.artifact_path(ts, 17, &ArtifactKind::Raw);
        let expected = tmp
            .path()
            .join("2026-03-14")
            .join("camera-a")
            .join("raw")
            .join("17-20260314T092653000000Z.jpg");
        assert_eq!(path, expected);

        let crop = sink.artifact_path(
            ts,
            17,
            &ArtifactKind::Crop {
                track_id: "42".into(),
            },
        );
        assert!(crop.to_string_lossy().contains("/crop/"));
        assert!(crop.to_string_lossy().ends_with("-42.jpg"));
    }

    #[test]
    fn submit_returns_path_then_writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = test_sink(tmp.path());
        let pixels = RgbImage::from_pixel(16, 16, Rgb([120, 10, 30]));

        let path = sink.submit(pixels, Utc::now(), 3, ArtifactKind::Plotted);
        sink.close();

        assert!(path.exists(), "expected {} to exist", path.display());
        let bytes = std::fs::read(&path).unwrap();
        // JPEG magic
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn close_drains_pending_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = test_sink(tmp.path());
        let pixels = RgbImage::from_pixel(32, 32, Rgb([1, 2, 3]));

        let mut paths = Vec::new();
        for n in 0..20 {
            paths.push(sink.submit(pixels.clone(), Utc::now(), n, ArtifactKind::Raw));
        }
        let start = Instant::now();
        sink.close();
        assert!(start.elapsed() < Duration::from_secs(15));

        for path in paths {
            assert!(path.exists(), "missing artifact {}", path.display());
        }
    }

    #[test]
    fn close_twice_is_safe() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = test_sink(tmp.path());
        sink.close();
        sink.close();
    }
}
