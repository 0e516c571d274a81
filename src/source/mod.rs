// SPDX-License-Identifier: GPL-3.0-only

//! Frame source: connection management, background reader, single-slot buffer
//!
//! The reader thread is the producer; it keeps the decoder drained and
//! overwrites a one-element buffer with the newest frame. Consumers copy
//! out under the lock, so the capture path never waits on inference.

pub mod codec;
pub mod frame;
pub mod gst;

pub use codec::{Codec, CodecHint};
pub use frame::{Frame, Rotation};

use crate::constants::{pipeline as pipeline_consts, timing};
use crate::errors::SourceError;
use crate::shutdown::{ShutdownFlag, join_with_budget};
use gst::{StreamHandle, StreamInfo};
use image::RgbImage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Static configuration for one video source
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// RTSP URL or local file path
    pub address: String,
    /// Device tag stamped onto every frame
    pub device_name: String,
    /// Rotation applied inside the reader thread
    pub rotation: Rotation,
    /// Wait between reconnection attempts
    pub reconnect_interval: Duration,
}

impl SourceConfig {
    pub fn new(address: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            device_name: device_name.into(),
            rotation: Rotation::None,
            reconnect_interval: timing::RECONNECT_INTERVAL,
        }
    }
}

/// Negotiated stream properties, advanced by the reader
#[derive(Debug, Clone, Copy, Default)]
struct StreamState {
    fps: f64,
    width: u32,
    height: u32,
    codec: Option<Codec>,
}

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    last_at: Option<Instant>,
}

/// Thread-safe, at-most-one-in-flight view of the newest decoded frame
pub struct FrameSource {
    config: SourceConfig,
    is_file: bool,
    open: AtomicBool,
    seq: AtomicU64,
    slot: Mutex<Slot>,
    state: Mutex<StreamState>,
    handle: Mutex<Option<StreamHandle>>,
    stop: ShutdownFlag,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl FrameSource {
    pub fn new(config: SourceConfig) -> Self {
        let is_file = Path::new(&config.address).is_file();
        Self {
            config,
            is_file,
            open: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            slot: Mutex::new(Slot::default()),
            state: Mutex::new(StreamState::default()),
            handle: Mutex::new(None),
            stop: ShutdownFlag::new(),
            reader: Mutex::new(None),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.config.device_name
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Negotiated frame rate; zero before the first connect
    pub fn fps(&self) -> f64 {
        self.state.lock().map(|s| s.fps).unwrap_or(0.0)
    }

    /// Negotiated post-rotation frame dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        self.state.lock().map(|s| (s.width, s.height)).unwrap_or((0, 0))
    }

    /// Seconds since the reader last published a frame
    pub fn seconds_since_last_frame(&self) -> Option<f64> {
        self.slot
            .lock()
            .ok()
            .and_then(|s| s.last_at.map(|t| t.elapsed().as_secs_f64()))
    }

    /// Establish the underlying stream.
    ///
    /// Tries the low-latency pipeline for the hinted (or probed) codec,
    /// then the alternate codec in the family, then a general-purpose
    /// decodebin pipeline. Performs a warm-up read and populates the
    /// negotiated FPS and frame dimensions. Fails only when every
    /// variant fails.
    pub fn connect(&self, hint: CodecHint) -> Result<(), SourceError> {
        info!(device = %self.config.device_name, "Connecting");

        let variants = self.connect_variants(hint);
        let mut last_error = String::from("no variants attempted");

        for (description, launch) in variants {
            debug!(variant = %description, "Trying capture pipeline");
            match StreamHandle::open(&launch, &description) {
                Ok(handle) => match handle.pull(timing::WARMUP_TIMEOUT) {
                    Some((pixels, info)) => {
                        self.adopt(handle, pixels, info);
                        let (width, height) = self.dimensions();
                        info!(
                            device = %self.config.device_name,
                            fps = self.fps(),
                            width,
                            height,
                            variant = %description,
                            "Connected"
                        );
                        return Ok(());
                    }
                    None => {
                        warn!(variant = %description, "No frame during warm-up");
                        handle.release();
                        last_error = format!("{}: no frame during warm-up", description);
                    }
                },
                Err(e) => {
                    debug!(variant = %description, error = %e, "Pipeline open failed");
                    last_error = e.to_string();
                }
            }
        }

        error!(device = %self.config.device_name, error = %last_error, "Failed to connect");
        Err(SourceError::ConnectFailed(last_error))
    }

    fn connect_variants(&self, hint: CodecHint) -> Vec<(String, String)> {
        if self.is_file {
            info!(path = %self.config.address, "Opening video file");
            return vec![(
                "file".to_string(),
                gst::file_pipeline(&self.config.address),
            )];
        }

        let preferred = match hint {
            CodecHint::Fixed(codec) => codec,
            CodecHint::Auto => {
                codec::probe_codec(&self.config.address, timing::CODEC_PROBE_TIMEOUT)
            }
        };
        if let Ok(mut state) = self.state.lock() {
            state.codec = Some(preferred);
        }

        let mut variants = Vec::new();
        for c in [preferred, preferred.alternate()] {
            for decoder in gst::available_decoders(c) {
                variants.push((
                    format!("{} via {}", c, decoder),
                    gst::live_pipeline(&self.config.address, c, decoder),
                ));
            }
        }
        variants.push((
            "decodebin fallback".to_string(),
            gst::fallback_pipeline(&self.config.address),
        ));
        variants
    }

    fn adopt(&self, handle: StreamHandle, pixels: RgbImage, info: StreamInfo) {
        if let Ok(mut state) = self.state.lock() {
            state.fps = if info.fps > 0.0 {
                info.fps
            } else {
                pipeline_consts::FALLBACK_FPS
            };
            if self.config.rotation.swaps_dimensions() {
                state.width = info.height;
                state.height = info.width;
            } else {
                state.width = info.width;
                state.height = info.height;
            }
        }
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
        self.publish(pixels);
        self.open.store(true, Ordering::SeqCst);
    }

    /// Rotate, stamp, and overwrite the single-slot buffer
    fn publish(&self, pixels: RgbImage) {
        let pixels = self.config.rotation.apply(pixels);
        let frame = Frame {
            pixels,
            timestamp: chrono::Utc::now(),
            number: self.seq.fetch_add(1, Ordering::SeqCst),
            device: self.config.device_name.clone(),
        };
        if let Ok(mut slot) = self.slot.lock() {
            slot.frame = Some(frame);
            slot.last_at = Some(Instant::now());
        }
    }

    /// Non-blocking read of the most recent frame as an independent copy.
    ///
    /// Returns `None` when the source is closed or has never produced a
    /// frame.
    pub fn read(&self) -> Option<Frame> {
        if !self.is_open() {
            return None;
        }
        self.slot.lock().ok().and_then(|slot| slot.frame.clone())
    }

    /// Start the background capture thread.
    ///
    /// The loop never exits on transient failure; only the shutdown
    /// signal or `close()` stops it.
    pub fn start_reader(self: &Arc<Self>, shutdown: &ShutdownFlag) {
        let mut guard = match self.reader.lock() {
            Ok(g) => g,
            Err(_) => return,
        };
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let source = Arc::clone(self);
        let shutdown = shutdown.clone();
        let name = format!("{}-reader", self.config.device_name);
        match thread::Builder::new()
            .name(name)
            .spawn(move || source.reader_loop(shutdown))
        {
            Ok(handle) => {
                *guard = Some(handle);
                info!(device = %self.config.device_name, "Started background reader thread");
            }
            Err(e) => {
                error!(device = %self.config.device_name, error = %e, "Failed to spawn reader thread");
            }
        }
    }

    fn reader_loop(&self, shutdown: ShutdownFlag) {
        let mut failures: u32 = 0;

        while !shutdown.is_set() && !self.stop.is_set() {
            if !self.is_open() {
                self.reconnect(&shutdown);
                continue;
            }

            let pulled = self
                .handle
                .lock()
                .ok()
                .and_then(|guard| {
                    guard
                        .as_ref()
                        .and_then(|h| h.pull(timing::SAMPLE_PULL_TIMEOUT))
                });

            match pulled {
                Some((pixels, _info)) => {
                    self.publish(pixels);
                    failures = 0;
                }
                None => {
                    failures += 1;
                    if failures > timing::READ_FAILURE_LIMIT {
                        warn!(
                            device = %self.config.device_name,
                            failures,
                            "Connection lost (consecutive read failures)"
                        );
                        self.open.store(false, Ordering::SeqCst);
                        failures = 0;
                        continue;
                    }
                }
            }

            // Live streams are pulled as fast as possible to keep the
            // decoder buffer drained; files pace to the declared FPS.
            if self.is_file {
                let fps = self.fps().max(1.0);
                thread::sleep(Duration::from_secs_f64(1.0 / fps));
            } else {
                thread::sleep(timing::LIVE_READER_YIELD);
            }
        }

        info!(device = %self.config.device_name, "Reader thread exiting");
    }

    fn reconnect(&self, shutdown: &ShutdownFlag) {
        warn!(device = %self.config.device_name, "Attempting to reconnect");
        self.release_handle();

        let deadline = Instant::now() + self.config.reconnect_interval;
        while Instant::now() < deadline {
            if shutdown.is_set() || self.stop.is_set() {
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }

        if let Err(e) = self.connect(CodecHint::Auto) {
            warn!(device = %self.config.device_name, error = %e, "Reconnection failed");
        }
    }

    fn release_handle(&self) {
        let taken = self.handle.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = taken {
            handle.release();
        }
    }

    /// Stop the reader, join it within its budget, and release the
    /// stream handle. Idempotent.
    pub fn close(&self) {
        info!(device = %self.config.device_name, "Closing source");
        self.open.store(false, Ordering::SeqCst);
        self.stop.trigger();

        let handle = self.reader.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            join_with_budget(handle, timing::READER_JOIN_BUDGET, "reader");
        }

        self.release_handle();
        info!(device = %self.config.device_name, "Source closed");
    }
}
