// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture pipelines
//!
//! Pipelines are assembled as parse-launch strings ending in an appsink.
//! Live sources keep `drop=true max-buffers=1` so a slow consumer never
//! accumulates latency; file sources keep a small non-dropping queue and
//! are paced by the reader instead.

use crate::constants::{pipeline, timing};
use crate::errors::SourceError;
use crate::source::codec::Codec;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbImage;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Negotiated stream properties from the sample caps
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// An open capture pipeline and its appsink
pub struct StreamHandle {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    description: String,
}

impl StreamHandle {
    /// Build and start a pipeline from a parse-launch string
    pub fn open(launch: &str, description: &str) -> Result<StreamHandle, SourceError> {
        gstreamer::init().map_err(|e| SourceError::Pipeline(format!("GStreamer init failed: {}", e)))?;

        let element = gstreamer::parse::launch(launch)
            .map_err(|e| SourceError::Pipeline(format!("parse failed: {}", e)))?;
        let pipeline = element
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| SourceError::Pipeline("not a pipeline".into()))?;
        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| SourceError::Pipeline("no appsink named sink".into()))?
            .downcast::<AppSink>()
            .map_err(|_| SourceError::Pipeline("sink is not an appsink".into()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| SourceError::Pipeline(format!("failed to start: {:?}", e)))?;

        debug!(variant = description, "Capture pipeline started");
        Ok(StreamHandle {
            pipeline,
            appsink,
            description: description.to_string(),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Pull the next decoded sample, bounded by `timeout`.
    ///
    /// Returns `None` on timeout, end of stream, or an undecodable
    /// sample; the caller counts those against its failure budget.
    pub fn pull(&self, timeout: Duration) -> Option<(RgbImage, StreamInfo)> {
        let clock = gstreamer::ClockTime::from_mseconds(timeout.as_millis() as u64);
        let sample = self.appsink.try_pull_sample(clock)?;

        let caps = sample.caps()?;
        let info = VideoInfo::from_caps(caps).ok()?;
        let buffer = sample.buffer()?;
        let map = buffer.map_readable().ok()?;

        let width = info.width();
        let height = info.height();
        let stride = info.stride()[0] as usize;
        let row_bytes = width as usize * 3;
        let data = map.as_slice();

        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        if stride == row_bytes {
            let total = row_bytes * height as usize;
            if data.len() < total {
                warn!(
                    len = data.len(),
                    expected = total,
                    "Short buffer from appsink, dropping sample"
                );
                return None;
            }
            pixels.extend_from_slice(&data[..total]);
        } else {
            for row in 0..height as usize {
                let start = row * stride;
                if start + row_bytes > data.len() {
                    warn!(row, "Short row in appsink buffer, dropping sample");
                    return None;
                }
                pixels.extend_from_slice(&data[start..start + row_bytes]);
            }
        }

        let image = RgbImage::from_raw(width, height, pixels)?;

        let fps_fraction = info.fps();
        let fps = if fps_fraction.denom() != 0 {
            fps_fraction.numer() as f64 / fps_fraction.denom() as f64
        } else {
            0.0
        };

        Some((image, StreamInfo { fps, width, height }))
    }

    /// Stop the pipeline and release the underlying stream
    pub fn release(self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
        debug!(variant = %self.description, "Capture pipeline released");
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

/// Decoders worth trying for `codec`, hardware first.
///
/// Probes each candidate by instantiating the element; the software
/// decoder is always kept as the last resort even when probing fails.
pub fn available_decoders(codec: Codec) -> Vec<&'static str> {
    let candidates = codec.decoder_candidates();
    let software = candidates[candidates.len() - 1];
    if gstreamer::init().is_err() {
        return vec![software];
    }
    let mut available = Vec::new();

    for decoder in candidates {
        if gstreamer::ElementFactory::make(decoder).build().is_ok() {
            debug!(decoder, "Decoder available");
            available.push(decoder);
        } else {
            debug!(decoder, "Decoder not available");
        }
    }

    if available.is_empty() {
        info!(decoder = software, "No probed decoder available, trying software anyway");
        available.push(software);
    }
    available
}

/// Low-latency RTSP pipeline for a known codec and decoder.
///
/// TCP transport resists packet loss; `drop=true max-buffers=1` keeps the
/// newest frame only, which is what live inference wants.
pub fn live_pipeline(uri: &str, codec: Codec, decoder: &str) -> String {
    format!(
        "rtspsrc location={uri} protocols=tcp latency={latency} ! \
         {depay} ! {parse} ! {decoder} ! videoconvert ! \
         video/x-raw,format=RGB ! \
         appsink name=sink drop=true max-buffers={buffers} sync=false",
        uri = uri,
        latency = timing::RTSP_LATENCY_MS,
        depay = codec.depayloader(),
        parse = codec.parser(),
        decoder = decoder,
        buffers = pipeline::LIVE_MAX_BUFFERS,
    )
}

/// General-purpose RTSP fallback with automatic stream handling
pub fn fallback_pipeline(uri: &str) -> String {
    format!(
        "rtspsrc location={uri} protocols=tcp latency={latency} ! \
         decodebin ! videoconvert ! video/x-raw,format=RGB ! \
         appsink name=sink drop=true max-buffers={buffers} sync=false",
        uri = uri,
        latency = timing::RTSP_LATENCY_MS,
        buffers = pipeline::LIVE_MAX_BUFFERS,
    )
}

/// File replay pipeline; no dropping, the reader paces to source FPS
pub fn file_pipeline(path: &str) -> String {
    format!(
        "filesrc location=\"{path}\" ! decodebin ! videoconvert ! \
         video/x-raw,format=RGB ! \
         appsink name=sink drop=false max-buffers={buffers} sync=false",
        path = path,
        buffers = pipeline::FILE_MAX_BUFFERS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_pipeline_is_low_latency() {
        let launch = live_pipeline("rtsp://cam/stream", Codec::H264, "avdec_h264");
        assert!(launch.contains("protocols=tcp"));
        assert!(launch.contains("drop=true"));
        assert!(launch.contains("max-buffers=1"));
        assert!(launch.contains("rtph264depay"));
        assert!(launch.contains("avdec_h264"));
        assert!(launch.contains("format=RGB"));
    }

    #[test]
    fn h265_pipeline_uses_family_elements() {
        let launch = live_pipeline("rtsp://cam/stream", Codec::H265, "avdec_h265");
        assert!(launch.contains("rtph265depay"));
        assert!(launch.contains("h265parse"));
    }

    #[test]
    fn file_pipeline_does_not_drop() {
        let launch = file_pipeline("/tmp/video.mp4");
        assert!(launch.contains("filesrc"));
        assert!(launch.contains("drop=false"));
    }
}
