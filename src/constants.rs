// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Timing and retry budgets for capture and shutdown
pub mod timing {
    use std::time::Duration;

    /// Consecutive failed reads before the source is considered dead
    pub const READ_FAILURE_LIMIT: u32 = 10;

    /// Wait between reconnection attempts
    pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

    /// Per-iteration yield for live sources so an empty appsink does not busy-spin
    pub const LIVE_READER_YIELD: Duration = Duration::from_millis(5);

    /// Sample pull timeout inside the reader loop
    pub const SAMPLE_PULL_TIMEOUT: Duration = Duration::from_millis(100);

    /// Main-loop sleep when the source has produced nothing yet
    pub const EMPTY_READ_SLEEP: Duration = Duration::from_millis(100);

    /// Main-loop sleep while waiting for the reader to publish a newer frame
    pub const NEXT_FRAME_POLL: Duration = Duration::from_millis(2);

    /// Hard ceiling on codec probing at connect time
    pub const CODEC_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Warm-up read timeout when validating a freshly opened pipeline
    pub const WARMUP_TIMEOUT: Duration = Duration::from_secs(5);

    /// RTSP jitter-buffer latency in milliseconds
    pub const RTSP_LATENCY_MS: u32 = 200;

    /// Join budget for the reader thread at close
    pub const READER_JOIN_BUDGET: Duration = Duration::from_secs(2);

    /// Join budget for the health monitor thread
    pub const HEALTH_JOIN_BUDGET: Duration = Duration::from_secs(2);

    /// Join budget for the metadata worker thread
    pub const METADATA_JOIN_BUDGET: Duration = Duration::from_secs(5);

    /// Join budget for each artifact pool worker
    pub const ARTIFACT_JOIN_BUDGET: Duration = Duration::from_secs(5);

    /// Upper bound on any blocking wait so shutdown propagates within ~1s
    pub const POLL_TIMEOUT: Duration = Duration::from_secs(1);
}

/// Sink defaults (artifact encoding and metadata batching)
pub mod sink {
    use std::time::Duration;

    /// Records buffered before a bulk insert is forced
    pub const BATCH_SIZE: usize = 100;

    /// Maximum time between bulk inserts while records are pending
    pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

    /// CPU-bound JPEG encode workers
    pub const ENCODE_WORKERS: usize = 3;

    /// Filesystem write workers
    pub const IO_WORKERS: usize = 2;

    /// JPEG quality for persisted frames
    pub const JPEG_QUALITY: u8 = 90;

    /// Default root for frame artifacts
    pub const BASE_DIR: &str = "./results/frames";
}

/// Health-check defaults (all on the luminance plane)
pub mod health {
    use std::time::Duration;

    /// Seconds between health evaluations
    pub const INTERVAL: Duration = Duration::from_secs(30);

    /// Shannon entropy below this reads as a flat/glitched image
    pub const ENTROPY_THRESHOLD: f64 = 4.0;

    /// Fraction of near-white pixels above this reads as signal loss
    pub const WHITE_RATIO_THRESHOLD: f64 = 0.6;

    /// Intensity above which a pixel counts as white
    pub const WHITE_LEVEL: u8 = 220;

    /// Laplacian variance below this reads as blur
    pub const BLUR_THRESHOLD: f64 = 100.0;

    /// Mean intensity below this reads as a black screen
    pub const BLACK_THRESHOLD: f64 = 10.0;

    /// Floor on the staleness threshold in seconds
    pub const MIN_STALE_SECS: f64 = 5.0;

    /// Staleness threshold also scales with this many frame periods
    pub const STALE_FRAME_PERIODS: f64 = 10.0;
}

/// Capture pipeline tuning
pub mod pipeline {
    /// Appsink queue depth for live sources; one buffer keeps latency minimal
    pub const LIVE_MAX_BUFFERS: u32 = 1;

    /// Appsink queue depth for file sources; pacing happens in the reader
    pub const FILE_MAX_BUFFERS: u32 = 4;

    /// Assumed frame rate when the source does not declare one
    pub const FALLBACK_FPS: f64 = 30.0;
}
