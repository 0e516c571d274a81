// SPDX-License-Identifier: GPL-3.0-only

//! Stream codec identification
//!
//! The hinted codec drives which depayloader/parser/decoder chain the
//! low-latency pipeline uses. When the hint is `auto`, the stream is
//! probed with `ffprobe` under a hard timeout; h264 is the default on
//! probe failure.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Video codec of an RTSP stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
        }
    }

    /// The other codec in the same family, used as the first fallback
    pub fn alternate(&self) -> Codec {
        match self {
            Codec::H264 => Codec::H265,
            Codec::H265 => Codec::H264,
        }
    }

    pub fn depayloader(&self) -> &'static str {
        match self {
            Codec::H264 => "rtph264depay",
            Codec::H265 => "rtph265depay",
        }
    }

    pub fn parser(&self) -> &'static str {
        match self {
            Codec::H264 => "h264parse",
            Codec::H265 => "h265parse",
        }
    }

    /// Decoder elements to try, hardware first
    pub fn decoder_candidates(&self) -> [&'static str; 3] {
        match self {
            Codec::H264 => ["vaapih264dec", "nvh264dec", "avdec_h264"],
            Codec::H265 => ["vaapih265dec", "nvh265dec", "avdec_h265"],
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Codec selection at connect time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecHint {
    /// Probe the stream and pick the advertised codec
    #[default]
    Auto,
    /// Use the given codec without probing
    Fixed(Codec),
}

/// Peek at the stream and guess its codec.
///
/// Defaults to h264 whenever the probe fails, times out, or reports
/// something unexpected.
pub fn probe_codec(address: &str, timeout: Duration) -> Codec {
    match run_ffprobe(address, timeout) {
        Ok(name) => {
            debug!(codec = %name, "Stream codec probed");
            parse_codec_name(&name)
        }
        Err(e) => {
            warn!(error = %e, "Codec probe failed, defaulting to h264");
            Codec::H264
        }
    }
}

/// Map an ffprobe codec name onto the supported family
pub fn parse_codec_name(name: &str) -> Codec {
    let lower = name.to_lowercase();
    if lower.contains("hevc") || lower.contains("265") {
        Codec::H265
    } else {
        Codec::H264
    }
}

fn run_ffprobe(address: &str, timeout: Duration) -> std::io::Result<String> {
    let mut child = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_name",
            "-of",
            "csv=p=0",
            address,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            break;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "codec probe timed out",
            ));
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_string(&mut output)?;
    }
    Ok(output.trim().to_string())
}
