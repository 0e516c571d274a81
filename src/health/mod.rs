// SPDX-License-Identifier: GPL-3.0-only

//! Stream health surveillance
//!
//! A passive observer thread that periodically classifies the source as
//! connected/stale and the latest frame as healthy/corrupted. It never
//! mutates the capture buffer and never calls back into the reader.

pub mod checks;

pub use checks::{FrameHealthValidator, HealthIssue, HealthThresholds};

use crate::constants::{health as health_consts, timing};
use crate::shutdown::{ShutdownFlag, join_with_budget};
use crate::source::FrameSource;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

/// Latest classification of the stream
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub connected: bool,
    pub corrupted: bool,
    pub issues: Vec<HealthIssue>,
    pub checked_at: DateTime<Utc>,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            connected: false,
            corrupted: false,
            issues: Vec::new(),
            checked_at: Utc::now(),
        }
    }
}

/// External receiver for health reports (e.g. the camera-status collection)
pub trait HealthSink: Send + Sync {
    fn push_status(&self, device_name: &str, connected: bool, corrupted: bool);
}

/// Background health monitor for one frame source
pub struct HealthMonitor {
    latest: Arc<Mutex<HealthReport>>,
    stop: ShutdownFlag,
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Start the monitor thread.
    ///
    /// Every `interval`: compute freshness against
    /// `max(MIN_STALE_SECS, STALE_FRAME_PERIODS / fps)`, then, if the
    /// source is fresh, copy the latest frame and run the image checks.
    pub fn start(
        source: Arc<FrameSource>,
        interval: Duration,
        thresholds: HealthThresholds,
        sink: Option<Arc<dyn HealthSink>>,
        shutdown: ShutdownFlag,
    ) -> Self {
        let latest = Arc::new(Mutex::new(HealthReport::default()));
        let stop = ShutdownFlag::new();

        let shared = Arc::clone(&latest);
        let local_stop = stop.clone();
        let name = format!("{}-health", source.device_name());

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let validator = FrameHealthValidator::new(thresholds);
                info!(device = %source.device_name(), "Started health monitor thread");

                loop {
                    // Chunked wait so shutdown propagates within ~1s
                    let mut waited = Duration::ZERO;
                    while waited < interval {
                        if shutdown.is_set() || local_stop.is_set() {
                            info!(device = %source.device_name(), "Health monitor exiting");
                            return;
                        }
                        let step = timing::POLL_TIMEOUT.min(interval - waited);
                        thread::sleep(step);
                        waited += step;
                    }

                    let report = evaluate(&source, &validator);
                    log_report(source.device_name(), &report);
                    if let Some(ref sink) = sink {
                        sink.push_status(
                            source.device_name(),
                            report.connected,
                            report.corrupted,
                        );
                    }
                    if let Ok(mut slot) = shared.lock() {
                        *slot = report;
                    }
                }
            })
            .ok();

        if handle.is_none() {
            error!("Failed to spawn health monitor thread");
        }

        Self {
            latest,
            stop,
            handle,
        }
    }

    /// Most recent report
    pub fn latest(&self) -> HealthReport {
        self.latest
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Stop the monitor and join it within its budget
    pub fn stop(&mut self) {
        self.stop.trigger();
        if let Some(handle) = self.handle.take() {
            join_with_budget(handle, timing::HEALTH_JOIN_BUDGET, "health");
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One health evaluation: freshness first, image checks only when fresh
fn evaluate(source: &FrameSource, validator: &FrameHealthValidator) -> HealthReport {
    let fps = source.fps().max(1.0);
    let threshold =
        health_consts::MIN_STALE_SECS.max(health_consts::STALE_FRAME_PERIODS / fps);
    let age = source.seconds_since_last_frame();
    let connected = age.map(|a| a < threshold).unwrap_or(false);

    if !connected {
        return HealthReport {
            connected: false,
            corrupted: false,
            issues: vec![HealthIssue::Disconnected],
            checked_at: Utc::now(),
        };
    }

    match source.read() {
        Some(frame) => {
            let (healthy, issues) = validator.validate(&frame.pixels);
            HealthReport {
                connected: true,
                corrupted: !healthy,
                issues,
                checked_at: Utc::now(),
            }
        }
        None => HealthReport {
            connected: true,
            corrupted: true,
            issues: vec![HealthIssue::EmptyFrame],
            checked_at: Utc::now(),
        },
    }
}

fn log_report(device: &str, report: &HealthReport) {
    if !report.connected {
        warn!(device, "Health alert: camera disconnected");
    } else if report.corrupted {
        let reasons: Vec<String> = report.issues.iter().map(|i| i.to_string()).collect();
        warn!(device, issues = ?reasons, "Health alert: image issues");
    }
}
