// SPDX-License-Identifier: GPL-3.0-only

//! Rate-limit stage
//!
//! Drops frames whose gap since the last passed frame is below
//! `1 / target_fps`, measured on capture timestamps so replayed sources
//! behave the same as live ones.

use crate::errors::{ConfigError, StageError};
use crate::pipeline::payload::{AbortReason, Payload, StageOutcome};
use crate::pipeline::registry::StageContext;
use crate::stages::Stage;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub target_fps: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { target_fps: 5.0 }
    }
}

pub struct RateLimitStage {
    min_gap: Duration,
    last_pass: Option<DateTime<Utc>>,
}

impl RateLimitStage {
    pub fn new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        if !config.target_fps.is_finite() || config.target_fps <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "target_fps must be positive, got {}",
                config.target_fps
            )));
        }
        let min_gap = Duration::microseconds((1_000_000.0 / config.target_fps) as i64);
        Ok(Self {
            min_gap,
            last_pass: None,
        })
    }

    pub fn factory(ctx: &StageContext) -> Result<Box<dyn Stage>, ConfigError> {
        let config = if ctx.config.is_null() {
            RateLimitConfig::default()
        } else {
            serde_json::from_value(ctx.config.clone())
                .map_err(|e| ConfigError::Invalid(format!("rate_limit config: {}", e)))?
        };
        Ok(Box::new(Self::new(config)?))
    }
}

impl Stage for RateLimitStage {
    fn process(&mut self, payload: Payload) -> Result<StageOutcome, StageError> {
        if let Some(prev) = self.last_pass {
            if payload.timestamp.signed_duration_since(prev) < self.min_gap {
                return Ok(StageOutcome::Abort(AbortReason::RateLimited));
            }
        }
        self.last_pass = Some(payload.timestamp);
        Ok(StageOutcome::Continue(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Frame;
    use chrono::TimeZone;
    use image::RgbImage;

    fn payload_at(millis: i64) -> Payload {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Payload::new(Frame {
            pixels: RgbImage::new(2, 2),
            timestamp: base + Duration::milliseconds(millis),
            number: millis as u64,
            device: "camera-r".into(),
        })
    }

    fn passed(stage: &mut RateLimitStage, millis: i64) -> bool {
        matches!(
            stage.process(payload_at(millis)).unwrap(),
            StageOutcome::Continue(_)
        )
    }

    #[test]
    fn drops_frames_below_target_gap() {
        // 5 fps -> 200ms minimum gap
        let mut stage = RateLimitStage::new(RateLimitConfig { target_fps: 5.0 }).unwrap();
        assert!(passed(&mut stage, 0));
        assert!(!passed(&mut stage, 100));
        assert!(!passed(&mut stage, 199));
        assert!(passed(&mut stage, 200));
        assert!(!passed(&mut stage, 350));
        assert!(passed(&mut stage, 400));
    }

    #[test]
    fn rejects_nonpositive_fps() {
        assert!(RateLimitStage::new(RateLimitConfig { target_fps: 0.0 }).is_err());
        assert!(RateLimitStage::new(RateLimitConfig { target_fps: -1.0 }).is_err());
    }

    #[test]
    fn abort_reason_is_rate_limited() {
        let mut stage = RateLimitStage::new(RateLimitConfig { target_fps: 1.0 }).unwrap();
        assert!(passed(&mut stage, 0));
        match stage.process(payload_at(10)).unwrap() {
            StageOutcome::Abort(reason) => assert_eq!(reason, AbortReason::RateLimited),
            StageOutcome::Continue(_) => panic!("expected abort"),
        }
    }
}
