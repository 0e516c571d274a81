// SPDX-License-Identifier: GPL-3.0-only

//! Rotate stage (reference transform stage)

use crate::errors::{ConfigError, StageError};
use crate::pipeline::payload::{Payload, StageOutcome};
use crate::pipeline::registry::StageContext;
use crate::source::Rotation;
use crate::stages::Stage;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct RotateConfig {
    pub degrees: i32,
}

pub struct RotateStage {
    rotation: Rotation,
}

impl RotateStage {
    pub fn new(config: RotateConfig) -> Self {
        Self {
            rotation: Rotation::from_degrees(config.degrees),
        }
    }

    pub fn factory(ctx: &StageContext) -> Result<Box<dyn Stage>, ConfigError> {
        let config = if ctx.config.is_null() {
            RotateConfig::default()
        } else {
            serde_json::from_value(ctx.config.clone())
                .map_err(|e| ConfigError::Invalid(format!("rotate config: {}", e)))?
        };
        Ok(Box::new(Self::new(config)))
    }
}

impl Stage for RotateStage {
    fn process(&mut self, mut payload: Payload) -> Result<StageOutcome, StageError> {
        if self.rotation != Rotation::None {
            let pixels = payload.frame.pixels;
            payload.frame.pixels = self.rotation.apply(pixels);
        }
        Ok(StageOutcome::Continue(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Frame;
    use chrono::Utc;
    use image::RgbImage;

    #[test]
    fn rotates_current_frame_only() {
        let mut stage = RotateStage::new(RotateConfig { degrees: 90 });
        let payload = Payload::new(Frame {
            pixels: RgbImage::new(8, 4),
            timestamp: Utc::now(),
            number: 0,
            device: "camera-r".into(),
        });
        match stage.process(payload).unwrap() {
            StageOutcome::Continue(out) => {
                assert_eq!((out.frame.width(), out.frame.height()), (4, 8));
                // The preserved original keeps the captured orientation
                assert_eq!((out.original.width(), out.original.height()), (8, 4));
            }
            StageOutcome::Abort(_) => panic!("rotate never aborts"),
        }
    }
}
