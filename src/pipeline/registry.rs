// SPDX-License-Identifier: GPL-3.0-only

//! Stage registry
//!
//! A process-wide map from `(module_path, class_name)` selectors to
//! stage factories, populated lazily with the built-ins. Resolution is
//! by exact match; unknown selectors fail pipeline construction before
//! any capture begins.

use crate::errors::ConfigError;
use crate::shutdown::ShutdownFlag;
use crate::source::FrameSource;
use crate::stages::Stage;
use crate::store::DetectionWriter;
use crate::zones::Zone;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Everything a stage factory gets: the stage's static config plus
/// runtime injections as named fields.
#[derive(Clone)]
pub struct StageContext {
    /// Logical stage name from the descriptor
    pub name: String,
    /// Stage-specific static configuration
    pub config: serde_json::Value,
    /// Device tag of the owning agent
    pub device_name: String,
    /// Handle to the frame source
    pub source: Arc<FrameSource>,
    /// Zones attached to the camera
    pub zones: Vec<Zone>,
    /// Bulk writer for detection records
    pub detections: Arc<dyn DetectionWriter>,
    /// Process-wide stop event
    pub shutdown: ShutdownFlag,
}

/// Builds a stage instance from its merged configuration
pub type StageFactory = fn(&StageContext) -> Result<Box<dyn Stage>, ConfigError>;

type Selector = (String, String);

fn registry() -> &'static Mutex<HashMap<Selector, StageFactory>> {
    static REGISTRY: OnceLock<Mutex<HashMap<Selector, StageFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<Selector, StageFactory> = HashMap::new();
        map.insert(
            ("vigil::stages::detector".into(), "Detector".into()),
            crate::stages::detector::DetectorStage::factory,
        );
        map.insert(
            ("vigil::stages::rate_limit".into(), "RateLimit".into()),
            crate::stages::rate_limit::RateLimitStage::factory,
        );
        map.insert(
            ("vigil::stages::rotate".into(), "Rotate".into()),
            crate::stages::rotate::RotateStage::factory,
        );
        Mutex::new(map)
    })
}

/// Register an additional stage implementation
pub fn register_stage(module_path: &str, class_name: &str, factory: StageFactory) {
    if let Ok(mut map) = registry().lock() {
        map.insert((module_path.to_string(), class_name.to_string()), factory);
    }
}

/// Resolve a selector to its factory; exact match only
pub fn resolve_stage(module_path: &str, class_name: &str) -> Result<StageFactory, ConfigError> {
    registry()
        .lock()
        .ok()
        .and_then(|map| {
            map.get(&(module_path.to_string(), class_name.to_string()))
                .copied()
        })
        .ok_or_else(|| ConfigError::UnknownStage {
            module_path: module_path.to_string(),
            class_name: class_name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve() {
        assert!(resolve_stage("vigil::stages::detector", "Detector").is_ok());
        assert!(resolve_stage("vigil::stages::rate_limit", "RateLimit").is_ok());
        assert!(resolve_stage("vigil::stages::rotate", "Rotate").is_ok());
    }

    #[test]
    fn unknown_selector_is_exact_match_failure() {
        let err = resolve_stage("vigil::stages::detector", "detector").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStage { .. }));
        assert!(resolve_stage("something::else", "Detector").is_err());
    }
}
