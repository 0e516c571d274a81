// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline descriptor loading
//!
//! The descriptor is an ordered list of stage entries loaded from a JSON
//! file; array order is execution order and is semantically significant.

use crate::errors::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// One stage entry in the descriptor.
///
/// `module_path` + `class_name` form the registry selector.
#[derive(Debug, Clone, Deserialize)]
pub struct StageDescriptor {
    pub name: String,
    pub module_path: String,
    pub class_name: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Ordered pipeline definition
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDescriptor {
    #[serde(default)]
    pub modules: Vec<StageDescriptor>,
}

impl PipelineDescriptor {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Descriptor(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let descriptor: PipelineDescriptor = serde_json::from_str(raw)
            .map_err(|e| ConfigError::Descriptor(format!("invalid JSON: {}", e)))?;
        if descriptor.modules.is_empty() {
            return Err(ConfigError::Descriptor("no modules defined".into()));
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_parses_in_order() {
        let raw = r#"{
            "modules": [
                { "name": "limiter", "module_path": "vigil::stages::rate_limit",
                  "class_name": "RateLimit", "config": { "target_fps": 5 } },
                { "name": "detector", "module_path": "vigil::stages::detector",
                  "class_name": "Detector" }
            ]
        }"#;
        let descriptor = PipelineDescriptor::from_json(raw).unwrap();
        assert_eq!(descriptor.modules.len(), 2);
        assert_eq!(descriptor.modules[0].name, "limiter");
        assert_eq!(descriptor.modules[1].class_name, "Detector");
        assert_eq!(descriptor.modules[0].config["target_fps"], 5);
        assert!(descriptor.modules[1].config.is_null());
    }

    #[test]
    fn empty_descriptor_is_rejected() {
        assert!(PipelineDescriptor::from_json(r#"{ "modules": [] }"#).is_err());
        assert!(PipelineDescriptor::from_json("{}").is_err());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(PipelineDescriptor::from_json("not json").is_err());
    }

    #[test]
    fn missing_file_is_a_descriptor_error() {
        let err = PipelineDescriptor::from_file(Path::new("/no/such/pipeline.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Descriptor(_)));
    }
}
