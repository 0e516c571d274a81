// SPDX-License-Identifier: GPL-3.0-only

//! Startup configuration
//!
//! The agent is keyed by three inputs: the camera id, the service id,
//! and the document-store URI. Command-line flags override the
//! environment; a missing input is fatal before anything starts.

use crate::errors::ConfigError;
use crate::source::{Codec, CodecHint};

pub const ENV_CAMERA_ID: &str = "CAMERA_ID";
pub const ENV_SERVICE_ID: &str = "SERVICE_ID";
pub const ENV_STORE_URI: &str = "MONGODB_URI";

/// Resolved startup inputs
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub camera_id: String,
    pub service_id: String,
    pub store_uri: String,
}

/// Command-line overrides for the environment inputs
#[derive(Debug, Clone, Default)]
pub struct AgentOverrides {
    pub camera_id: Option<String>,
    pub service_id: Option<String>,
    pub store_uri: Option<String>,
}

impl AgentConfig {
    /// Resolve inputs from overrides, falling back to the environment
    pub fn resolve(overrides: AgentOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |name| std::env::var(name).ok())
    }

    pub fn resolve_with(
        overrides: AgentOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let pick = |value: Option<String>, env_name: &str| -> Result<String, ConfigError> {
            value
                .or_else(|| lookup(env_name))
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingInput(env_name.to_string()))
        };

        Ok(Self {
            camera_id: pick(overrides.camera_id, ENV_CAMERA_ID)?,
            service_id: pick(overrides.service_id, ENV_SERVICE_ID)?,
            store_uri: pick(overrides.store_uri, ENV_STORE_URI)?,
        })
    }
}

/// Map a `--codec` argument onto the connect hint; anything unknown
/// falls back to auto-detection.
pub fn parse_codec_hint(arg: Option<&str>) -> CodecHint {
    match arg.map(|s| s.to_lowercase()).as_deref() {
        Some("h264") => CodecHint::Fixed(Codec::H264),
        Some("h265") | Some("hevc") => CodecHint::Fixed(Codec::H265),
        _ => CodecHint::Auto,
    }
}
