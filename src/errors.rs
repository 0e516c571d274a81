// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the ingest agent

use std::fmt;

/// Result type alias using AgentError
pub type AgentResult<T> = Result<T, AgentError>;

/// Top-level agent error
#[derive(Debug, Clone)]
pub enum AgentError {
    /// Configuration errors (fatal at startup)
    Config(ConfigError),
    /// Frame source errors
    Source(SourceError),
    /// Document store errors
    Store(StoreError),
    /// Sink errors
    Sink(SinkError),
    /// Stage errors
    Stage(StageError),
}

/// Configuration errors: missing inputs, bad descriptors, unknown selectors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// A required startup input was not provided
    MissingInput(String),
    /// A configuration value failed validation
    Invalid(String),
    /// Pipeline descriptor could not be read or parsed
    Descriptor(String),
    /// No registered stage matches the descriptor selector
    UnknownStage { module_path: String, class_name: String },
    /// No registered predictor matches the configured kind
    UnknownPredictor(String),
}

/// Frame source errors
#[derive(Debug, Clone)]
pub enum SourceError {
    /// Every connect variant failed
    ConnectFailed(String),
    /// GStreamer pipeline construction or state change failed
    Pipeline(String),
    /// The source is not open
    NotOpen,
}

/// Document store errors
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Connection to the store failed
    Connect(String),
    /// A lookup failed
    Query(String),
    /// A referenced document does not exist
    Missing(String),
    /// An insert failed
    Insert(String),
}

/// Sink errors (artifact encoding/writing, metadata queuing)
#[derive(Debug, Clone)]
pub enum SinkError {
    /// The sink has been closed and no longer accepts submissions
    Closed,
    /// Image encoding failed
    Encode(String),
    /// Filesystem write failed
    Io(String),
}

/// Errors raised inside a stage's process call (fatal to the current frame only)
#[derive(Debug, Clone)]
pub enum StageError {
    /// The predictor failed on this frame
    Predictor(String),
    /// A sink rejected a submission
    Sink(SinkError),
    /// Anything else the stage considers a per-frame failure
    Failed(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Config(e) => write!(f, "Configuration error: {}", e),
            AgentError::Source(e) => write!(f, "Source error: {}", e),
            AgentError::Store(e) => write!(f, "Store error: {}", e),
            AgentError::Sink(e) => write!(f, "Sink error: {}", e),
            AgentError::Stage(e) => write!(f, "Stage error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingInput(name) => write!(f, "Missing required input: {}", name),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::Descriptor(msg) => write!(f, "Pipeline descriptor: {}", msg),
            ConfigError::UnknownStage {
                module_path,
                class_name,
            } => write!(f, "Unknown stage selector: {}::{}", module_path, class_name),
            ConfigError::UnknownPredictor(kind) => write!(f, "Unknown predictor kind: {}", kind),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::ConnectFailed(msg) => write!(f, "All connect variants failed: {}", msg),
            SourceError::Pipeline(msg) => write!(f, "Capture pipeline: {}", msg),
            SourceError::NotOpen => write!(f, "Source is not open"),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connect(msg) => write!(f, "Store connection failed: {}", msg),
            StoreError::Query(msg) => write!(f, "Store query failed: {}", msg),
            StoreError::Missing(what) => write!(f, "Document not found: {}", what),
            StoreError::Insert(msg) => write!(f, "Store insert failed: {}", msg),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Closed => write!(f, "Sink is closed"),
            SinkError::Encode(msg) => write!(f, "Encode failed: {}", msg),
            SinkError::Io(msg) => write!(f, "Write failed: {}", msg),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Predictor(msg) => write!(f, "Predictor failed: {}", msg),
            StageError::Sink(e) => write!(f, "Sink rejected submission: {}", e),
            StageError::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AgentError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for SourceError {}
impl std::error::Error for StoreError {}
impl std::error::Error for SinkError {}
impl std::error::Error for StageError {}

impl From<ConfigError> for AgentError {
    fn from(err: ConfigError) -> Self {
        AgentError::Config(err)
    }
}

impl From<SourceError> for AgentError {
    fn from(err: SourceError) -> Self {
        AgentError::Source(err)
    }
}

impl From<StoreError> for AgentError {
    fn from(err: StoreError) -> Self {
        AgentError::Store(err)
    }
}

impl From<SinkError> for AgentError {
    fn from(err: SinkError) -> Self {
        AgentError::Sink(err)
    }
}

impl From<StageError> for AgentError {
    fn from(err: StageError) -> Self {
        AgentError::Stage(err)
    }
}

impl From<SinkError> for StageError {
    fn from(err: SinkError) -> Self {
        StageError::Sink(err)
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err.to_string())
    }
}
