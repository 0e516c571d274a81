// SPDX-License-Identifier: GPL-3.0-only

//! Stage contract and built-in stages
//!
//! A stage is a pluggable processor with `process(payload) -> payload |
//! abort` semantics. The runtime guarantees single-threaded invocation
//! per instance and calls the optional close hook once at shutdown.

pub mod detector;
pub mod rate_limit;
pub mod rotate;

pub use detector::DetectorStage;
pub use rate_limit::RateLimitStage;
pub use rotate::RotateStage;

use crate::errors::StageError;
use crate::pipeline::payload::{Payload, StageOutcome};

/// Uniform stage interface
pub trait Stage: Send {
    /// Process one payload. `Continue` replaces the payload for
    /// downstream stages; `Abort` halts this frame. An `Err` is fatal to
    /// the current frame only.
    fn process(&mut self, payload: Payload) -> Result<StageOutcome, StageError>;

    /// Called once at shutdown, in construction order
    fn close(&mut self) {}
}
