// SPDX-License-Identifier: GPL-3.0-only

//! Dynamically assembled frame-processing pipeline

pub mod descriptor;
pub mod payload;
pub mod registry;
pub mod runtime;

pub use descriptor::{PipelineDescriptor, StageDescriptor};
pub use payload::{AbortReason, Meta, MetaValue, Payload, StageOutcome, keys};
pub use registry::{StageContext, StageFactory, register_stage, resolve_stage};
pub use runtime::{PipelineRuntime, RuntimeInjections};
