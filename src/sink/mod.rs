// SPDX-License-Identifier: GPL-3.0-only

//! Asynchronous persistence sinks
//!
//! Both sinks own their background workers and queues; the pipeline
//! never blocks on disk or the document store.

pub mod artifact;
pub mod metadata;

pub use artifact::{ArtifactKind, ArtifactSink, ArtifactSinkConfig};
pub use metadata::{DetectionEvent, MetadataSink, MetadataSinkConfig};
