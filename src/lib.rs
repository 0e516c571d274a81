// SPDX-License-Identifier: GPL-3.0-only

//! Per-camera video analytics ingest agent
//!
//! A single-process, multi-threaded engine that keeps a low-latency,
//! self-healing connection to one video source, drives a dynamically
//! assembled stage pipeline over each captured frame, persists artifacts
//! and detection records asynchronously, and assesses stream health in
//! parallel.

pub mod config;
pub mod constants;
pub mod errors;
pub mod health;
pub mod pipeline;
pub mod plot;
pub mod predict;
pub mod shutdown;
pub mod sink;
pub mod source;
pub mod stages;
pub mod store;
pub mod zones;
