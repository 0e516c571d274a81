// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline runtime
//!
//! Late-binds an ordered stage list from the descriptor and drives each
//! captured frame through it. Stage failures are fatal to the current
//! frame only; the loop exits on the shutdown signal or when the source
//! stays closed.

use crate::constants::timing;
use crate::errors::ConfigError;
use crate::pipeline::descriptor::PipelineDescriptor;
use crate::pipeline::payload::{Payload, StageOutcome};
use crate::pipeline::registry::{StageContext, resolve_stage};
use crate::shutdown::ShutdownFlag;
use crate::source::{Frame, FrameSource};
use crate::stages::Stage;
use crate::store::DetectionWriter;
use crate::zones::Zone;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Runtime dependencies injected into every stage's construction
#[derive(Clone)]
pub struct RuntimeInjections {
    pub source: Arc<FrameSource>,
    pub device_name: String,
    pub zones: Vec<Zone>,
    pub detections: Arc<dyn DetectionWriter>,
    pub shutdown: ShutdownFlag,
    /// Process every (n+1)-th captured frame; 0 processes all
    pub process_skip_frame: u32,
}

struct BuiltStage {
    name: String,
    stage: Box<dyn Stage>,
}

/// Owns the ordered stage list and the iteration loop
pub struct PipelineRuntime {
    stages: Vec<BuiltStage>,
    source: Arc<FrameSource>,
    shutdown: ShutdownFlag,
    process_skip: u64,
    last_sequence: Option<u64>,
    frame_errors: u64,
    closed: bool,
}

impl PipelineRuntime {
    /// Resolve and construct every stage up front. Any unknown selector
    /// or factory failure aborts the build before `run()` can start.
    pub fn build(
        descriptor: &PipelineDescriptor,
        injections: RuntimeInjections,
    ) -> Result<Self, ConfigError> {
        let mut stages = Vec::with_capacity(descriptor.modules.len());
        for entry in &descriptor.modules {
            info!(
                stage = %entry.name,
                selector = %format!("{}::{}", entry.module_path, entry.class_name),
                "Loading stage"
            );
            let factory = resolve_stage(&entry.module_path, &entry.class_name)?;
            let context = StageContext {
                name: entry.name.clone(),
                config: entry.config.clone(),
                device_name: injections.device_name.clone(),
                source: Arc::clone(&injections.source),
                zones: injections.zones.clone(),
                detections: Arc::clone(&injections.detections),
                shutdown: injections.shutdown.clone(),
            };
            let stage = factory(&context)?;
            stages.push(BuiltStage {
                name: entry.name.clone(),
                stage,
            });
        }

        Ok(Self {
            stages,
            source: injections.source,
            shutdown: injections.shutdown,
            process_skip: injections.process_skip_frame as u64,
            last_sequence: None,
            frame_errors: 0,
            closed: false,
        })
    }

    /// Capture loop: read the newest frame, thread it through the
    /// stages, repeat until shutdown.
    pub fn run(&mut self) {
        info!(stages = self.stages.len(), "Pipeline started");

        while !self.shutdown.is_set() && self.source.is_open() {
            let Some(frame) = self.source.read() else {
                thread::sleep(timing::EMPTY_READ_SLEEP);
                continue;
            };

            // Newest-wins buffer: the same frame stays readable until the
            // reader overwrites it, so skip sequence numbers already seen.
            if self.last_sequence == Some(frame.number) {
                thread::sleep(timing::NEXT_FRAME_POLL);
                continue;
            }
            self.last_sequence = Some(frame.number);

            if self.process_skip > 0 && frame.number % (self.process_skip + 1) != 0 {
                continue;
            }

            self.process_frame(frame);
        }

        info!(errors = self.frame_errors, "Pipeline loop exiting");
    }

    /// Drive one frame through every stage in descriptor order.
    ///
    /// Returns true when every stage ran to completion.
    pub fn process_frame(&mut self, frame: Frame) -> bool {
        let frame_number = frame.number;
        let mut payload = Payload::new(frame);

        for built in &mut self.stages {
            match built.stage.process(payload) {
                Ok(StageOutcome::Continue(next)) => payload = next,
                Ok(StageOutcome::Abort(reason)) => {
                    debug!(stage = %built.name, frame = frame_number, %reason, "Frame aborted");
                    return false;
                }
                Err(e) => {
                    self.frame_errors += 1;
                    warn!(
                        stage = %built.name,
                        frame = frame_number,
                        error = %e,
                        errors = self.frame_errors,
                        "Stage failed, continuing with next frame"
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Invoke each stage's close hook in construction order. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for built in &mut self.stages {
            debug!(stage = %built.name, "Closing stage");
            built.stage.close();
        }
        info!("Pipeline closed");
    }
}

impl Drop for PipelineRuntime {
    fn drop(&mut self) {
        self.close();
    }
}
