// SPDX-License-Identifier: GPL-3.0-only

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use vigil::config::{AgentConfig, AgentOverrides, parse_codec_hint};
use vigil::constants::health as health_consts;
use vigil::errors::AgentResult;
use vigil::health::{HealthMonitor, HealthSink, HealthThresholds};
use vigil::pipeline::{PipelineDescriptor, PipelineRuntime, RuntimeInjections};
use vigil::shutdown::{ShutdownFlag, install_signal_handler};
use vigil::source::{FrameSource, Rotation, SourceConfig};
use vigil::store::{DetectionWriter, DocumentStore};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Per-camera video analytics ingest agent")]
#[command(version)]
struct Cli {
    /// Camera id keying the source configuration (default: $CAMERA_ID)
    #[arg(long)]
    camera_id: Option<String>,

    /// Service id keying the pipeline descriptor (default: $SERVICE_ID)
    #[arg(long)]
    service_id: Option<String>,

    /// Document-store connection string (default: $MONGODB_URI)
    #[arg(long)]
    store_uri: Option<String>,

    /// Stream codec: auto, h264, or h265
    #[arg(long, default_value = "auto")]
    codec: String,
}

fn main() -> ExitCode {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=vigil=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> AgentResult<()> {
    let config = AgentConfig::resolve(AgentOverrides {
        camera_id: cli.camera_id,
        service_id: cli.service_id,
        store_uri: cli.store_uri,
    })?;

    let store = Arc::new(DocumentStore::connect(&config.store_uri)?);
    let camera = store.camera(&config.camera_id)?;
    if !camera.active {
        warn!(device = %camera.device_name, "Camera is marked inactive, nothing to do");
        return Ok(());
    }
    let service = store.service(&config.service_id)?;
    let zones = store.zones(&camera.zones)?;
    let descriptor =
        PipelineDescriptor::from_file(std::path::Path::new(&service.pipeline_path))
            .map_err(vigil::errors::AgentError::from)?;
    info!(
        device = %camera.device_name,
        service = %service.service_name,
        stages = descriptor.modules.len(),
        zones = zones.len(),
        "Configuration loaded"
    );

    let shutdown = ShutdownFlag::new();
    if let Err(e) = install_signal_handler(shutdown.clone()) {
        warn!(error = %e, "Could not install signal handlers");
    }

    let mut source_config = SourceConfig::new(&camera.camera_address, &camera.device_name);
    source_config.rotation = Rotation::from_degrees(camera.rotation);
    let source = Arc::new(FrameSource::new(source_config));

    source.connect(parse_codec_hint(Some(&cli.codec)))?;

    // Build the pipeline before the reader starts: an unknown selector
    // must fail without leaving any thread behind.
    let injections = RuntimeInjections {
        source: Arc::clone(&source),
        device_name: camera.device_name.clone(),
        zones,
        detections: Arc::clone(&store) as Arc<dyn DetectionWriter>,
        shutdown: shutdown.clone(),
        process_skip_frame: camera.process_skip_frame,
    };
    let mut runtime = match PipelineRuntime::build(&descriptor, injections) {
        Ok(runtime) => runtime,
        Err(e) => {
            source.close();
            return Err(e.into());
        }
    };

    source.start_reader(&shutdown);
    let mut health = HealthMonitor::start(
        Arc::clone(&source),
        health_consts::INTERVAL,
        HealthThresholds::default(),
        Some(Arc::clone(&store) as Arc<dyn HealthSink>),
        shutdown.clone(),
    );

    runtime.run();

    info!("Cleaning up");
    runtime.close();
    health.stop();
    source.close();
    info!("Clean shutdown complete");
    Ok(())
}
