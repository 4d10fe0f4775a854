//! camfuse daemon
//!
//! Brings up the configured cameras, runs the fusion sink, and serves the
//! HTTP control surface for runtime camera management.

use argh::FromArgs;
use camfuse::config::Config;
use camfuse::detect::ConfigDetectorFactory;
use camfuse::device::SyntheticDeviceManager;
use camfuse::frame::{CameraId, Placement};
use camfuse::fusion::{FusionSink, WorldState};
use camfuse::notify::LogNotifier;
use camfuse::registry::{new_pose_table, CameraRegistry};
use camfuse_daemon::{run_http_server, AppState};
use camfuse_pipeline::{InputSet, SinkDriver};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

#[derive(FromArgs)]
/// camfuse daemon - multi-camera detection fusion service
struct Args {
    /// path to the configuration file
    #[argh(option, short = 'c', default = "String::from(\"config.yaml\")")]
    config: String,

    /// port for the HTTP control surface
    #[argh(option, short = 'p', default = "2137")]
    port: u16,

    /// number of synthetic capture devices to expose
    #[argh(option, default = "4")]
    devices: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    // Load configuration
    let config = match Config::from_file(&args.config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            log::error!("Failed to load config from '{}': {}", args.config, e);
            std::process::exit(1);
        }
    };

    log::info!(
        "Loaded configuration: {} tracked identities, {} boot cameras, world {}x{}",
        config.objects.len(),
        config.cameras.len(),
        config.world.width,
        config.world.height
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Set up Ctrl+C handler
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    // Shared fusion plumbing
    let fusion_inputs = InputSet::new();
    let poses = new_pose_table();
    let world = WorldState::new();

    // Registry over the synthetic device backend; the real capture driver
    // plugs in behind the same DeviceManager seam.
    let devices = Arc::new(SyntheticDeviceManager::new(args.devices, (160, 120)));
    let detectors = Arc::new(ConfigDetectorFactory::with_stub_backends(Arc::clone(
        &config,
    )));
    let mut registry = CameraRegistry::new(
        devices,
        detectors,
        fusion_inputs.clone(),
        poses.clone(),
        config.max_probe_index,
    );

    // Bring up the cameras declared in the configuration
    for boot in &config.cameras {
        let id = CameraId(boot.index);
        let placement = Placement {
            x: boot.x,
            y: boot.y,
            angle: boot.angle,
        };
        if let Err(e) = registry.add(id, placement, boot.fps) {
            log::error!("Failed to create camera {}: {}", boot.index, e);
            continue;
        }
        if let Err(e) = registry.start(id) {
            log::error!("Failed to start camera {}: {}", boot.index, e);
        }
    }

    // Start the fusion sink on its own thread
    let fusion = FusionSink::new(
        poses,
        config.tracked_identities(),
        world.clone(),
        Some(Arc::new(LogNotifier)),
    );
    let mut fusion_driver = SinkDriver::spawn(fusion_inputs, fusion);

    let registry = Arc::new(Mutex::new(registry));
    let state = AppState {
        registry: Arc::clone(&registry),
        world,
    };

    log::info!("camfuse daemon running. Press Ctrl+C to exit.");

    // Serve HTTP until shutdown (blocks)
    if let Err(e) = run_http_server(state, args.port, shutdown_rx).await {
        log::error!("HTTP server error: {e}");
    }

    // Stop the cameras, then the fusion sink
    registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .stop_all();
    fusion_driver.stop();

    log::info!("camfuse daemon stopped.");

    Ok(())
}
