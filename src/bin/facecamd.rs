//! facecamd - live camera feed with face overlays and heuristic analysis
//!
//! This daemon:
//! 1. Loads the face model (fails fast if none is found)
//! 2. Creates the camera session (inactive until toggled on)
//! 3. Serves the HTTP API: video feed, snapshots, analysis, sharing
//! 4. Releases the camera on Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use facecam::{
    api::{ApiConfig, ApiServer, AppState},
    config::FacecamConfig,
    publish::Publisher,
    CameraSession, FaceDetector, Pipeline, SeetaDetector, SnapshotStore, StubDetector,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum DetectorKind {
    /// rustface model from the configured search paths
    Seeta,
    /// never reports a face; for running without a model
    Stub,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file (overrides FACECAM_CONFIG)
    #[arg(long, env = "FACECAM_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:5000
    #[arg(long)]
    addr: Option<String>,

    /// Camera device path or stub://<name>
    #[arg(long)]
    device: Option<String>,

    #[arg(long, value_enum, default_value_t = DetectorKind::Seeta)]
    detector: DetectorKind,

    /// Activate the camera at startup instead of waiting for /toggle_camera
    #[arg(long)]
    start_active: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = FacecamConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.api_addr = addr;
    }
    if let Some(device) = args.device {
        config.camera.device = device;
    }
    config.validate()?;

    let detector: Arc<dyn FaceDetector> = match args.detector {
        DetectorKind::Seeta => Arc::new(
            SeetaDetector::load(&config.model_paths).context("face detector startup")?,
        ),
        DetectorKind::Stub => {
            log::warn!("running with the stub detector; no faces will be reported");
            Arc::new(StubDetector::empty())
        }
    };
    log::info!("face detector: {}", detector.name());

    let session = Arc::new(CameraSession::new(config.camera.clone()));
    if args.start_active {
        session.toggle().context("activate camera")?;
    }
    let pipeline = Pipeline::new(session.clone(), detector, config.pipeline());
    let store = SnapshotStore::open(&config.upload_dir)?;
    log::info!("snapshots stored in {}", store.dir().display());

    let state = AppState {
        pipeline,
        store,
        publisher: publisher(&config)?,
    };
    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        ..ApiConfig::default()
    };
    let api_handle = ApiServer::new(api_config, state).spawn()?;
    log::info!(
        "facecamd running. camera {} ({}x{} @ {} fps), api on {}",
        config.camera.device,
        config.camera.width,
        config.camera.height,
        config.camera.target_fps,
        api_handle.addr
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))?;

    log::info!("facecamd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, releasing camera...");
    // Streams end on their next pull once the session is inactive.
    session.deactivate()?;
    api_handle.stop()?;

    Ok(())
}

#[cfg(feature = "publish")]
fn publisher(config: &FacecamConfig) -> Result<Box<dyn Publisher>> {
    Ok(Box::new(facecam::publish::GraphPublisher::new(
        config.social.clone(),
    )?))
}

#[cfg(not(feature = "publish"))]
fn publisher(_config: &FacecamConfig) -> Result<Box<dyn Publisher>> {
    log::info!("built without the publish feature; /share is disabled");
    Ok(Box::new(facecam::publish::DisabledPublisher))
}
