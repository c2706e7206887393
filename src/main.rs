//! DrishtiIO - network camera streaming daemon
//!
//! Serves camera frames on the data channel (default port 30000) and JSON
//! control commands on the control channel (default port 30001). One live
//! client session at a time.

use drishti_io::camera::MockCatalog;
use drishti_io::config::AppConfig;
use drishti_io::error::Result;
use drishti_io::streaming::StreamingServer;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/drishti-io.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `drishti-io <path>` (positional)
/// - `drishti-io --config <path>` (flag-based)
/// - `drishti-io -c <path>` (short flag)
///
/// `None` means no path was given and the default applies.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

fn load_config() -> Result<AppConfig> {
    match parse_config_path() {
        Some(path) => {
            log::info!("Using config: {}", path);
            AppConfig::from_file(&path)
        }
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            log::info!("Using config: {}", DEFAULT_CONFIG_PATH);
            AppConfig::from_file(DEFAULT_CONFIG_PATH)
        }
        None => {
            log::info!("No config file, using localhost defaults");
            Ok(AppConfig::default())
        }
    }
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("DrishtiIO v0.1.0 starting...");

    let config = load_config()?;
    log::info!(
        "Cameras: {:?}, data on {}, control on {}",
        config.camera.cameras,
        config.network.data_address,
        config.network.ctrl_address
    );

    let catalog = Arc::new(
        MockCatalog::new(config.camera.cameras.clone())
            .with_frame_interval(Duration::from_millis(config.camera.frame_interval_ms)),
    );

    let mut server = StreamingServer::start(&config, catalog)?;

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| drishti_io::Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!("DrishtiIO running. Press Ctrl-C to stop.");

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("Shutting down...");
    server.stop();

    log::info!("DrishtiIO stopped");
    Ok(())
}
