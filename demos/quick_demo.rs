//! Quick streaming test against a running DrishtiIO daemon.
//!
//! Sequence:
//! 1. Connect both channels
//! 2. Enumerate cameras and formats
//! 3. Select the first camera at its first advertised format
//! 4. Stream 30 frames and report the effective rate
//! 5. Stop capture and disconnect
//!
//! Start the daemon first, then:
//! ```sh
//! RUST_LOG=info cargo run --example quick_demo
//! ```

use drishti_io::camera::{CameraFormat, FormatFilter};
use drishti_io::StreamingClient;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    log::info!("=== DrishtiIO Streaming Test ===");

    // === 1. Connect ===
    log::info!("1. Connecting to localhost...");
    let mut client = StreamingClient::connect("127.0.0.1:30000", "127.0.0.1:30001")?;
    log::info!("   ✓ Both channels connected");

    // === 2. Enumerate ===
    let cameras = client.get_cameras()?;
    if cameras.is_empty() {
        log::error!("no camera available");
        return Ok(());
    }
    log::info!("2. Cameras: {:?}", cameras);
    let (name, index) = cameras
        .iter()
        .next()
        .map(|(n, i)| (n.clone(), *i))
        .expect("checked non-empty");

    let formats = client.get_camera_formats(&name, &FormatFilter::default())?;
    log::info!("   Formats of {}: {:?}", name, formats);

    // === 3. Select ===
    let format = formats.first().cloned().unwrap_or_else(|| "640x480".to_string());
    let (width, height) = CameraFormat::parse_resolution(&format).unwrap_or((640, 480));
    log::info!("3. Selecting {} at {}x{}", name, width, height);
    if !client.set_camera(index, width, height)? {
        log::error!("server rejected camera selection");
        return Ok(());
    }

    // === 4. Stream ===
    log::info!("4. Starting capture...");
    client.start_capture()?;
    let start = Instant::now();
    let mut frames = 0u32;
    while frames < 30 {
        match client.read() {
            Some(frame) => {
                frames += 1;
                if frames == 1 {
                    log::info!(
                        "   First frame: {}x{} ({} bytes raw)",
                        frame.width(),
                        frame.height(),
                        frame.data().len()
                    );
                }
            }
            None => {
                log::error!("stream ended early");
                break;
            }
        }
    }
    let elapsed = start.elapsed();
    log::info!(
        "   ✓ {} frames in {:.2}s ({:.1} fps)",
        frames,
        elapsed.as_secs_f64(),
        frames as f64 / elapsed.as_secs_f64().max(1e-6)
    );

    // === 5. Teardown ===
    log::info!("5. Stopping capture...");
    client.stop_capture()?;
    client.disconnect();
    log::info!("   ✓ Disconnected cleanly");

    Ok(())
}
