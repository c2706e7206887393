//! DrishtiIO - network camera streaming
//!
//! Streams live camera frames from a camera-bearing host to remote consumers
//! over two TCP connections: a data channel carrying length-prefixed
//! JPEG-compressed frames, and a control channel carrying length-prefixed
//! JSON command/response pairs (enumerate cameras, select format,
//! start/stop streaming).
//!
//! The server side runs as a daemon (`src/main.rs`); the client side is a
//! library type whose background thread continuously drains the network into
//! a single-slot buffer that always exposes the latest decoded frame.

pub mod calib;
pub mod camera;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod streaming;

// Re-export commonly used types
pub use calib::CalibrationParams;
pub use config::AppConfig;
pub use error::{Error, Result};
pub use frame::Frame;
pub use streaming::{StreamingClient, StreamingServer};
