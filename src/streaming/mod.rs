//! Dual-channel streaming protocol: framing, control vocabulary, server,
//! client and the latest-frame buffer.

pub mod client;
pub mod commands;
pub mod frame_buffer;
pub mod server;
pub mod wire;

pub use client::StreamingClient;
pub use commands::{ControlCommand, ControlResponse};
pub use frame_buffer::FrameBuffer;
pub use server::{SessionState, StreamingServer};
