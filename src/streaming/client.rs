//! Streaming client: dual-channel connection, synchronous control calls and
//! the background frame receive loop.
//!
//! # Connection lifecycle
//!
//! ```text
//! 1. connect() opens data + control sockets with a bounded timeout
//! 2. Both sockets switch to fully blocking I/O for steady state
//! 3. A background thread drains the data channel into the frame buffer
//! 4. Control calls run synchronously on the caller's thread
//! 5. disconnect() closes both sockets, raises the exit flag and joins
//! ```
//!
//! The receive loop never reconnects: any read or decode error raises the
//! exit flag and stops the thread, and the whole client must be reconnected
//! by the caller. `disconnect` is idempotent and also runs on drop.
//!
//! # Frame access
//!
//! Two modes, both backed by the same single-slot [`FrameBuffer`]:
//!
//! - [`read`](StreamingClient::read) blocks until a frame is available and
//!   returns a private copy, leaving the dirty flag set so the latest frame
//!   stays retrievable (the same frame may be returned twice if the consumer
//!   outpaces the producer).
//! - [`set_handler`](StreamingClient::set_handler) registers a callback that
//!   a dedicated thread invokes exactly once per newly arrived frame. The
//!   dispatch thread is single, so the callback never runs concurrently
//!   with itself.
//!
//! If calibration parameters are loaded and rectification is enabled,
//! [`read`](StreamingClient::read) undistorts the copy before returning it.

use crate::calib::CalibrationParams;
use crate::camera::{CameraFormat, FormatFilter};
use crate::codec;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::streaming::commands::{ControlCommand, ControlResponse};
use crate::streaming::frame_buffer::FrameBuffer;
use crate::streaming::wire;
use std::collections::BTreeMap;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bounded timeout for the initial connection handshake; steady-state I/O
/// is unbounded.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

type Handler = Box<dyn FnMut(Frame) + Send>;

/// Client side of the streaming protocol.
///
/// Control calls take `&mut self`, which serializes them per client: a
/// response is always received before the next command goes out.
pub struct StreamingClient {
    ctrl: TcpStream,
    /// Shutdown handle for the data socket owned by the receive thread;
    /// used only to unblock that thread at disconnect.
    data_shutdown: TcpStream,
    exit: Arc<AtomicBool>,
    buffer: Arc<FrameBuffer>,
    recv_thread: Option<JoinHandle<()>>,
    handler_thread: Option<JoinHandle<()>>,
    handler_slot: Arc<Mutex<Option<Handler>>>,
    calib: Option<CalibrationParams>,
    rectify: bool,
    active_resolution: Option<(u32, u32)>,
}

impl StreamingClient {
    /// Connect both channels and start the receive loop.
    ///
    /// Fails with [`Error::Connection`] if either channel cannot be opened
    /// within the handshake timeout; no retry is attempted and no threads
    /// are left behind on failure.
    pub fn connect(data_addr: &str, ctrl_addr: &str) -> Result<Self> {
        let data_stream = open_channel(data_addr, "data")?;
        let ctrl_stream = open_channel(ctrl_addr, "control")?;

        let exit = Arc::new(AtomicBool::new(false));
        let buffer = Arc::new(FrameBuffer::new());
        let data_shutdown = data_stream.try_clone()?;

        let recv_thread = {
            let buffer = Arc::clone(&buffer);
            let exit = Arc::clone(&exit);
            thread::Builder::new()
                .name("frame-recv".to_string())
                .spawn(move || recv_loop(data_stream, buffer, exit))
                .map_err(|e| Error::Other(format!("Failed to spawn receive thread: {}", e)))?
        };

        log::info!(
            "connected (data {}, control {})",
            data_addr,
            ctrl_addr
        );

        Ok(Self {
            ctrl: ctrl_stream,
            data_shutdown,
            exit,
            buffer,
            recv_thread: Some(recv_thread),
            handler_thread: None,
            handler_slot: Arc::new(Mutex::new(None)),
            calib: None,
            rectify: true,
            active_resolution: None,
        })
    }

    /// Enumerate cameras on the server, name → index.
    pub fn get_cameras(&mut self) -> Result<BTreeMap<String, u32>> {
        let response = self.call(&ControlCommand::GetCameras)?;
        Ok(response.cameras.unwrap_or_default())
    }

    /// Select the camera and resolution for subsequent captures.
    ///
    /// Records the active resolution on success; format-bound calibration
    /// loads validate against it.
    pub fn set_camera(&mut self, cam_idx: u32, width: u32, height: u32) -> Result<bool> {
        let command = ControlCommand::SetCamera {
            cam_idx,
            width,
            height,
        };
        let accepted = self.call(&command)?.result;
        if accepted {
            self.active_resolution = Some((width, height));
        }
        Ok(accepted)
    }

    /// List a camera's formats as the catalog's format strings.
    pub fn get_camera_formats(
        &mut self,
        cam_name: &str,
        filter: &FormatFilter,
    ) -> Result<Vec<String>> {
        let command = ControlCommand::GetCameraFormats {
            cam_name: cam_name.to_string(),
            min_width: filter.min_width,
            min_fps: filter.min_fps,
            min_height: filter.min_height,
            max_height: filter.max_height,
        };
        let response = self.call(&command)?;
        Ok(response.formats.unwrap_or_default())
    }

    /// Select a camera by format string (`"1280x720 30fps Jpeg"`),
    /// extracting the resolution and issuing `set_camera`.
    pub fn set_format(&mut self, cam_idx: u32, format_str: &str) -> Result<bool> {
        let (width, height) = CameraFormat::parse_resolution(format_str).ok_or_else(|| {
            Error::InvalidParameter(format!("format string without resolution: {:?}", format_str))
        })?;
        self.set_camera(cam_idx, width, height)
    }

    /// Ask the server to start streaming frames on the data channel.
    pub fn start_capture(&mut self) -> Result<bool> {
        Ok(self.call(&ControlCommand::Capture)?.result)
    }

    /// Ask the server to stop streaming, leaving the session idle.
    pub fn stop_capture(&mut self) -> Result<bool> {
        Ok(self.call(&ControlCommand::StopCapture)?.result)
    }

    /// Load lens calibration from a file.
    ///
    /// When the file declares a resolution and a camera has been selected,
    /// the two must match; the mismatch is caught here at load time, never
    /// at apply time.
    pub fn load_calibration<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let params = CalibrationParams::load(path)?;
        if let (Some(declared), Some(active)) = (params.resolution(), self.active_resolution) {
            if declared != active {
                return Err(Error::InvalidParameter(format!(
                    "calibration resolution {}x{} does not match active format {}x{}",
                    declared.0, declared.1, active.0, active.1
                )));
            }
        }
        self.calib = Some(params);
        Ok(())
    }

    /// Load the per-format calibration file `"<cam>@<w>x<h>.json"` from a
    /// directory, bound to the given format string.
    pub fn load_calibration_for_format<P: AsRef<Path>>(
        &mut self,
        dir: P,
        cam_name: &str,
        format_str: &str,
    ) -> Result<()> {
        self.calib = Some(CalibrationParams::load_for_format(dir, cam_name, format_str)?);
        Ok(())
    }

    /// Enable or disable undistortion of frames returned by [`read`].
    ///
    /// On by default; has no effect until calibration is loaded.
    ///
    /// [`read`]: StreamingClient::read
    pub fn set_rectification(&mut self, enabled: bool) {
        self.rectify = enabled;
    }

    /// Intrinsic matrix of the loaded calibration, if any.
    pub fn intrinsic_matrix(&self) -> Option<&[[f64; 3]; 3]> {
        self.calib.as_ref().map(CalibrationParams::matrix)
    }

    /// Block until a frame is available, returning a private copy.
    ///
    /// Undistorts the copy first when calibration is loaded and
    /// rectification is enabled. Returns `None` once the client is torn
    /// down (disconnect, or the receive loop died on an error).
    pub fn read(&self) -> Option<Frame> {
        let frame = self.buffer.wait_new(&self.exit)?;
        Some(self.postprocess(frame))
    }

    /// Copy of the most recent frame without blocking or postprocessing.
    /// `None` until the first frame arrives.
    pub fn latest(&self) -> Option<Frame> {
        self.buffer.latest()
    }

    /// Register a callback invoked exactly once per newly arrived frame.
    ///
    /// The first registration spawns the dispatch thread; later calls just
    /// replace the callback. Frames that arrive while no handler is
    /// registered are skipped.
    pub fn set_handler<F>(&mut self, handler: F) -> Result<()>
    where
        F: FnMut(Frame) + Send + 'static,
    {
        *self
            .handler_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(handler));

        if self.handler_thread.is_none() {
            let buffer = Arc::clone(&self.buffer);
            let exit = Arc::clone(&self.exit);
            let slot = Arc::clone(&self.handler_slot);
            let handle = thread::Builder::new()
                .name("frame-handler".to_string())
                .spawn(move || handler_loop(buffer, exit, slot))
                .map_err(|e| Error::Other(format!("Failed to spawn handler thread: {}", e)))?;
            self.handler_thread = Some(handle);
        }
        Ok(())
    }

    /// Close both sockets, stop the background threads and join them.
    ///
    /// Idempotent; also runs on drop. After this the client cannot be
    /// reused, a fresh [`connect`](StreamingClient::connect) is required.
    pub fn disconnect(&mut self) {
        self.exit.store(true, Ordering::Relaxed);
        // Closing unblocks any read the receive thread is parked in
        let _ = self.data_shutdown.shutdown(Shutdown::Both);
        let _ = self.ctrl.shutdown(Shutdown::Both);
        self.buffer.notify_all();
        if let Some(handle) = self.recv_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.handler_thread.take() {
            let _ = handle.join();
        }
    }

    /// One synchronous request/response exchange on the control channel.
    fn call(&mut self, command: &ControlCommand) -> Result<ControlResponse> {
        wire::write_json(&mut self.ctrl, command)?;
        wire::read_json(&mut self.ctrl)
    }

    fn postprocess(&self, frame: Frame) -> Frame {
        if self.rectify {
            if let Some(calib) = &self.calib {
                return calib.undistort(&frame);
            }
        }
        frame
    }
}

impl Drop for StreamingClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn open_channel(addr: &str, channel: &str) -> Result<TcpStream> {
    let sock_addr: SocketAddr = addr
        .to_socket_addrs()
        .map_err(|e| Error::Connection(format!("{} channel {}: {}", channel, addr, e)))?
        .next()
        .ok_or_else(|| Error::Connection(format!("{} channel {}: no address", channel, addr)))?;
    let stream = TcpStream::connect_timeout(&sock_addr, CONNECT_TIMEOUT)
        .map_err(|e| Error::Connection(format!("{} channel {}: {}", channel, addr, e)))?;
    // Steady state is fully blocking
    stream
        .set_read_timeout(None)
        .map_err(|e| Error::Connection(format!("{} channel {}: {}", channel, addr, e)))?;
    Ok(stream)
}

/// Background loop draining the data channel into the frame buffer.
///
/// A frame becomes visible to consumers only after its full byte length has
/// been read and decoded; errors stop the loop for good.
fn recv_loop(mut stream: TcpStream, buffer: Arc<FrameBuffer>, exit: Arc<AtomicBool>) {
    log::debug!("frame receive loop started");
    let mut received = 0u64;
    while !exit.load(Ordering::Relaxed) {
        let payload = match wire::read_packet(&mut stream) {
            Ok(payload) => payload,
            Err(Error::ConnectionClosed) => {
                log::info!("server closed the data channel");
                break;
            }
            Err(e) => {
                if !exit.load(Ordering::Relaxed) {
                    log::error!("data channel read failed: {}", e);
                }
                break;
            }
        };
        match codec::decode(&payload) {
            Ok(frame) => {
                received += 1;
                log::trace!("received frame {} ({}x{})", received, frame.width(), frame.height());
                buffer.publish(frame);
            }
            Err(e) => {
                log::error!("stopping stream after undecodable frame: {}", e);
                break;
            }
        }
    }
    // Either we were told to exit or the stream died; wake any blocked
    // readers so they can observe it.
    exit.store(true, Ordering::Relaxed);
    buffer.notify_all();
    log::debug!("frame receive loop exited after {} frames", received);
}

/// Dispatch loop for the push callback: one invocation per new frame, dirty
/// flag cleared afterwards, skipped entirely while no handler is registered.
fn handler_loop(
    buffer: Arc<FrameBuffer>,
    exit: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<Handler>>>,
) {
    log::debug!("frame handler loop started");
    while !exit.load(Ordering::Relaxed) {
        let Some(frame) = buffer.wait_take(&exit) else {
            break;
        };
        let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handler) = slot.as_mut() {
            handler(frame);
        }
    }
    log::debug!("frame handler loop exited");
}
