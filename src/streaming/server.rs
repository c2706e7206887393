//! Streaming server: dual accept loops and the per-session state machine.
//!
//! The server owns two independent listening sockets. The **data channel**
//! carries length-prefixed JPEG frames one way, server to client; the
//! **control channel** carries JSON command/response pairs. Each channel has
//! its own accept loop on a named thread.
//!
//! # Session state machine
//!
//! Each accepted data connection moves through three states, driven entirely
//! by the paired control connection and by I/O failure:
//!
//! ```text
//!            capture                write failure, control
//!           ┌────────►┐             error or disconnect
//!   idle ───┘          running ───────────► closed
//!     ▲ ◄──┐          ┌──┘                    │
//!     │     stop_capture                      │ socket closed,
//!     │                                       ▼ server re-enters accept
//!     └───────────── fresh data connection ───┘
//! ```
//!
//! `closed` is terminal for a connection; only accepting a fresh data
//! connection produces a new `idle` session. Control-channel teardown always
//! drags the data state to `closed` as well.
//!
//! # Concurrency
//!
//! Only one live data/control session is supported at a time; a second
//! client waits in the listen backlog until the first disconnects. Accept
//! loops use non-blocking accept with a short sleep so the shutdown flag is
//! observed; the send loop re-checks the shutdown flag and session state on
//! every iteration, which are its only cancellation points (an in-flight
//! write completes or fails before the state is re-checked).
//!
//! Failures never escape their loop: a data-channel write failure or a
//! control-channel read failure closes that session and the server returns
//! to accepting, it does not crash.

use crate::camera::DeviceCatalog;
use crate::codec;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::streaming::commands::{ControlCommand, ControlResponse};
use crate::streaming::wire;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Sleep between non-blocking accept attempts
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Sleep while a data session sits idle waiting for `capture`
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Control-channel read timeout, so the dispatch loop can observe shutdown
const CTRL_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Per-connection data channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, not streaming
    Idle,
    /// Actively sending frames
    Running,
    /// Torn down, not reusable
    Closed,
}

/// Camera selection established by `set_camera`
#[derive(Debug, Clone, Copy)]
struct Selection {
    cam_idx: u32,
    width: u32,
    height: u32,
}

/// State shared between the data and control threads
struct Session {
    state: Mutex<SessionState>,
    selection: Mutex<Option<Selection>>,
    /// Bumped for every accepted data connection. A control connection
    /// records the epoch it served so its teardown closes only the data
    /// session it was actually paired with, not a successor accepted in
    /// the meantime.
    epoch: AtomicU64,
}

impl Session {
    fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Closed),
            selection: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// A fresh data connection was accepted: new epoch, state `Idle`
    fn begin(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(SessionState::Idle);
        epoch
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Close the session only if `epoch` is still the live data connection
    fn close_if_current(&self, epoch: u64) {
        if self.epoch() == epoch {
            self.set_state(SessionState::Closed);
        }
    }

    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            log::debug!("session state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Transition only when the current state matches `from`
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == from {
            log::debug!("session state {:?} -> {:?}", from, to);
            *state = to;
            true
        } else {
            false
        }
    }

    fn selection(&self) -> Option<Selection> {
        *self.selection.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn select(&self, selection: Selection) {
        *self.selection.lock().unwrap_or_else(|e| e.into_inner()) = Some(selection);
    }
}

/// Camera streaming server.
///
/// Binds both listeners up front (so bind failures surface to the caller)
/// and runs the two accept loops on background threads until [`stop`] is
/// called.
///
/// [`stop`]: StreamingServer::stop
pub struct StreamingServer {
    running: Arc<AtomicBool>,
    data_addr: SocketAddr,
    ctrl_addr: SocketAddr,
    /// Shutdown handle for the currently served data connection; a send
    /// loop blocked mid-write only observes the stop flag once its socket
    /// dies.
    active_data: Arc<Mutex<Option<TcpStream>>>,
    data_thread: Option<JoinHandle<()>>,
    ctrl_thread: Option<JoinHandle<()>>,
}

impl StreamingServer {
    /// Bind both channels and start the accept loops.
    pub fn start(config: &AppConfig, catalog: Arc<dyn DeviceCatalog>) -> Result<Self> {
        let data_listener = bind(&config.network.data_address, "data")?;
        let ctrl_listener = bind(&config.network.ctrl_address, "control")?;
        let data_addr = data_listener.local_addr()?;
        let ctrl_addr = ctrl_listener.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let session = Arc::new(Session::new());
        let active_data = Arc::new(Mutex::new(None));

        let data_thread = {
            let running = Arc::clone(&running);
            let session = Arc::clone(&session);
            let catalog = Arc::clone(&catalog);
            let active_data = Arc::clone(&active_data);
            thread::Builder::new()
                .name("data-stream".to_string())
                .spawn(move || data_loop(data_listener, catalog, session, active_data, running))
                .map_err(|e| Error::Other(format!("Failed to spawn data thread: {}", e)))?
        };

        let ctrl_thread = {
            let running = Arc::clone(&running);
            let session = Arc::clone(&session);
            thread::Builder::new()
                .name("ctrl-dispatch".to_string())
                .spawn(move || ctrl_loop(ctrl_listener, catalog, session, running))
                .map_err(|e| Error::Other(format!("Failed to spawn control thread: {}", e)))?
        };

        log::info!(
            "streaming server listening (data {}, control {})",
            data_addr,
            ctrl_addr
        );

        Ok(Self {
            running,
            data_addr,
            ctrl_addr,
            active_data,
            data_thread: Some(data_thread),
            ctrl_thread: Some(ctrl_thread),
        })
    }

    /// Actual data channel bind address (resolves port 0 in tests)
    pub fn data_addr(&self) -> SocketAddr {
        self.data_addr
    }

    /// Actual control channel bind address
    pub fn ctrl_addr(&self) -> SocketAddr {
        self.ctrl_addr
    }

    /// Signal both loops to exit and join them. Idempotent.
    ///
    /// Closes the live data socket first, unblocking a send loop stuck in a
    /// write to a client that stopped reading.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(stream) = self
            .active_data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.data_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.ctrl_thread.take() {
            let _ = handle.join();
        }
        log::info!("streaming server stopped");
    }
}

impl Drop for StreamingServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(address: &str, channel: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(address)
        .map_err(|e| Error::Connection(format!("{} channel bind {}: {}", channel, address, e)))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Accept loop for the data channel. One client at a time.
fn data_loop(
    listener: TcpListener,
    catalog: Arc<dyn DeviceCatalog>,
    session: Arc<Session>,
    active: Arc<Mutex<Option<TcpStream>>>,
    running: Arc<AtomicBool>,
) {
    log::debug!("data accept loop started");
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!("data client connected: {}", addr);
                if let Err(e) = stream.set_nonblocking(false) {
                    log::error!("failed to switch data socket to blocking: {}", e);
                    continue;
                }
                *active.lock().unwrap_or_else(|e| e.into_inner()) = stream.try_clone().ok();
                session.begin();
                serve_data_connection(stream, &catalog, &session, &running);
                *active.lock().unwrap_or_else(|e| e.into_inner()) = None;
                log::info!("data client disconnected: {}", addr);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                log::error!("data accept error: {}", e);
            }
        }
    }
    log::debug!("data accept loop exited");
}

/// Drive one data connection until its session closes or the server stops.
fn serve_data_connection(
    mut stream: TcpStream,
    catalog: &Arc<dyn DeviceCatalog>,
    session: &Session,
    running: &AtomicBool,
) {
    loop {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        match session.state() {
            SessionState::Running => {
                if let Err(e) = send_loop(&mut stream, catalog, session, running) {
                    log::warn!("data channel send failed, closing session: {}", e);
                    session.set_state(SessionState::Closed);
                }
            }
            SessionState::Idle => thread::sleep(IDLE_POLL_INTERVAL),
            SessionState::Closed => break,
        }
    }
    let _ = stream.shutdown(Shutdown::Both);
}

/// Capture-and-send loop, active while the session is `Running`.
///
/// The shutdown flag and the state tag are checked each iteration; a grab
/// that produces no frame retries immediately without sending.
fn send_loop(
    stream: &mut TcpStream,
    catalog: &Arc<dyn DeviceCatalog>,
    session: &Session,
    running: &AtomicBool,
) -> Result<()> {
    let selection = match session.selection() {
        Some(selection) => selection,
        None => {
            log::warn!("capture requested with no camera selected, returning to idle");
            session.transition(SessionState::Running, SessionState::Idle);
            return Ok(());
        }
    };

    let mut source = catalog.open(selection.cam_idx, selection.width, selection.height)?;
    log::info!(
        "capturing from camera {} at {}x{}",
        selection.cam_idx,
        selection.width,
        selection.height
    );

    let mut sent = 0u64;
    while running.load(Ordering::Relaxed) && session.state() == SessionState::Running {
        let frame = match source.grab()? {
            Some(frame) => frame,
            None => continue,
        };
        let payload = codec::encode(&frame)?;
        wire::write_packet(stream, &payload)?;
        sent += 1;
        log::trace!("sent frame {} ({} bytes)", sent, payload.len());
    }

    log::debug!("send loop exited after {} frames", sent);
    Ok(())
}

/// Accept loop for the control channel. One client at a time.
fn ctrl_loop(
    listener: TcpListener,
    catalog: Arc<dyn DeviceCatalog>,
    session: Arc<Session>,
    running: Arc<AtomicBool>,
) {
    log::debug!("control accept loop started");
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!("control client connected: {}", addr);
                if let Err(e) = prepare_ctrl_stream(&stream) {
                    log::error!("failed to configure control socket: {}", e);
                    continue;
                }
                serve_control_connection(stream, &catalog, &session, &running);
                log::info!("control client disconnected: {}", addr);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                log::error!("control accept error: {}", e);
            }
        }
    }
    log::debug!("control accept loop exited");
}

fn prepare_ctrl_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CTRL_READ_TIMEOUT))?;
    Ok(())
}

/// Dispatch commands from one control connection, strictly in arrival order.
fn serve_control_connection(
    mut stream: TcpStream,
    catalog: &Arc<dyn DeviceCatalog>,
    session: &Session,
    running: &AtomicBool,
) {
    let mut paired_epoch = session.epoch();
    while running.load(Ordering::Relaxed) {
        // Track the data connection this control channel is serving
        paired_epoch = session.epoch();
        let payload = match wire::read_packet(&mut stream) {
            Ok(payload) => payload,
            // Read timeout with no packet started: re-check the flag
            Err(Error::Timeout) => continue,
            Err(Error::ConnectionClosed) => break,
            Err(e) => {
                log::error!("control channel error: {}", e);
                break;
            }
        };

        let response = match serde_json::from_slice::<ControlCommand>(&payload) {
            Ok(command) => {
                log::debug!("received command: {:?}", command);
                handle_command(command, catalog, session)
            }
            Err(e) => {
                log::warn!("rejecting malformed command: {}", e);
                ControlResponse::failure(format!("bad command: {}", e))
            }
        };

        if let Err(e) = wire::write_json(&mut stream, &response) {
            log::error!("failed to send control response: {}", e);
            break;
        }
    }
    // Control teardown drags its paired data session down too
    session.close_if_current(paired_epoch);
    let _ = stream.shutdown(Shutdown::Both);
}

/// Execute one control command against the catalog and session state.
///
/// Validation failures come back as `result: false` responses; nothing here
/// escapes as an error.
fn handle_command(
    command: ControlCommand,
    catalog: &Arc<dyn DeviceCatalog>,
    session: &Session,
) -> ControlResponse {
    match command {
        ControlCommand::GetCameras => ControlResponse::with_cameras(catalog.list_cameras()),

        ControlCommand::SetCamera {
            cam_idx,
            width,
            height,
        } => {
            if !catalog.list_cameras().values().any(|&idx| idx == cam_idx) {
                return ControlResponse::failure(format!("no camera with index {}", cam_idx));
            }
            log::info!("camera selection: index {} at {}x{}", cam_idx, width, height);
            session.select(Selection {
                cam_idx,
                width,
                height,
            });
            ControlResponse::ok()
        }

        ControlCommand::GetCameraFormats { ref cam_name, .. } => {
            // Filter bounds are present whenever the variant matches
            let filter = command.format_filter().unwrap_or_default();
            ControlResponse::with_formats(catalog.list_formats(cam_name, &filter))
        }

        ControlCommand::Capture => match session.state() {
            SessionState::Idle => {
                session.set_state(SessionState::Running);
                ControlResponse::ok()
            }
            // Already streaming: idempotent success
            SessionState::Running => ControlResponse::ok(),
            SessionState::Closed => ControlResponse::failure("no data connection"),
        },

        ControlCommand::StopCapture => {
            // Only a running session drops back to idle; a closed one stays
            // closed until a fresh data connection arrives.
            session.transition(SessionState::Running, SessionState::Idle);
            ControlResponse::ok()
        }
    }
}
