//! Error types for DrishtiIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// DrishtiIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connect or accept failure
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Peer closed the connection before a full packet arrived
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Communication timeout
    #[error("Communication timeout")]
    Timeout,

    /// Malformed length header or undecodable payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Compressed frame data could not be decoded
    #[error("Frame decode error: {0}")]
    Decode(String),

    /// Frame could not be compressed
    #[error("Frame encode error: {0}")]
    Encode(String),

    /// Requested camera does not exist in the catalog
    #[error("Camera not available: {0}")]
    CameraNotAvailable(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file could not be written
    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
