//! Error types for the TDS01V sensor interface

use thiserror::Error;

use crate::frame::FrameError;

/// Error type for TDS01V operations
#[derive(Error, Debug)]
pub enum Tds01vError {
    /// The serial device could not be opened, or the reset handshake failed
    #[error("Failed to open {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// `start` was called while an acquisition loop is active
    #[error("Acquisition is already running")]
    AlreadyRunning,

    /// The callback slot is already occupied
    #[error("A callback is already registered")]
    AlreadyRegistered,

    /// No response arrived within the configured read timeout
    #[error("Timed out waiting for response to command {command}")]
    Timeout { command: &'static str },

    /// The device never reported idle during the reset handshake
    #[error("Device did not report idle after {attempts} status queries")]
    DeviceUnresponsive { attempts: u32 },

    /// The measurement frame could not be decoded
    #[error("Malformed measurement frame: {0}")]
    MalformedFrame(#[from] FrameError),

    /// The sample callback panicked during delivery
    #[error("Sample callback panicked: {0}")]
    CallbackPanicked(String),

    /// The acquisition worker thread or the sample callback panicked
    #[error("Acquisition worker panicked")]
    WorkerPanicked,

    /// The configured line speed has no termios equivalent
    #[error("Unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),

    /// Terminal settings could not be read or written
    #[error("Line settings error: {0}")]
    Line(#[from] nix::Error),

    /// Serial port driver error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error on the serial line
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Tds01vError {
    /// Wrap any error raised while opening the device as `OpenFailed`
    pub(crate) fn open_failed(path: &str, cause: impl std::fmt::Display) -> Self {
        Tds01vError::OpenFailed {
            path: path.to_string(),
            reason: cause.to_string(),
        }
    }
}

/// Result type for TDS01V operations
pub type Result<T> = std::result::Result<T, Tds01vError>;
