//! Error types and handling.

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::protocol::{CommandCode, ErrorReport, LogEntry};

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Fixed-size payload had the wrong length
    #[error("{command}: payload must be exactly {expected} bytes, got {actual}")]
    InvalidLength {
        command: CommandCode,
        expected: usize,
        actual: usize,
    },

    /// Variable-size payload was shorter than its fixed prefix
    #[error("{command}: payload must be at least {minimum} bytes, got {actual}")]
    PayloadTooShort {
        command: CommandCode,
        minimum: usize,
        actual: usize,
    },

    /// Frame too short to carry a command code and checksum
    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    /// Security PIN is not 4 or 6 decimal digits
    #[error("Invalid security PIN: {0}")]
    InvalidPin(String),

    /// CRC of a received frame does not match its content
    #[error("CRC mismatch: expected {expected:04x}, got {received:04x}")]
    ChecksumMismatch { expected: u16, received: u16 },

    /// Encrypted frame failed authentication
    #[error("Failed to decrypt frame: authentication failed")]
    DecryptionFailed,

    /// Encrypted frame addressed to a different authorization id
    #[error("Authorization id mismatch: expected {expected:02x?}, got {received:02x?}")]
    AuthorizationIdMismatch { expected: [u8; 4], received: [u8; 4] },

    /// Command code unknown to this client
    #[error("Unrecognized command code: {0:#06x}")]
    UnrecognizedCommand(u16),

    /// Known command code that is never sent by the device
    #[error("Unsupported response command: {0}")]
    UnsupportedResponse(CommandCode),

    /// Response type does not fit the current exchange step
    #[error("Unexpected response: expected {expected}, got {received}")]
    UnexpectedResponse {
        expected: &'static str,
        received: CommandCode,
    },

    /// A request is already awaiting its response
    #[error("Another request is still in flight")]
    RequestInFlight,

    /// Device answered with an error report
    #[error("Device error: {0}")]
    DeviceReport(ErrorReport),

    /// Log stream ended with an error after some entries arrived
    #[error("Log retrieval interrupted after {} entries: {source}", .received.len())]
    LogStreamInterrupted {
        received: Vec<LogEntry>,
        #[source]
        source: Box<Error>,
    },

    /// Bluetooth transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Device disconnected while a request was pending
    #[error("Device disconnected")]
    Disconnected,

    /// No response within the request timeout
    #[error("Timeout waiting for device response")]
    Timeout,

    /// Device was not seen during scanning
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// GATT characteristic missing on the connected device
    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    /// No stored authorization for the device
    #[error("Not authorized for device {0}, run authorize first")]
    NotAuthorized(String),

    /// Key material could not be used
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a transport error with message
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a crypto error with message
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Error report sent by the device, if this error carries one.
    pub fn device_report(&self) -> Option<&ErrorReport> {
        match self {
            Self::DeviceReport(report) => Some(report),
            Self::LogStreamInterrupted { source, .. } => source.device_report(),
            _ => None,
        }
    }

    /// Whether the error invalidates a frame's integrity (checksum, AEAD tag, addressing).
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::DecryptionFailed | Self::AuthorizationIdMismatch { .. }
        )
    }
}

impl From<btleplug::Error> for Error {
    fn from(e: btleplug::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
