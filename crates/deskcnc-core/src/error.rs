//! Error handling for the DeskCNC driver
//!
//! Errors are split by the layer that raises them and by how the caller is
//! expected to react:
//! - Connection errors (transport) are recovered by restarting the session
//! - Protocol errors abort the current program line
//! - G-Code errors (unsupported commands, bad syntax) abort the run
//! - Controller errors end recovery (cancellation, fault guard)
//! - Firmware errors are raised while loading bootstrap resources
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Transport-level failures on the serial link. The modal translator treats
/// every variant as recoverable by a full session restart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// No port is open
    #[error("Serial port is not open")]
    NotConnected,

    /// The device returned no bytes where a response was expected
    #[error("Device not responding")]
    DeviceNotResponding,

    /// I/O error on an open port
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        ConnectionError::IoError {
            reason: err.to_string(),
        }
    }
}

/// Protocol error type
///
/// The device answered, but not with what the protocol requires.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Acknowledgement byte did not match after exhausting retries
    #[error("Unexpected device response {actual} (expected {expected:#04x}) after {attempts} attempts")]
    UnexpectedResponse {
        /// The acknowledgement marker the device should send.
        expected: u8,
        /// Hex rendering of what was received (empty if nothing).
        actual: String,
        /// Number of transmissions made.
        attempts: u32,
    },
}

/// G-Code error type
///
/// Represents errors related to G-Code parsing and translation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcodeError {
    /// Invalid G-Code syntax
    #[error("Invalid syntax at line {line_number}: {reason}")]
    InvalidSyntax {
        /// The line number where the syntax error occurred.
        line_number: u32,
        /// The reason for the syntax error.
        reason: String,
    },

    /// Command exists but the machine cannot execute it
    #[error("{command} not supported: {reason}")]
    Unsupported {
        /// The G-Code command, e.g. `G2`.
        command: String,
        /// Why it cannot be executed.
        reason: String,
    },
}

/// Controller error type
///
/// Conditions that stop the translator's recovery loop or the session's
/// bring-up loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Bring-up or recovery was interrupted
    #[error("Operation cancelled")]
    Cancelled,

    /// Consecutive transport faults exceeded the configured guard
    #[error("Giving up after {count} consecutive communication faults")]
    TooManyFaults {
        /// Faults seen in a row without a successful command.
        count: u32,
    },
}

/// Firmware error type
///
/// Problems with the firmware bootstrap resources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FirmwareError {
    /// Resource file could not be read
    #[error("Failed to read firmware resource {path}: {reason}")]
    ResourceUnreadable {
        /// Path of the resource file.
        path: String,
        /// The underlying I/O error.
        reason: String,
    },

    /// Resource file contains a token that is not a hex byte
    #[error("Invalid hex byte '{token}' in {path}")]
    InvalidHexByte {
        /// Path of the resource file.
        path: String,
        /// The offending token.
        token: String,
    },

    /// Resource file contains no bytes
    #[error("Firmware resource {path} is empty")]
    EmptyResource {
        /// Path of the resource file.
        path: String,
    },
}

/// Main error type for the DeskCNC driver
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Firmware error
    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a G-Code error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }

    /// Whether the error ends a program run rather than a single line
    pub fn is_fatal(&self) -> bool {
        !self.is_protocol_error()
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_maps_to_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: Error = ConnectionError::from(io).into();
        assert!(err.is_connection_error());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_protocol_error_is_not_fatal() {
        let err: Error = ProtocolError::UnexpectedResponse {
            expected: 0x02,
            actual: "ff".to_string(),
            attempts: 3,
        }
        .into();
        assert!(err.is_protocol_error());
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Unexpected device response ff (expected 0x02) after 3 attempts"
        );
    }

    #[test]
    fn test_unsupported_message() {
        let err: Error = GcodeError::Unsupported {
            command: "G2".to_string(),
            reason: "circular interpolation".to_string(),
        }
        .into();
        assert!(err.is_gcode_error());
        assert_eq!(err.to_string(), "G2 not supported: circular interpolation");
    }
}
