//! # Device Error Types
//!
//! Failures of the serial scale link and the scanner input device.
//!
//! Every variant here is transient from the bridge's point of view: the
//! acquisition loops log it, drop the handle and reconnect. Nothing in this
//! module is fatal to the process.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Device error type.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No input device matched the scanner filters.
    #[error("No matching device found: {0}")]
    NotFound(String),

    /// Opening a port or device node failed.
    #[error("Failed to open {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// Read or write on an open handle failed.
    #[error("Device I/O error: {0}")]
    Io(String),

    /// The device went away (EOF, unplugged).
    #[error("Device disconnected")]
    Disconnected,

    /// Operation needs an open link.
    #[error("Device not connected")]
    NotConnected,

    /// Write did not complete in time.
    #[error("Device timeout after {0:?}")]
    Timeout(Duration),

    /// Exclusive capture of the input device was refused.
    #[error("Failed to grab {path}: {reason}")]
    GrabFailed { path: String, reason: String },
}

impl DeviceError {
    pub fn open_failed(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        DeviceError::OpenFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if reconnecting may fix the problem.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeviceError::NotFound(_)
                | DeviceError::OpenFailed { .. }
                | DeviceError::Io(_)
                | DeviceError::Disconnected
                | DeviceError::Timeout(_)
        )
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::BrokenPipe => {
                DeviceError::Disconnected
            }
            _ => DeviceError::Io(err.to_string()),
        }
    }
}

impl From<tokio_serial::Error> for DeviceError {
    fn from(err: tokio_serial::Error) -> Self {
        match err.kind {
            tokio_serial::ErrorKind::NoDevice => DeviceError::Disconnected,
            _ => DeviceError::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(DeviceError::Disconnected.is_retryable());
        assert!(DeviceError::open_failed("/dev/ttyUSB0", "busy").is_retryable());
        assert!(!DeviceError::NotConnected.is_retryable());
    }

    #[test]
    fn test_eof_is_disconnect() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(DeviceError::from(io), DeviceError::Disconnected));
    }

    #[test]
    fn test_open_failed_display() {
        let err = DeviceError::open_failed("/dev/ttyUSB0", "Permission denied");
        assert_eq!(
            err.to_string(),
            "Failed to open /dev/ttyUSB0: Permission denied"
        );
    }
}
