//! # Error Types
//!
//! Domain errors for farmlink-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  farmlink-core     CoreError     (this file)                           │
//! │  farmlink-db       DbError       storage failures                      │
//! │  farmlink-devices  DeviceError   serial / input device failures        │
//! │  farmlink-sync     SyncError     uplink failures                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A scale line that does not parse is NOT an error: the parser returns
//! `None` and the caller skips the line. Errors here only cover values
//! that arrive through configuration or storage.

use thiserror::Error;

/// Core domain errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Weight unit token not in `g | kg | lb | oz`.
    #[error("Unknown weight unit: '{0}'")]
    UnknownUnit(String),

    /// Scale mode not in `continuous | auto`.
    #[error("Unknown scale mode: '{0}'")]
    UnknownScaleMode(String),

    /// Inter-character gap must be positive.
    #[error("Scan gap must be greater than zero")]
    InvalidGap,
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
