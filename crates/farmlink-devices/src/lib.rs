//! # farmlink-devices: Hardware Adapters for FarmLink
//!
//! The serial scale and the keyboard-wedge barcode scanner.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         pi-bridge loops                                 │
//! │        scale loop                              scanner loop             │
//! │            │                                        │                   │
//! │  ┌─────────▼────────────────────────────────────────▼──────────────┐   │
//! │  │                 farmlink-devices (THIS CRATE)                    │   │
//! │  │                                                                  │   │
//! │  │  ScaleController<O: LinkOpener>        ScanReader<S: KeySource>  │   │
//! │  │        │                                      │                  │   │
//! │  │  SerialLink (tokio-serial)             KeySource (evdev, Linux)  │   │
//! │  └─────────┬──────────────────────────────────────┬────────────────┘   │
//! │            ▼                                      ▼                     │
//! │       /dev/ttyUSB0                        /dev/input/event*             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Parsing and scan assembly are pure and live in `farmlink-core`; this
//! crate only adds I/O, timing and reconnection.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod input;
pub mod scale;
pub mod scanner;
pub mod serial;

#[cfg(target_os = "linux")]
pub mod evdev_input;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DeviceError, DeviceResult};
pub use input::{select_scanner, CaptureMode, DeviceCandidate, KeySource, ScannerOpener, ScannerSettings};
pub use scale::{ReconnectOutcome, ScaleController, ScaleSettings};
pub use scanner::ScanReader;
pub use serial::{LinkOpener, SerialLink, TokioSerialLink, TokioSerialOpener};

#[cfg(target_os = "linux")]
pub use evdev_input::{EvdevKeySource, EvdevScannerOpener};
