//! # farmlink-core: Pure Edge Logic for FarmLink
//!
//! Everything the bridge decides without touching hardware or the network:
//! how key presses become barcodes, and how a scale line becomes a reading.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      FarmLink Bridge Data Flow                          │
//! │                                                                         │
//! │  evdev key events          serial lines ("  12.5 kg *")                 │
//! │        │                          │                                     │
//! │  ┌─────▼──────────────────────────▼────────────────────────────────┐   │
//! │  │             ★ farmlink-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐   ┌──────────────┐   ┌───────────────────────┐ │   │
//! │  │   │  keymap   │──►│     scan     │   │        scale          │ │   │
//! │  │   │ code→char │   │ScanAssembler │   │ parse() → Reading     │ │   │
//! │  │   └───────────┘   └──────────────┘   └───────────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • TIME PASSED IN           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │        │                          │                                     │
//! │        ▼                          ▼                                     │
//! │   ScanResult                WeightReading  ──►  farmlink-sync           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Shared value types (KeyEvent, WeightReading, QueuedScan...)
//! - [`keymap`] - Fixed key-code table and terminator codes
//! - [`scan`] - Scan assembly state machine and completion policies
//! - [`scale`] - Scale line parser and command set
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use farmlink_core::scale;
//! use farmlink_core::WeightUnit;
//!
//! let reading = scale::parse("   123.4 g  *     G").unwrap();
//! assert_eq!(reading.value, 123.4);
//! assert_eq!(reading.unit, WeightUnit::Grams);
//! assert!(reading.stable);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod keymap;
pub mod scale;
pub mod scan;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use scale::{ScaleCommand, ScaleFrame, ScaleMode};
pub use scan::{CompletionPolicy, ScanAssembler};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Inter-character silence after which a buffered scan is considered complete.
pub const DEFAULT_SCAN_GAP_MS: u64 = 300;

/// Maximum number of scans retained in the durable queue.
pub const DEFAULT_MAX_QUEUE_SIZE: u32 = 1000;
