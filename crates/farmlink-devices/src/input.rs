//! # Scanner Input Devices
//!
//! The barcode scanner is a USB keyboard-wedge device. This module defines
//! the seam between raw key events and the scan reader, plus the discovery
//! rules used to pick the scanner out of all attached input devices.
//!
//! ```text
//! ┌───────────────────────┐   open(hint)   ┌──────────────────────────┐
//! │ ScannerOpener         │───────────────►│ KeySource                │
//! │  • hint path first    │                │  next_event() -> KeyEvent│
//! │  • else select_scanner│                │  (cancel-safe)           │
//! └───────────────────────┘                └──────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use farmlink_core::KeyEvent;

use crate::error::DeviceResult;

// =============================================================================
// Traits
// =============================================================================

/// A stream of key events from one input device.
#[async_trait]
pub trait KeySource: Send {
    /// Waits for the next key event.
    ///
    /// Must be cancel-safe: dropping the future loses no event.
    async fn next_event(&mut self) -> DeviceResult<KeyEvent>;

    /// Device node this source reads from.
    fn path(&self) -> &str;
}

/// Locates and opens the scanner.
#[async_trait]
pub trait ScannerOpener: Send + Sync {
    type Source: KeySource + 'static;

    /// Opens the device at `hint` if given, otherwise discovers one.
    async fn open(&self, hint: Option<&str>) -> DeviceResult<Self::Source>;
}

// =============================================================================
// Settings
// =============================================================================

/// Whether other consumers still see the scanner's key presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Events are shared with the console and other readers.
    #[default]
    Shared,
    /// The device is grabbed; only the bridge sees its events.
    Exclusive,
}

/// Scanner discovery and capture parameters.
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    /// Preferred substring of the device name (case-insensitive).
    pub name_filter: String,

    /// Fallback name keywords when nothing matches `name_filter`.
    pub keywords: Vec<String>,

    pub capture: CaptureMode,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        ScannerSettings {
            name_filter: "Honeywell".to_string(),
            keywords: vec![
                "barcode".to_string(),
                "scanner".to_string(),
                "voyager".to_string(),
            ],
            capture: CaptureMode::Shared,
        }
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// An enumerated input device, reduced to what selection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub path: String,
    pub name: String,
    /// Reports the number-row keys a barcode needs.
    pub has_digit_keys: bool,
}

/// Picks the scanner among enumerated devices.
///
/// Devices without digit keys are never chosen. A `name_filter` match wins;
/// otherwise the first device whose name contains any keyword.
pub fn select_scanner<'a>(
    candidates: &'a [DeviceCandidate],
    settings: &ScannerSettings,
) -> Option<&'a DeviceCandidate> {
    let usable: Vec<&DeviceCandidate> = candidates
        .iter()
        .filter(|c| {
            if !c.has_digit_keys {
                debug!(path = %c.path, name = %c.name, "Skipping input device without digit keys");
            }
            c.has_digit_keys
        })
        .collect();

    let filter = settings.name_filter.to_lowercase();
    if !filter.is_empty() {
        if let Some(found) = usable
            .iter()
            .find(|c| c.name.to_lowercase().contains(&filter))
        {
            return Some(found);
        }
    }

    usable.into_iter().find(|c| {
        let name = c.name.to_lowercase();
        settings
            .keywords
            .iter()
            .any(|k| name.contains(&k.to_lowercase()))
    })
}
