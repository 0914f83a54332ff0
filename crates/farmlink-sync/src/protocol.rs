//! # Uplink Protocol Events
//!
//! Events the bridge sends to the service.
//!
//! ## Event Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Bridge → Service Events                            │
//! │                                                                         │
//! │  LIVE DATA                                                             │
//! │  ─────────                                                             │
//! │  barcode:scan    { barcode, buffered?, scannedAt? }                    │
//! │  scale:weight    { weight, unit, stable }                              │
//! │                                                                         │
//! │  DEVICE STATUS (live only, dropped while offline)                      │
//! │  ────────────────────────────────────────────────                      │
//! │  scale:status    { connected }                                         │
//! │  scale:error     { message }                                           │
//! │  scale:debug     { scaleConnected, serialPort, barcodeConnected,       │
//! │                    uptime, lastWeight, errorCount, queueSize, piTime } │
//! │                                                                         │
//! │  FLUSH BRACKETS                                                        │
//! │  ──────────────                                                        │
//! │  pi:sync_start    { barcodeCount }                                     │
//! │  pi:sync_complete { barcodeCount }                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Each event is one JSON text frame, adjacently tagged:
//! ```json
//! { "event": "barcode:scan", "data": { "barcode": "4006381333931" } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use farmlink_core::{QueuedScan, WeightReading, WeightUnit};

// =============================================================================
// Event Enum (Tagged Union)
// =============================================================================

/// All events sent over the uplink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum UplinkEvent {
    #[serde(rename = "barcode:scan")]
    BarcodeScan(BarcodeScan),

    #[serde(rename = "scale:weight")]
    ScaleWeight(ScaleWeight),

    #[serde(rename = "scale:status")]
    ScaleStatus { connected: bool },

    #[serde(rename = "scale:error")]
    ScaleError { message: String },

    #[serde(rename = "scale:debug")]
    ScaleDebug(DebugSnapshot),

    /// Opens a flush of queued scans.
    #[serde(rename = "pi:sync_start", rename_all = "camelCase")]
    SyncStart { barcode_count: usize },

    /// Closes a flush. Carries the number actually sent.
    #[serde(rename = "pi:sync_complete", rename_all = "camelCase")]
    SyncComplete { barcode_count: usize },
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeScan {
    pub barcode: String,

    /// Set when the scan is replayed from the durable queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffered: Option<bool>,

    /// Capture time of a replayed scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleWeight {
    pub weight: f64,
    pub unit: WeightUnit,
    pub stable: bool,
}

impl From<WeightReading> for ScaleWeight {
    fn from(reading: WeightReading) -> Self {
        ScaleWeight {
            weight: reading.value,
            unit: reading.unit,
            stable: reading.stable,
        }
    }
}

/// Periodic diagnostics for the service's debug panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub scale_connected: bool,
    pub serial_port: String,
    pub barcode_connected: bool,
    /// Seconds since the bridge started.
    pub uptime: u64,
    pub last_weight: Option<f64>,
    /// Consecutive empty scale reads.
    pub error_count: u32,
    pub queue_size: u32,
    pub pi_time: DateTime<Utc>,
}

// =============================================================================
// Constructors
// =============================================================================

impl UplinkEvent {
    /// A scan delivered as it happens.
    pub fn live_scan(barcode: &str) -> Self {
        UplinkEvent::BarcodeScan(BarcodeScan {
            barcode: barcode.to_string(),
            buffered: None,
            scanned_at: None,
        })
    }

    /// A scan replayed from the durable queue.
    pub fn buffered_scan(scan: &QueuedScan) -> Self {
        UplinkEvent::BarcodeScan(BarcodeScan {
            barcode: scan.barcode.clone(),
            buffered: Some(true),
            scanned_at: Some(scan.scanned_at),
        })
    }

    pub fn weight(reading: WeightReading) -> Self {
        UplinkEvent::ScaleWeight(reading.into())
    }

    pub fn scale_status(connected: bool) -> Self {
        UplinkEvent::ScaleStatus { connected }
    }

    pub fn scale_error(message: &str) -> Self {
        UplinkEvent::ScaleError {
            message: message.to_string(),
        }
    }

    /// Returns the wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            UplinkEvent::BarcodeScan(_) => "barcode:scan",
            UplinkEvent::ScaleWeight(_) => "scale:weight",
            UplinkEvent::ScaleStatus { .. } => "scale:status",
            UplinkEvent::ScaleError { .. } => "scale:error",
            UplinkEvent::ScaleDebug(_) => "scale:debug",
            UplinkEvent::SyncStart { .. } => "pi:sync_start",
            UplinkEvent::SyncComplete { .. } => "pi:sync_complete",
        }
    }

    /// Serializes to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
