//! # Domain Types
//!
//! Value types shared by every FarmLink crate.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    KeyEvent     │   │   ScanResult    │   │  WeightReading  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  code (u16)     │──►│  text           │   │  value (f64)    │       │
//! │  │  pressed        │   │  completion     │   │  unit           │       │
//! │  └─────────────────┘   └────────┬────────┘   │  stable         │       │
//! │                                 │            └────────┬────────┘       │
//! │                                 ▼                     │ co-tag         │
//! │                        ┌─────────────────┐            │                │
//! │                        │   QueuedScan    │◄───────────┘                │
//! │                        │  id (store)     │                             │
//! │                        │  barcode        │   ┌─────────────────┐       │
//! │                        │  scanned_at     │   │ ConnectionState │       │
//! │                        │  weight?        │   │  Disconnected   │       │
//! │                        └─────────────────┘   │  Connected      │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// =============================================================================
// Key Events
// =============================================================================

/// evdev value for a fresh key press.
pub const KEY_VALUE_PRESS: i32 = 1;

/// One key transition reported by the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Raw key code (Linux input event code space).
    pub code: u16,

    /// True only for a fresh press. Releases and auto-repeat are false.
    pub pressed: bool,
}

impl KeyEvent {
    /// A press of `code`.
    pub const fn press(code: u16) -> Self {
        KeyEvent {
            code,
            pressed: true,
        }
    }

    /// A release of `code`.
    pub const fn release(code: u16) -> Self {
        KeyEvent {
            code,
            pressed: false,
        }
    }

    /// Builds an event from a raw `(code, value)` pair where
    /// value is 0 = release, 1 = press, 2 = auto-repeat.
    pub const fn from_raw(code: u16, value: i32) -> Self {
        KeyEvent {
            code,
            pressed: value == KEY_VALUE_PRESS,
        }
    }
}

// =============================================================================
// Scans
// =============================================================================

/// What ended a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanCompletion {
    /// Enter or keypad Enter.
    Terminator,
    /// Inter-character silence exceeded the gap threshold.
    Gap,
    /// Caller's overall deadline expired with partial input buffered.
    Timeout,
}

impl std::fmt::Display for ScanCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanCompletion::Terminator => write!(f, "terminator"),
            ScanCompletion::Gap => write!(f, "gap"),
            ScanCompletion::Timeout => write!(f, "timeout"),
        }
    }
}

/// A completed barcode read.
///
/// `text` is trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub text: String,
    pub completion: ScanCompletion,
}

// =============================================================================
// Weight
// =============================================================================

/// Weight unit reported by the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum WeightUnit {
    #[serde(rename = "g")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "g"))]
    Grams,
    #[serde(rename = "kg")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "kg"))]
    Kilograms,
    #[serde(rename = "lb")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "lb"))]
    Pounds,
    #[serde(rename = "oz")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "oz"))]
    Ounces,
}

impl WeightUnit {
    /// Lower-case wire symbol.
    pub const fn as_str(&self) -> &'static str {
        match self {
            WeightUnit::Grams => "g",
            WeightUnit::Kilograms => "kg",
            WeightUnit::Pounds => "lb",
            WeightUnit::Ounces => "oz",
        }
    }
}

impl std::fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WeightUnit {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "g" => Ok(WeightUnit::Grams),
            "kg" => Ok(WeightUnit::Kilograms),
            "lb" => Ok(WeightUnit::Pounds),
            "oz" => Ok(WeightUnit::Ounces),
            other => Err(CoreError::UnknownUnit(other.to_string())),
        }
    }
}

/// One parsed scale measurement. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightReading {
    pub value: f64,
    pub unit: WeightUnit,
    /// True once the scale reports the load as settled.
    pub stable: bool,
}

impl WeightReading {
    pub fn new(value: f64, unit: WeightUnit, stable: bool) -> Self {
        WeightReading {
            value,
            unit,
            stable,
        }
    }

    /// True when value or stability differs from `other`. Unit is not compared.
    pub fn differs_from(&self, other: &WeightReading) -> bool {
        self.value != other.value || self.stable != other.stable
    }
}

// =============================================================================
// Durable Queue Record
// =============================================================================

/// A scan persisted while the uplink was unavailable.
///
/// Ids are assigned by the store, strictly increasing and never reused;
/// FIFO order is id order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct QueuedScan {
    pub id: i64,
    pub barcode: String,
    pub scanned_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,

    /// Optional weight co-tag captured alongside the scan.
    pub weight: Option<f64>,
    pub weight_unit: Option<WeightUnit>,
    pub weight_stable: Option<bool>,
}

impl QueuedScan {
    /// Returns the co-tagged reading when all three weight columns are set.
    pub fn weight_reading(&self) -> Option<WeightReading> {
        match (self.weight, self.weight_unit, self.weight_stable) {
            (Some(value), Some(unit), Some(stable)) => Some(WeightReading::new(value, unit, stable)),
            _ => None,
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Link state, tracked independently for the scanner, the scale and the uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_event_from_raw() {
        assert!(KeyEvent::from_raw(2, 1).pressed);
        assert!(!KeyEvent::from_raw(2, 0).pressed);
        // Auto-repeat is not a fresh press
        assert!(!KeyEvent::from_raw(2, 2).pressed);
    }

    #[test]
    fn test_weight_unit_parsing() {
        assert_eq!("KG".parse::<WeightUnit>().unwrap(), WeightUnit::Kilograms);
        assert_eq!("oz".parse::<WeightUnit>().unwrap(), WeightUnit::Ounces);
        assert!("stone".parse::<WeightUnit>().is_err());
    }

    #[test]
    fn test_weight_unit_serializes_as_symbol() {
        let json = serde_json::to_string(&WeightUnit::Pounds).unwrap();
        assert_eq!(json, "\"lb\"");
    }

    #[test]
    fn test_reading_differs_from() {
        let a = WeightReading::new(12.5, WeightUnit::Kilograms, false);
        let b = WeightReading::new(12.5, WeightUnit::Kilograms, true);
        let c = WeightReading::new(12.5, WeightUnit::Kilograms, false);

        assert!(a.differs_from(&b));
        assert!(!a.differs_from(&c));
    }

    #[test]
    fn test_queued_scan_weight_reading_requires_all_columns() {
        let mut scan = QueuedScan {
            id: 1,
            barcode: "4006381333931".into(),
            scanned_at: Utc::now(),
            created_at: Utc::now(),
            weight: Some(250.0),
            weight_unit: Some(WeightUnit::Grams),
            weight_stable: None,
        };
        assert!(scan.weight_reading().is_none());

        scan.weight_stable = Some(true);
        let reading = scan.weight_reading().unwrap();
        assert_eq!(reading.value, 250.0);
        assert!(reading.stable);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
