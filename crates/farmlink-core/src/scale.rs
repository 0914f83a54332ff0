//! # Scale Line Protocol
//!
//! Parser for the ASCII line protocol spoken by bench scales in print mode,
//! plus the host command set.
//!
//! ## Line Grammar
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Typical Lines                                       │
//! │                                                                         │
//! │   "   123.4 g  *     G"    →  123.4 g   stable   (* marker)            │
//! │   "   123.4 g  ?     G"    →  123.4 g   unstable (? marker)            │
//! │   "ST,GS,+  12.50 kg"      →  12.5 kg   stable   (ST header)           │
//! │   "US,GS,-   0.20 lb"      →  -0.2 lb   unstable (US header)           │
//! │   "      OL"               →  overload, no reading                      │
//! │   "  250"                  →  250 g     (no unit → grams)               │
//! │                                                                         │
//! │   Stability, first match wins:                                         │
//! │     '*' → stable   '?' → unstable   "US" → unstable   "ST" → stable    │
//! │     otherwise stable                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{WeightReading, WeightUnit};

/// Signed decimal number followed by a unit token.
static VALUE_WITH_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([+-]?\s*[\d.]+)\s*(g|kg|lb|oz)").expect("value/unit pattern")
});

/// Bare signed decimal number.
static BARE_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+-]?\s*[\d.]+)").expect("bare value pattern"));

// =============================================================================
// Parsing
// =============================================================================

/// Classification of one raw scale line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleFrame {
    Reading(WeightReading),
    /// Load beyond capacity (`OL`).
    Overload,
    /// Nothing numeric in the line, or an unparseable number.
    Unparsed,
}

/// Parses one line into a reading. Overload and garbage both yield `None`.
pub fn parse(line: &str) -> Option<WeightReading> {
    match parse_frame(line) {
        ScaleFrame::Reading(reading) => Some(reading),
        ScaleFrame::Overload | ScaleFrame::Unparsed => None,
    }
}

/// Parses one line, keeping overload distinct from parse failure.
pub fn parse_frame(line: &str) -> ScaleFrame {
    let upper = line.to_ascii_uppercase();

    if upper.contains("OL") && !line.bytes().any(|b| b.is_ascii_digit()) {
        return ScaleFrame::Overload;
    }

    let stable = stability(line, &upper);

    if let Some(caps) = VALUE_WITH_UNIT.captures(line) {
        let unit = caps[2].parse::<WeightUnit>();
        return match (parse_number(&caps[1]), unit) {
            (Some(value), Ok(unit)) => ScaleFrame::Reading(WeightReading::new(value, unit, stable)),
            _ => ScaleFrame::Unparsed,
        };
    }

    if let Some(caps) = BARE_VALUE.captures(line) {
        return match parse_number(&caps[1]) {
            Some(value) => ScaleFrame::Reading(WeightReading::new(value, WeightUnit::Grams, stable)),
            None => ScaleFrame::Unparsed,
        };
    }

    ScaleFrame::Unparsed
}

fn stability(line: &str, upper: &str) -> bool {
    if line.contains('*') {
        true
    } else if line.contains('?') {
        false
    } else if upper.contains("US") {
        false
    } else {
        // "ST" or no marker at all
        true
    }
}

/// Parses a numeric token, tolerating whitespace between sign and digits.
fn parse_number(token: &str) -> Option<f64> {
    let compact: String = token.chars().filter(|c| !c.is_whitespace()).collect();
    compact.parse::<f64>().ok().filter(|v| v.is_finite())
}

// =============================================================================
// Commands
// =============================================================================

/// Host-to-scale commands. Each is sent as ASCII followed by CRLF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleCommand {
    /// Start streaming readings continuously.
    ContinuousPrint,
    /// Send one reading now.
    ImmediatePrint,
    /// Send one reading once the load settles.
    PrintOnStable,
    Zero,
    Tare,
}

impl ScaleCommand {
    /// Bytes written to the serial link.
    pub const fn wire(&self) -> &'static [u8] {
        match self {
            ScaleCommand::ContinuousPrint => b"CP\r\n",
            ScaleCommand::ImmediatePrint => b"IP\r\n",
            ScaleCommand::PrintOnStable => b"SP\r\n",
            ScaleCommand::Zero => b"Z\r\n",
            ScaleCommand::Tare => b"T\r\n",
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            ScaleCommand::ContinuousPrint => "CP",
            ScaleCommand::ImmediatePrint => "IP",
            ScaleCommand::PrintOnStable => "SP",
            ScaleCommand::Zero => "Z",
            ScaleCommand::Tare => "T",
        }
    }
}

impl std::fmt::Display for ScaleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How the scale is told to transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// Host sends `CP` after connecting; the scale streams.
    #[default]
    Continuous,
    /// Scale transmits on its own when the load settles; no command sent.
    Auto,
}

impl std::fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleMode::Continuous => write!(f, "continuous"),
            ScaleMode::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for ScaleMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continuous" => Ok(ScaleMode::Continuous),
            "auto" => Ok(ScaleMode::Auto),
            other => Err(CoreError::UnknownScaleMode(other.to_string())),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
