//! # Scan Assembler
//!
//! Turns a stream of key presses into discrete barcode strings.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Scan Assembly                                    │
//! │                                                                         │
//! │   press(char) ──► buffer.push(c), last_char_at = now                   │
//! │                                                                         │
//! │   press(Enter | KP Enter)                                               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   trim(buffer) non-empty? ──yes──► emit ScanResult                     │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │   discard                        (buffer resets either way)            │
//! │                                                                         │
//! │   TerminatorOrGap only:                                                 │
//! │   now - last_char_at >= gap  ──► emit buffered text (no Enter needed)  │
//! │                                                                         │
//! │   A press arriving after the gap already elapsed completes the stale   │
//! │   buffer first; the new character starts the next scan.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Time is an explicit argument (`feed_at`, `poll_gap`), so the assembler
//! never sleeps and never reads a clock unless `feed` is used.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::keymap;
use crate::types::{KeyEvent, ScanCompletion, ScanResult};

// =============================================================================
// Completion Policy
// =============================================================================

/// When a buffered scan counts as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Only Enter / keypad Enter complete a scan.
    #[default]
    Terminator,

    /// Enter, or `gap` of silence after the last character.
    TerminatorOrGap { gap: Duration },
}

impl CompletionPolicy {
    /// Builds the gap policy, rejecting a zero gap.
    pub fn terminator_or_gap(gap: Duration) -> CoreResult<Self> {
        if gap.is_zero() {
            return Err(CoreError::InvalidGap);
        }
        Ok(CompletionPolicy::TerminatorOrGap { gap })
    }

    /// The inter-character gap, if this policy has one.
    pub fn gap(&self) -> Option<Duration> {
        match self {
            CompletionPolicy::Terminator => None,
            CompletionPolicy::TerminatorOrGap { gap } => Some(*gap),
        }
    }
}

// =============================================================================
// Scan Assembler
// =============================================================================

/// Accumulates decoded characters until a completion condition fires.
#[derive(Debug, Clone)]
pub struct ScanAssembler {
    policy: CompletionPolicy,
    buffer: String,
    last_char_at: Option<Instant>,
}

impl ScanAssembler {
    pub fn new(policy: CompletionPolicy) -> Self {
        ScanAssembler {
            policy,
            buffer: String::new(),
            last_char_at: None,
        }
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Feeds one event using the current time.
    pub fn feed(&mut self, event: KeyEvent) -> Option<ScanResult> {
        self.feed_at(event, Instant::now())
    }

    /// Feeds one event observed at `now`.
    ///
    /// Returns at most one completed scan. Releases and auto-repeats are
    /// ignored without touching the buffer.
    pub fn feed_at(&mut self, event: KeyEvent, now: Instant) -> Option<ScanResult> {
        if !event.pressed {
            return None;
        }

        // A stale buffer is completed before the new press is applied
        let stale = self.poll_gap(now);

        if keymap::is_terminator(event.code) {
            // Buffer is empty if the stale scan was just taken
            return stale.or_else(|| self.complete(ScanCompletion::Terminator));
        }

        match keymap::decode(event.code) {
            Some(c) => {
                self.buffer.push(c);
                self.last_char_at = Some(now);
            }
            None => {
                debug!(code = event.code, "Ignoring unmapped key code");
            }
        }

        stale
    }

    /// Completes the buffer if the gap policy's silence has elapsed by `now`.
    pub fn poll_gap(&mut self, now: Instant) -> Option<ScanResult> {
        let deadline = self.gap_deadline()?;
        if now >= deadline {
            self.complete(ScanCompletion::Gap)
        } else {
            None
        }
    }

    /// Instant at which the buffered input completes by gap, if any.
    ///
    /// `None` under the terminator policy or while the buffer is empty.
    pub fn gap_deadline(&self) -> Option<Instant> {
        let gap = self.policy.gap()?;
        if self.buffer.is_empty() {
            return None;
        }
        self.last_char_at.map(|at| at + gap)
    }

    /// Takes whatever partial input is buffered as a timeout completion.
    pub fn take_partial(&mut self) -> Option<ScanResult> {
        self.complete(ScanCompletion::Timeout)
    }

    /// Drops buffered input.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_char_at = None;
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Raw buffered characters (untrimmed).
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    fn complete(&mut self, completion: ScanCompletion) -> Option<ScanResult> {
        let text = self.buffer.trim().to_string();
        self.reset();

        if text.is_empty() {
            return None;
        }
        Some(ScanResult { text, completion })
    }
}

impl Default for ScanAssembler {
    fn default() -> Self {
        ScanAssembler::new(CompletionPolicy::default())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
