//! # Scale Acquisition Controller
//!
//! Owns the serial link to the scale and turns it into weight readings.
//!
//! ## Polling Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         poll() cycle                                    │
//! │                                                                         │
//! │   backlog > stale_backlog_bytes ? ──yes──► discard input, no reading   │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │   passive read_line(read_timeout) ──line──► parse ──► reading?         │
//! │        │ nothing                                                        │
//! │        ▼                                                                │
//! │   last IP older than immediate_poll_interval ?                          │
//! │        │ yes                           │ no                             │
//! │        ▼                               ▼                                │
//! │   send IP\r\n, read one line       no reading                          │
//! │                                                                         │
//! │   Any serial error: drop link ──► Disconnected, no reading             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reconnect
//!
//! `reconnect()` closes the current link and retries `connect()` a bounded
//! number of times with exponential backoff between attempts. Failures are
//! logged and reported in [`ReconnectOutcome`]; they are never fatal.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use farmlink_core::scale::{self, ScaleFrame};
use farmlink_core::{ConnectionState, ScaleCommand, ScaleMode, WeightReading};

use crate::error::{DeviceError, DeviceResult};
use crate::serial::{LinkOpener, SerialLink};

// =============================================================================
// Settings
// =============================================================================

/// Scale link and polling parameters.
#[derive(Debug, Clone)]
pub struct ScaleSettings {
    /// Serial device path.
    pub port: String,

    pub baud_rate: u32,

    pub mode: ScaleMode,

    /// Wait for one line per read attempt.
    pub read_timeout: Duration,

    /// Pause between opening the port and sending `CP`.
    pub settle_delay: Duration,

    /// Backlog size above which buffered input is considered stale.
    pub stale_backlog_bytes: usize,

    /// Minimum spacing between `IP` commands.
    pub immediate_poll_interval: Duration,

    /// Connect attempts per `reconnect()` call.
    pub reconnect_attempts: u32,

    /// First backoff interval between reconnect attempts.
    pub reconnect_delay: Duration,

    /// Backoff ceiling.
    pub max_reconnect_delay: Duration,
}

impl Default for ScaleSettings {
    fn default() -> Self {
        ScaleSettings {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            mode: ScaleMode::Continuous,
            read_timeout: Duration::from_millis(100),
            settle_delay: Duration::from_millis(500),
            stale_backlog_bytes: 100,
            immediate_poll_interval: Duration::from_millis(500),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(2000),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

/// Result of a [`ScaleController::reconnect`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectOutcome {
    /// Connect attempts made, including the successful one.
    pub attempts: u32,
    pub connected: bool,
}

// =============================================================================
// Controller
// =============================================================================

/// Connection state machine and read policy for one scale.
pub struct ScaleController<O: LinkOpener> {
    opener: O,
    settings: ScaleSettings,
    link: Option<O::Link>,
    last_immediate_poll: Option<Instant>,
}

impl<O: LinkOpener> ScaleController<O> {
    pub fn new(opener: O, settings: ScaleSettings) -> Self {
        ScaleController {
            opener,
            settings,
            link: None,
            last_immediate_poll: None,
        }
    }

    pub fn settings(&self) -> &ScaleSettings {
        &self.settings
    }

    pub fn state(&self) -> ConnectionState {
        if self.link.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Opens the port and starts the scale transmitting.
    ///
    /// No-op when already connected.
    pub async fn connect(&mut self) -> DeviceResult<()> {
        if self.link.is_some() {
            return Ok(());
        }

        let port = self.settings.port.clone();
        let mut link = self.opener.open(&port, self.settings.baud_rate).await?;

        if let Err(e) = self.start_transmitting(&mut link).await {
            close_quietly(&mut link, &port).await;
            return Err(e);
        }

        self.link = Some(link);
        self.last_immediate_poll = None;
        info!(%port, baud_rate = self.settings.baud_rate, mode = %self.settings.mode, "Scale connected");
        Ok(())
    }

    async fn start_transmitting(&self, link: &mut O::Link) -> DeviceResult<()> {
        link.discard_input()?;

        match self.settings.mode {
            ScaleMode::Continuous => {
                sleep(self.settings.settle_delay).await;
                link.write_command(ScaleCommand::ContinuousPrint.wire()).await?;
                debug!(command = %ScaleCommand::ContinuousPrint, "Continuous print requested");
            }
            ScaleMode::Auto => {
                debug!("Auto mode, waiting for scale to transmit on stability");
            }
        }
        Ok(())
    }

    /// Closes any open link and retries `connect()` with backoff.
    pub async fn reconnect(&mut self) -> ReconnectOutcome {
        self.close().await;

        let max_attempts = self.settings.reconnect_attempts.max(1);
        let mut backoff = self.create_backoff();

        for attempt in 1..=max_attempts {
            match self.connect().await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(attempt, "Scale reconnected");
                    }
                    return ReconnectOutcome {
                        attempts: attempt,
                        connected: true,
                    };
                }
                Err(e) => {
                    warn!(
                        port = %self.settings.port,
                        attempt,
                        max_attempts,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Scale connect attempt failed"
                    );
                }
            }

            if attempt < max_attempts {
                let delay = backoff
                    .next_backoff()
                    .unwrap_or(self.settings.max_reconnect_delay);
                debug!(delay_ms = delay.as_millis() as u64, "Waiting before next scale connect attempt");
                sleep(delay).await;
            }
        }

        ReconnectOutcome {
            attempts: max_attempts,
            connected: false,
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.reconnect_delay,
            max_interval: self.settings.max_reconnect_delay,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Runs one read cycle. See the module docs for the policy.
    pub async fn poll(&mut self) -> Option<WeightReading> {
        let link = self.link.as_mut()?;

        match poll_link(link, &self.settings, &mut self.last_immediate_poll).await {
            Ok(reading) => reading,
            Err(e) => {
                warn!(port = %self.settings.port, error = %e, "Scale link lost");
                self.close().await;
                None
            }
        }
    }

    /// Sends one command to the scale.
    pub async fn send_command(&mut self, command: ScaleCommand) -> DeviceResult<()> {
        let link = self.link.as_mut().ok_or(DeviceError::NotConnected)?;

        if let Err(e) = link.write_command(command.wire()).await {
            warn!(%command, error = %e, "Scale command failed");
            self.close().await;
            return Err(e);
        }
        debug!(%command, "Scale command sent");
        Ok(())
    }

    /// Closes the link, best-effort.
    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            close_quietly(&mut link, &self.settings.port).await;
        }
        self.last_immediate_poll = None;
    }
}

async fn poll_link<L: SerialLink>(
    link: &mut L,
    settings: &ScaleSettings,
    last_immediate_poll: &mut Option<Instant>,
) -> DeviceResult<Option<WeightReading>> {
    let backlog = link.backlog()?;
    if backlog > settings.stale_backlog_bytes {
        debug!(backlog, "Discarding stale scale backlog");
        link.discard_input()?;
        return Ok(None);
    }

    if let Some(line) = link.read_line(settings.read_timeout).await? {
        return Ok(interpret(&line));
    }

    let now = Instant::now();
    let due = last_immediate_poll
        .map(|at| now.duration_since(at) >= settings.immediate_poll_interval)
        .unwrap_or(true);
    if !due {
        return Ok(None);
    }

    *last_immediate_poll = Some(now);
    link.write_command(ScaleCommand::ImmediatePrint.wire()).await?;

    Ok(link
        .read_line(settings.read_timeout)
        .await?
        .and_then(|line| interpret(&line)))
}

fn interpret(line: &str) -> Option<WeightReading> {
    match scale::parse_frame(line) {
        ScaleFrame::Reading(reading) => Some(reading),
        ScaleFrame::Overload => {
            debug!("Scale overload");
            None
        }
        ScaleFrame::Unparsed => {
            debug!(%line, "Unparsed scale line");
            None
        }
    }
}

async fn close_quietly<L: SerialLink>(link: &mut L, port: &str) {
    if let Err(e) = link.close().await {
        debug!(%port, error = %e, "Error closing scale link");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
