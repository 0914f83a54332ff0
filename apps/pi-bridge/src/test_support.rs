//! In-memory fakes shared by the loop tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use farmlink_core::{ConnectionState, KeyEvent};
use farmlink_db::{Database, DbConfig};
use farmlink_devices::{
    DeviceError, DeviceResult, KeySource, LinkOpener, ScannerOpener, SerialLink,
};
use farmlink_sync::{DeliveryOrchestrator, LatestWeightBuffer, SyncError, SyncResult, Uplink, UplinkEvent};

use crate::config::BridgeConfig;
use crate::context::BridgeContext;

// =============================================================================
// Uplink
// =============================================================================

pub struct FakeUplink {
    state_tx: watch::Sender<ConnectionState>,
    sent: Mutex<Vec<UplinkEvent>>,
}

impl FakeUplink {
    pub fn new(connected: bool) -> Arc<Self> {
        let state = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        Arc::new(FakeUplink {
            state_tx: watch::channel(state).0,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<UplinkEvent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent().iter().map(|e| e.name()).collect()
    }
}

#[async_trait]
impl Uplink for FakeUplink {
    fn is_connected(&self) -> bool {
        self.state_tx.borrow().is_connected()
    }

    async fn emit(&self, event: UplinkEvent) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::Disconnected);
        }
        self.sent.lock().unwrap().push(event);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

/// A context over an in-memory queue and a connected fake uplink.
pub async fn context() -> (Arc<BridgeContext>, Arc<FakeUplink>) {
    context_with(true).await
}

pub async fn context_with(connected: bool) -> (Arc<BridgeContext>, Arc<FakeUplink>) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let uplink = FakeUplink::new(connected);
    let orchestrator = Arc::new(DeliveryOrchestrator::new(
        uplink.clone(),
        db.scan_queue(),
        Arc::new(LatestWeightBuffer::new()),
        Duration::from_millis(1),
    ));

    let mut config = BridgeConfig::default();
    config.uplink.api_key = "test".to_string();

    (Arc::new(BridgeContext::new(config, orchestrator)), uplink)
}

// =============================================================================
// Serial
// =============================================================================

#[derive(Default)]
pub struct SerialState {
    pub lines: VecDeque<String>,
    pub fail_opens: u32,
    pub fail_reads: bool,
    pub opens: u32,
}

pub struct FakeLink {
    state: Arc<Mutex<SerialState>>,
}

#[async_trait]
impl SerialLink for FakeLink {
    async fn write_command(&mut self, _bytes: &[u8]) -> DeviceResult<()> {
        Ok(())
    }

    async fn read_line(&mut self, _wait: Duration) -> DeviceResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(DeviceError::Disconnected);
        }
        Ok(state.lines.pop_front())
    }

    fn backlog(&self) -> DeviceResult<usize> {
        Ok(0)
    }

    fn discard_input(&mut self) -> DeviceResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> DeviceResult<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeSerialOpener {
    pub state: Arc<Mutex<SerialState>>,
}

#[async_trait]
impl LinkOpener for FakeSerialOpener {
    type Link = FakeLink;

    async fn open(&self, port: &str, _baud_rate: u32) -> DeviceResult<FakeLink> {
        let mut state = self.state.lock().unwrap();
        state.opens += 1;
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(DeviceError::open_failed(port, "no such device"));
        }
        state.fail_reads = false;
        Ok(FakeLink {
            state: Arc::clone(&self.state),
        })
    }
}

// =============================================================================
// Scanner
// =============================================================================

/// Replays queued key events, then fails once the script runs out.
pub struct FakeKeySource {
    path: String,
    events: VecDeque<KeyEvent>,
}

#[async_trait]
impl KeySource for FakeKeySource {
    async fn next_event(&mut self) -> DeviceResult<KeyEvent> {
        match self.events.pop_front() {
            Some(event) => Ok(event),
            None => Err(DeviceError::Disconnected),
        }
    }

    fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Default)]
pub struct ScannerState {
    /// One script per successful open.
    pub scripts: VecDeque<Vec<KeyEvent>>,
    pub hints: Vec<Option<String>>,
}

#[derive(Clone, Default)]
pub struct FakeScannerOpener {
    pub state: Arc<Mutex<ScannerState>>,
}

#[async_trait]
impl ScannerOpener for FakeScannerOpener {
    type Source = FakeKeySource;

    async fn open(&self, hint: Option<&str>) -> DeviceResult<FakeKeySource> {
        let mut state = self.state.lock().unwrap();
        state.hints.push(hint.map(str::to_string));
        match state.scripts.pop_front() {
            Some(events) => Ok(FakeKeySource {
                path: hint.unwrap_or("/dev/input/event7").to_string(),
                events: events.into(),
            }),
            None => Err(DeviceError::NotFound("no scanner".into())),
        }
    }
}

/// Key presses typing `text` followed by Enter.
pub fn typed(text: &str) -> Vec<KeyEvent> {
    let mut events: Vec<KeyEvent> = text
        .chars()
        .map(|c| {
            let code = match c {
                '1'..='9' => 2 + (c as u16 - '1' as u16),
                '0' => 11,
                _ => panic!("unsupported char {c}"),
            };
            KeyEvent::press(code)
        })
        .collect();
    events.push(KeyEvent::press(farmlink_core::keymap::KEY_ENTER));
    events
}
