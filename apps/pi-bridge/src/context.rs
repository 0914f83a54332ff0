//! Shared runtime state for the bridge loops.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use farmlink_core::WeightReading;
use farmlink_sync::DeliveryOrchestrator;

use crate::config::BridgeConfig;

/// Owned by `main` and handed to each loop behind an `Arc`.
pub struct BridgeContext {
    pub config: BridgeConfig,
    pub orchestrator: Arc<DeliveryOrchestrator>,
    started: Instant,
    scale_connected: AtomicBool,
    scanner_connected: AtomicBool,
    /// Consecutive empty scale reads.
    miss_count: AtomicU32,
    /// Latest reading and when it was read.
    last_weight: Mutex<Option<(WeightReading, Instant)>>,
}

impl BridgeContext {
    pub fn new(config: BridgeConfig, orchestrator: Arc<DeliveryOrchestrator>) -> Self {
        BridgeContext {
            config,
            orchestrator,
            started: Instant::now(),
            scale_connected: AtomicBool::new(false),
            scanner_connected: AtomicBool::new(false),
            miss_count: AtomicU32::new(0),
            last_weight: Mutex::new(None),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn scale_connected(&self) -> bool {
        self.scale_connected.load(Ordering::Relaxed)
    }

    /// Returns the previous value.
    pub fn set_scale_connected(&self, connected: bool) -> bool {
        self.scale_connected.swap(connected, Ordering::Relaxed)
    }

    pub fn scanner_connected(&self) -> bool {
        self.scanner_connected.load(Ordering::Relaxed)
    }

    pub fn set_scanner_connected(&self, connected: bool) {
        self.scanner_connected.store(connected, Ordering::Relaxed);
    }

    pub fn miss_count(&self) -> u32 {
        self.miss_count.load(Ordering::Relaxed)
    }

    /// Counts an empty read and returns the new total.
    pub fn record_miss(&self) -> u32 {
        self.miss_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset_misses(&self) {
        self.miss_count.store(0, Ordering::Relaxed);
    }

    pub fn last_weight(&self) -> Option<WeightReading> {
        self.last_weight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .map(|(reading, _)| reading)
    }

    /// The latest reading if the scale is connected and it is at most
    /// `max_age` old.
    pub fn fresh_weight(&self, max_age: Duration) -> Option<WeightReading> {
        if !self.scale_connected() {
            return None;
        }
        self.last_weight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .filter(|(_, at)| at.elapsed() <= max_age)
            .map(|(reading, _)| reading)
    }

    /// Records `reading` and reports whether it differs from the previous one.
    pub fn update_weight(&self, reading: WeightReading) -> bool {
        let mut slot = self.last_weight.lock().unwrap_or_else(|p| p.into_inner());
        let changed = slot.map_or(true, |(prev, _)| reading.differs_from(&prev));
        *slot = Some((reading, Instant::now()));
        changed
    }

    /// Forgets the latest reading.
    pub fn clear_weight(&self) {
        *self.last_weight.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}
