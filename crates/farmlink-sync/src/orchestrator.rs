//! # Delivery Orchestrator
//!
//! Decides, per event, between the live uplink and local buffering, and
//! replays buffered data when the uplink comes back.
//!
//! ## Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DeliveryOrchestrator                             │
//! │                                                                         │
//! │   scan ───► connected? ──yes──► emit barcode:scan ──ok──► done         │
//! │                │ no                     │ failed                        │
//! │                ▼                        ▼                               │
//! │          ScanQueueRepository.push (durable, bounded FIFO)              │
//! │                                                                         │
//! │   reading ─► connected? ──yes──► emit scale:weight                     │
//! │                │ no / failed                                            │
//! │                ▼                                                        │
//! │          LatestWeightBuffer.store (newest wins)                        │
//! │                                                                         │
//! │   status / error / debug ─► emit if connected, else dropped            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Flush (on Disconnected → Connected)
//! ```text
//!   lock flush ─► delete leftovers ─► peek_all ─► pi:sync_start{n}
//!                   │
//!                   ├─ for each scan (oldest first):
//!                   │     emit barcode:scan{buffered, scannedAt}
//!                   │     ok  ─► remove(id)     failed / dropped ─► stop
//!                   │            remove failed ─► remember id, stop
//!                   │     sleep emit_delay
//!                   │
//!                   ├─ pi:sync_complete{sent}      (if still connected)
//!                   └─ drain LatestWeightBuffer ─► scale:weight
//! ```
//!
//! A scan leaves the queue only after its frame was written, so an
//! interrupted flush resumes with exactly the scans not yet delivered.
//! A delivered scan whose row could not be deleted is remembered and
//! skipped by later flushes, which retry the delete first.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use farmlink_core::WeightReading;
use farmlink_db::{PushOutcome, ScanQueueRepository};

use crate::error::SyncResult;
use crate::protocol::UplinkEvent;
use crate::uplink::Uplink;
use crate::weight_buffer::LatestWeightBuffer;

/// Delete attempts for a scan that was just delivered.
const REMOVE_ATTEMPTS: u32 = 3;

const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(20);

// =============================================================================
// Outcomes
// =============================================================================

/// Where a scan ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDelivery {
    /// Written to the uplink.
    Sent,
    /// Persisted in the durable queue.
    Queued { size: u32 },
    /// Uplink down and the medium full; the scan is lost.
    Dropped,
    /// Blank after trimming; nothing to deliver.
    Ignored,
}

/// Where a reading ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightDelivery {
    Sent,
    Buffered,
}

/// Summary of one flush run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Scans in the queue when the flush started.
    pub queued: usize,
    /// Scans delivered.
    pub sent: usize,
    /// True when the buffered reading was delivered.
    pub weight_sent: bool,
    /// False if the flush stopped early.
    pub completed: bool,
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct DeliveryOrchestrator {
    uplink: Arc<dyn Uplink>,
    queue: ScanQueueRepository,
    weights: Arc<LatestWeightBuffer>,
    /// Serializes flushes. Holds ids delivered but not yet deleted.
    flush_lock: Mutex<HashSet<i64>>,
    emit_delay: Duration,
}

impl DeliveryOrchestrator {
    pub fn new(
        uplink: Arc<dyn Uplink>,
        queue: ScanQueueRepository,
        weights: Arc<LatestWeightBuffer>,
        emit_delay: Duration,
    ) -> Self {
        DeliveryOrchestrator {
            uplink,
            queue,
            weights,
            flush_lock: Mutex::new(HashSet::new()),
            emit_delay,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.uplink.is_connected()
    }

    pub fn queue(&self) -> &ScanQueueRepository {
        &self.queue
    }

    pub fn weights(&self) -> &LatestWeightBuffer {
        &self.weights
    }

    // =========================================================================
    // Live Delivery
    // =========================================================================

    /// Sends a scan, or queues it when the uplink is unavailable.
    ///
    /// `weight` is stored alongside a queued scan; it is not sent live.
    pub async fn deliver_scan(
        &self,
        barcode: &str,
        weight: Option<&WeightReading>,
    ) -> SyncResult<ScanDelivery> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return Ok(ScanDelivery::Ignored);
        }

        if self.uplink.is_connected() {
            match self.uplink.emit(UplinkEvent::live_scan(barcode)).await {
                Ok(()) => {
                    info!(%barcode, "Scan sent");
                    return Ok(ScanDelivery::Sent);
                }
                Err(e) => {
                    warn!(%barcode, error = %e, "Live scan emit failed, queueing");
                }
            }
        }

        match self.queue.push(barcode, Utc::now(), weight).await? {
            PushOutcome::Queued { size, .. } => {
                info!(%barcode, queue_size = size, "Scan queued while offline");
                Ok(ScanDelivery::Queued { size })
            }
            PushOutcome::StorageFull => {
                warn!(%barcode, "Scan dropped, queue storage is full");
                Ok(ScanDelivery::Dropped)
            }
        }
    }

    /// Sends a reading, or keeps it as the latest buffered reading.
    pub async fn deliver_weight(&self, reading: WeightReading) -> WeightDelivery {
        if self.uplink.is_connected() {
            match self.uplink.emit(UplinkEvent::weight(reading)).await {
                Ok(()) => return WeightDelivery::Sent,
                Err(e) => debug!(error = %e, "Weight emit failed, buffering"),
            }
        }

        self.weights.store(reading);
        WeightDelivery::Buffered
    }

    /// Emits a live-only event. Returns false if it was dropped.
    pub async fn emit_live(&self, event: UplinkEvent) -> bool {
        if !self.uplink.is_connected() {
            debug!(event = event.name(), "Dropping live-only event while offline");
            return false;
        }

        let name = event.name();
        match self.uplink.emit(event).await {
            Ok(()) => true,
            Err(e) => {
                debug!(event = name, error = %e, "Live-only event not delivered");
                false
            }
        }
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Replays queued scans and the buffered reading.
    ///
    /// Runs are serialized; a caller arriving mid-flush waits, then takes a
    /// fresh snapshot.
    pub async fn flush(&self) -> SyncResult<FlushReport> {
        let mut unremoved = self.flush_lock.lock().await;
        let mut report = FlushReport::default();

        if !self.uplink.is_connected() {
            debug!("Flush skipped, uplink down");
            return Ok(report);
        }

        self.retry_unremoved(&mut unremoved).await;

        let pending: Vec<_> = self
            .queue
            .peek_all()
            .await?
            .into_iter()
            .filter(|scan| !unremoved.contains(&scan.id))
            .collect();
        report.queued = pending.len();
        report.completed = true;

        if !pending.is_empty() {
            info!(count = pending.len(), "Flushing queued scans");

            let start = UplinkEvent::SyncStart {
                barcode_count: pending.len(),
            };
            if let Err(e) = self.uplink.emit(start).await {
                warn!(error = %e, "Flush aborted before start");
                report.completed = false;
                return Ok(report);
            }

            for (i, scan) in pending.iter().enumerate() {
                if !self.uplink.is_connected() {
                    warn!(sent = report.sent, remaining = pending.len() - i, "Uplink dropped during flush");
                    report.completed = false;
                    break;
                }

                if let Err(e) = self.uplink.emit(UplinkEvent::buffered_scan(scan)).await {
                    warn!(id = scan.id, error = %e, sent = report.sent, "Flush aborted, remaining scans stay queued");
                    report.completed = false;
                    break;
                }
                report.sent += 1;

                if !self.remove_delivered(scan.id).await {
                    // Delivered but still stored; never emit it again
                    unremoved.insert(scan.id);
                    report.completed = false;
                    break;
                }
                debug!(id = scan.id, barcode = %scan.barcode, "Queued scan delivered");

                if i + 1 < pending.len() {
                    tokio::time::sleep(self.emit_delay).await;
                }
            }

            if self.uplink.is_connected() {
                let complete = UplinkEvent::SyncComplete {
                    barcode_count: report.sent,
                };
                if let Err(e) = self.uplink.emit(complete).await {
                    debug!(error = %e, "Flush completion not delivered");
                }
            }

            info!(sent = report.sent, queued = report.queued, completed = report.completed, "Flush finished");
        }

        if self.uplink.is_connected() {
            if let Some(reading) = self.weights.get_and_clear() {
                match self.uplink.emit(UplinkEvent::weight(reading)).await {
                    Ok(()) => report.weight_sent = true,
                    Err(e) => {
                        debug!(error = %e, "Buffered weight not delivered");
                        self.weights.restore(reading);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Deletes a delivered scan, retrying a few times.
    ///
    /// Returns false if the row could not be deleted.
    async fn remove_delivered(&self, id: i64) -> bool {
        for attempt in 1..=REMOVE_ATTEMPTS {
            match self.queue.remove(id).await {
                Ok(_) => return true,
                Err(e) => {
                    warn!(id, attempt, max_attempts = REMOVE_ATTEMPTS, error = %e, "Failed to remove delivered scan");
                    if attempt < REMOVE_ATTEMPTS {
                        tokio::time::sleep(REMOVE_RETRY_DELAY).await;
                    }
                }
            }
        }
        error!(id, "Delivered scan left in queue, it will not be sent again");
        false
    }

    /// Deletes scans delivered by an earlier flush whose removal failed.
    async fn retry_unremoved(&self, unremoved: &mut HashSet<i64>) {
        if unremoved.is_empty() {
            return;
        }

        let ids: Vec<i64> = unremoved.iter().copied().collect();
        match self.queue.remove_batch(&ids).await {
            Ok(removed) => {
                debug!(count = ids.len(), removed, "Removed previously delivered scans");
                unremoved.clear();
            }
            Err(e) => warn!(count = ids.len(), error = %e, "Previously delivered scans still queued"),
        }
    }

    /// Watches the uplink and starts a flush on every reconnect.
    ///
    /// A flush also runs at start if the uplink is already connected.
    pub fn spawn_reconnect_watcher(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut state_rx = self.uplink.subscribe();
            let mut was_connected = false;

            loop {
                let connected = state_rx.borrow_and_update().is_connected();
                if connected && !was_connected {
                    info!("Uplink connected, starting flush");
                    let orchestrator = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = orchestrator.flush().await {
                            error!(error = %e, "Flush failed");
                        }
                    });
                } else if !connected && was_connected {
                    warn!("Uplink disconnected, buffering locally");
                }
                was_connected = connected;

                tokio::select! {
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            debug!("Uplink state channel closed");
                            break;
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }

            debug!("Reconnect watcher stopped");
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use async_trait::async_trait;
    use farmlink_core::{ConnectionState, WeightUnit};
    use farmlink_db::{Database, DbConfig};
    use std::sync::Mutex as StdMutex;

    /// Records emitted events. Can be told to drop after N more emits.
    struct FakeUplink {
        state_tx: watch::Sender<ConnectionState>,
        sent: StdMutex<Vec<UplinkEvent>>,
        drop_after: StdMutex<Option<usize>>,
    }

    impl FakeUplink {
        fn new(connected: bool) -> Arc<Self> {
            let state = if connected {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            };
            Arc::new(FakeUplink {
                state_tx: watch::channel(state).0,
                sent: StdMutex::new(Vec::new()),
                drop_after: StdMutex::new(None),
            })
        }

        fn set_connected(&self, connected: bool) {
            let state = if connected {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            };
            self.state_tx.send_replace(state);
        }

        fn drop_after(&self, emits: usize) {
            *self.drop_after.lock().unwrap() = Some(emits);
        }

        fn sent(&self) -> Vec<UplinkEvent> {
            self.sent.lock().unwrap().clone()
        }

        fn sent_barcodes(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|e| match e {
                    UplinkEvent::BarcodeScan(scan) => Some(scan.barcode),
                    _ => None,
                })
                .collect()
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
            {
                let mut drop_after = self.drop_after.lock().unwrap();
                if let Some(left) = drop_after.as_mut() {
                    if *left == 0 {
                        *drop_after = None;
                        self.state_tx.send_replace(ConnectionState::Disconnected);
                        return Err(SyncError::Disconnected);
                    }
                    *left -= 1;
                }
            }
            self.sent.lock().unwrap().push(event);
            Ok(())
        }

        fn subscribe(&self) -> watch::Receiver<ConnectionState> {
            self.state_tx.subscribe()
        }
    }

    async fn setup(connected: bool) -> (Arc<DeliveryOrchestrator>, Arc<FakeUplink>, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let uplink = FakeUplink::new(connected);
        let orchestrator = Arc::new(DeliveryOrchestrator::new(
            uplink.clone(),
            db.scan_queue(),
            Arc::new(LatestWeightBuffer::new()),
            Duration::from_millis(50),
        ));
        (orchestrator, uplink, db)
    }

    async fn queue_offline(orchestrator: &DeliveryOrchestrator, barcodes: &[&str]) {
        for barcode in barcodes {
            let delivery = orchestrator.deliver_scan(barcode, None).await.unwrap();
            assert!(matches!(delivery, ScanDelivery::Queued { .. }));
        }
    }

    #[tokio::test]
    async fn test_live_scan_sent() {
        let (orchestrator, uplink, _db) = setup(true).await;

        let delivery = orchestrator.deliver_scan("  4006381333931 ", None).await.unwrap();

        assert_eq!(delivery, ScanDelivery::Sent);
        assert_eq!(uplink.sent(), vec![UplinkEvent::live_scan("4006381333931")]);
        assert_eq!(orchestrator.queue().size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_scan_ignored() {
        let (orchestrator, uplink, _db) = setup(false).await;

        let delivery = orchestrator.deliver_scan("   ", None).await.unwrap();

        assert_eq!(delivery, ScanDelivery::Ignored);
        assert!(uplink.sent().is_empty());
        assert_eq!(orchestrator.queue().size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_scan_queued_with_weight() {
        let (orchestrator, _uplink, _db) = setup(false).await;
        let reading = WeightReading::new(12.5, WeightUnit::Kilograms, true);

        let delivery = orchestrator.deliver_scan("LOT-42", Some(&reading)).await.unwrap();

        assert_eq!(delivery, ScanDelivery::Queued { size: 1 });
        let queued = orchestrator.queue().peek_all().await.unwrap();
        assert_eq!(queued[0].barcode, "LOT-42");
        assert_eq!(queued[0].weight_reading(), Some(reading));
    }

    #[tokio::test]
    async fn test_failed_live_scan_falls_back_to_queue() {
        let (orchestrator, uplink, _db) = setup(true).await;
        uplink.drop_after(0);

        let delivery = orchestrator.deliver_scan("LOT-1", None).await.unwrap();

        assert_eq!(delivery, ScanDelivery::Queued { size: 1 });
        assert!(uplink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_offline_weight_buffered_newest_wins() {
        let (orchestrator, uplink, _db) = setup(false).await;

        orchestrator
            .deliver_weight(WeightReading::new(1.0, WeightUnit::Kilograms, false))
            .await;
        let delivery = orchestrator
            .deliver_weight(WeightReading::new(1.2, WeightUnit::Kilograms, true))
            .await;

        assert_eq!(delivery, WeightDelivery::Buffered);
        assert!(uplink.sent().is_empty());
        assert_eq!(
            orchestrator.weights().get(),
            Some(WeightReading::new(1.2, WeightUnit::Kilograms, true))
        );
    }

    #[tokio::test]
    async fn test_live_only_events_dropped_offline() {
        let (orchestrator, uplink, _db) = setup(false).await;

        assert!(!orchestrator.emit_live(UplinkEvent::scale_status(true)).await);

        uplink.set_connected(true);
        assert!(orchestrator.emit_live(UplinkEvent::scale_status(true)).await);
        assert_eq!(uplink.sent(), vec![UplinkEvent::scale_status(true)]);
    }

    #[tokio::test]
    async fn test_flush_sequence() {
        let (orchestrator, uplink, _db) = setup(false).await;
        queue_offline(&orchestrator, &["A", "B", "C"]).await;
        orchestrator
            .deliver_weight(WeightReading::new(3.0, WeightUnit::Pounds, true))
            .await;

        uplink.set_connected(true);
        let report = orchestrator.flush().await.unwrap();

        assert_eq!(
            report,
            FlushReport {
                queued: 3,
                sent: 3,
                weight_sent: true,
                completed: true
            }
        );

        let sent = uplink.sent();
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[0], UplinkEvent::SyncStart { barcode_count: 3 });
        assert_eq!(uplink.sent_barcodes(), vec!["A", "B", "C"]);
        match &sent[1] {
            UplinkEvent::BarcodeScan(scan) => {
                assert_eq!(scan.buffered, Some(true));
                assert!(scan.scanned_at.is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(sent[4], UplinkEvent::SyncComplete { barcode_count: 3 });
        assert_eq!(
            sent[5],
            UplinkEvent::weight(WeightReading::new(3.0, WeightUnit::Pounds, true))
        );

        assert_eq!(orchestrator.queue().size().await.unwrap(), 0);
        assert!(!orchestrator.weights().has_value());
    }

    #[tokio::test]
    async fn test_flush_spacing() {
        let (orchestrator, uplink, _db) = setup(false).await;
        queue_offline(&orchestrator, &["A", "B", "C"]).await;
        uplink.set_connected(true);

        let start = tokio::time::Instant::now();
        orchestrator.flush().await.unwrap();

        // Two gaps between three scans
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_interrupted_flush_resumes_exactly_once() {
        let (orchestrator, uplink, _db) = setup(false).await;
        queue_offline(&orchestrator, &["A", "B", "C", "D"]).await;
        orchestrator
            .deliver_weight(WeightReading::new(5.0, WeightUnit::Grams, true))
            .await;

        // sync_start, A, B succeed; the link drops on C
        uplink.set_connected(true);
        uplink.drop_after(3);
        let first = orchestrator.flush().await.unwrap();

        assert_eq!(first.sent, 2);
        assert!(!first.completed);
        assert!(!first.weight_sent);
        assert_eq!(orchestrator.queue().size().await.unwrap(), 2);
        // The buffered reading survives an aborted flush
        assert!(orchestrator.weights().has_value());

        uplink.set_connected(true);
        let second = orchestrator.flush().await.unwrap();

        assert_eq!(second.queued, 2);
        assert_eq!(second.sent, 2);
        assert!(second.completed);
        assert_eq!(uplink.sent_barcodes(), vec!["A", "B", "C", "D"]);
        assert_eq!(orchestrator.queue().size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_remove_not_redelivered() {
        let (orchestrator, uplink, db) = setup(false).await;
        queue_offline(&orchestrator, &["A", "B"]).await;

        sqlx::query(
            "CREATE TRIGGER block_delete BEFORE DELETE ON scan_queue \
             BEGIN SELECT RAISE(ABORT, 'disk io'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        uplink.set_connected(true);
        let first = orchestrator.flush().await.unwrap();

        assert_eq!(first.sent, 1);
        assert!(!first.completed);
        assert_eq!(
            uplink.sent(),
            vec![
                UplinkEvent::SyncStart { barcode_count: 2 },
                UplinkEvent::buffered_scan(&orchestrator.queue().peek_all().await.unwrap()[0]),
                UplinkEvent::SyncComplete { barcode_count: 1 },
            ]
        );
        assert_eq!(orchestrator.queue().size().await.unwrap(), 2);

        sqlx::query("DROP TRIGGER block_delete")
            .execute(db.pool())
            .await
            .unwrap();

        let second = orchestrator.flush().await.unwrap();

        assert_eq!(second.queued, 1);
        assert_eq!(second.sent, 1);
        assert!(second.completed);
        assert_eq!(uplink.sent_barcodes(), vec!["A", "B"]);
        assert_eq!(orchestrator.queue().size().await.unwrap(), 0);

        let starts = uplink
            .sent()
            .iter()
            .filter(|e| matches!(e, UplinkEvent::SyncStart { .. }))
            .count();
        let completes = uplink
            .sent()
            .iter()
            .filter(|e| matches!(e, UplinkEvent::SyncComplete { .. }))
            .count();
        assert_eq!((starts, completes), (2, 2));
    }

    #[tokio::test]
    async fn test_offline_scan_dropped_when_storage_full() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("queue.db")).max_connections(1))
            .await
            .unwrap();
        let uplink = FakeUplink::new(false);
        let orchestrator = DeliveryOrchestrator::new(
            uplink.clone(),
            db.scan_queue(),
            Arc::new(LatestWeightBuffer::new()),
            Duration::from_millis(1),
        );

        let pages: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(db.pool())
            .await
            .unwrap();
        sqlx::query(&format!("PRAGMA max_page_count = {pages}"))
            .execute(db.pool())
            .await
            .unwrap();

        let big = "9".repeat(16 * 1024);
        let delivery = orchestrator.deliver_scan(&big, None).await.unwrap();

        assert_eq!(delivery, ScanDelivery::Dropped);
        assert_eq!(orchestrator.queue().size().await.unwrap(), 0);
        assert!(uplink.sent().is_empty());
        db.close().await;
    }

    #[tokio::test]
    async fn test_concurrent_flushes_do_not_duplicate() {
        let (orchestrator, uplink, _db) = setup(false).await;
        queue_offline(&orchestrator, &["A", "B", "C"]).await;
        uplink.set_connected(true);

        let (first, second) = tokio::join!(orchestrator.flush(), orchestrator.flush());

        assert_eq!(first.unwrap().sent + second.unwrap().sent, 3);
        assert_eq!(uplink.sent_barcodes(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_empty_flush_sends_only_weight() {
        let (orchestrator, uplink, _db) = setup(false).await;
        orchestrator
            .deliver_weight(WeightReading::new(0.5, WeightUnit::Ounces, false))
            .await;

        uplink.set_connected(true);
        let report = orchestrator.flush().await.unwrap();

        assert_eq!(report.queued, 0);
        assert!(report.weight_sent);
        assert_eq!(uplink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_watcher_triggers_flush() {
        let (orchestrator, uplink, _db) = setup(false).await;
        queue_offline(&orchestrator, &["A", "B"]).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = Arc::clone(&orchestrator).spawn_reconnect_watcher(shutdown_rx);

        uplink.set_connected(true);
        for _ in 0..50 {
            if orchestrator.queue().size().await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(uplink.sent_barcodes(), vec!["A", "B"]);

        shutdown_tx.send(true).unwrap();
        watcher.await.unwrap();
    }
}
