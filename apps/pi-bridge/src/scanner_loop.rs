//! # Scanner Loop
//!
//! Keeps the barcode scanner open and hands completed scans to delivery.
//!
//! ```text
//!   open (saved path for the first 2 tries, then discovery)
//!     │ fail after N tries ─► pause 10 s, retry
//!     ▼
//!   read_scan(5 s) ──scan──► deliver_scan(text, fresh weight or none)
//!     │ none ─► idle count, liveness log every 12
//!     │ error ─► reopen
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use farmlink_devices::{KeySource, ScanReader, ScannerOpener};
use farmlink_sync::ScanDelivery;

use crate::context::BridgeContext;

/// Pause after every open attempt failed.
const OPEN_FAILED_PAUSE: Duration = Duration::from_secs(10);

/// Attempts that reuse the last known device path before rediscovering.
const SAVED_PATH_ATTEMPTS: u32 = 2;

/// Empty reads between liveness logs.
const LIVENESS_INTERVAL: u32 = 12;

/// Oldest reading a scan is tagged with.
pub(crate) const WEIGHT_TAG_MAX_AGE: Duration = Duration::from_secs(30);

/// Runs until `shutdown` flips.
pub async fn run<O: ScannerOpener>(
    ctx: Arc<BridgeContext>,
    opener: O,
    mut shutdown: watch::Receiver<bool>,
) {
    let settings = &ctx.config.scanner;
    let policy = match ctx.config.completion_policy() {
        Ok(policy) => policy,
        Err(e) => {
            error!(error = %e, "Scanner loop not started");
            return;
        }
    };
    let read_timeout = Duration::from_secs(settings.read_timeout_secs);
    let retry_delay = Duration::from_millis(settings.reconnect_delay_ms);
    let mut saved_path = settings.device_path.clone();

    info!(?policy, capture = ?settings.capture, "Scanner loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let opened = tokio::select! {
            source = open_scanner(&opener, saved_path.as_deref(), settings.reconnect_attempts, retry_delay) => source,
            _ = shutdown.changed() => break,
        };

        let source = match opened {
            Some(source) => source,
            None => {
                error!(pause_secs = OPEN_FAILED_PAUSE.as_secs(), "Scanner unavailable");
                tokio::select! {
                    _ = tokio::time::sleep(OPEN_FAILED_PAUSE) => {}
                    _ = shutdown.changed() => break,
                }
                continue;
            }
        };

        let mut reader = ScanReader::new(source, policy, settings.flush_partial_on_timeout);
        saved_path = Some(reader.path().to_string());
        ctx.set_scanner_connected(true);

        let stopped = read_scans(&ctx, &mut reader, read_timeout, &mut shutdown).await;
        ctx.set_scanner_connected(false);
        if stopped {
            break;
        }
    }

    ctx.set_scanner_connected(false);
    info!("Scanner loop stopped");
}

/// Tries to open the scanner up to `attempts` times.
pub(crate) async fn open_scanner<O: ScannerOpener>(
    opener: &O,
    saved_path: Option<&str>,
    attempts: u32,
    delay: Duration,
) -> Option<O::Source> {
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        let hint = saved_path.filter(|_| attempt <= SAVED_PATH_ATTEMPTS);
        match opener.open(hint).await {
            Ok(source) => {
                info!(path = %source.path(), attempt, "Scanner connected");
                return Some(source);
            }
            Err(e) => {
                warn!(attempt, max_attempts = attempts, hint = ?hint, error = %e, "Scanner open failed");
            }
        }

        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }

    None
}

/// Reads until the device fails. Returns true if shutdown was requested.
pub(crate) async fn read_scans<S: farmlink_devices::KeySource>(
    ctx: &BridgeContext,
    reader: &mut ScanReader<S>,
    read_timeout: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let mut idle: u32 = 0;

    loop {
        let result = tokio::select! {
            result = reader.read_scan(Some(read_timeout)) => result,
            _ = shutdown.changed() => return true,
        };

        match result {
            Ok(Some(scan)) => {
                idle = 0;
                debug!(barcode = %scan.text, completion = %scan.completion, "Scan read");

                let weight = ctx.fresh_weight(WEIGHT_TAG_MAX_AGE);
                match ctx.orchestrator.deliver_scan(&scan.text, weight.as_ref()).await {
                    Ok(ScanDelivery::Dropped) => {
                        error!(barcode = %scan.text, "Scan lost, offline queue unavailable");
                    }
                    Ok(_) => {}
                    Err(e) => error!(barcode = %scan.text, error = %e, "Scan delivery failed"),
                }
            }
            Ok(None) => {
                idle += 1;
                if idle % LIVENESS_INTERVAL == 0 {
                    info!(path = %reader.path(), idle_reads = idle, "Scanner alive, waiting for scans");
                }
            }
            Err(e) => {
                warn!(path = %reader.path(), error = %e, "Scanner lost");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, context_with, typed, FakeScannerOpener};
    use farmlink_core::{CompletionPolicy, WeightReading, WeightUnit};
    use farmlink_sync::UplinkEvent;

    #[tokio::test]
    async fn test_saved_path_then_discovery() {
        let opener = FakeScannerOpener::default();

        let source = open_scanner(&opener, Some("/dev/input/event3"), 4, Duration::from_millis(1)).await;

        assert!(source.is_none());
        let hints = opener.state.lock().unwrap().hints.clone();
        assert_eq!(
            hints,
            vec![
                Some("/dev/input/event3".to_string()),
                Some("/dev/input/event3".to_string()),
                None,
                None
            ]
        );
    }

    #[tokio::test]
    async fn test_open_succeeds() {
        let opener = FakeScannerOpener::default();
        opener.state.lock().unwrap().scripts.push_back(typed("1"));

        let source = open_scanner(&opener, None, 5, Duration::from_millis(1)).await;

        assert!(source.is_some());
        assert_eq!(opener.state.lock().unwrap().hints.len(), 1);
    }

    #[tokio::test]
    async fn test_scans_delivered_live() {
        let (ctx, uplink) = context().await;
        let opener = FakeScannerOpener::default();
        let mut script = typed("4006381333931");
        script.extend(typed("12345"));
        opener.state.lock().unwrap().scripts.push_back(script);

        let source = open_scanner(&opener, None, 1, Duration::ZERO).await.unwrap();
        let mut reader = ScanReader::new(source, CompletionPolicy::Terminator, true);
        let (_tx, mut rx) = watch::channel(false);

        // Script exhaustion surfaces as a device error
        let stopped = read_scans(&ctx, &mut reader, Duration::from_secs(1), &mut rx).await;

        assert!(!stopped);
        assert_eq!(
            uplink.sent(),
            vec![
                UplinkEvent::live_scan("4006381333931"),
                UplinkEvent::live_scan("12345")
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_scan_tagged_with_weight() {
        let (ctx, uplink) = context_with(false).await;
        ctx.set_scale_connected(true);
        ctx.update_weight(WeightReading::new(4.2, WeightUnit::Kilograms, true));

        let opener = FakeScannerOpener::default();
        opener.state.lock().unwrap().scripts.push_back(typed("777"));
        let source = open_scanner(&opener, None, 1, Duration::ZERO).await.unwrap();
        let mut reader = ScanReader::new(source, CompletionPolicy::Terminator, true);
        let (_tx, mut rx) = watch::channel(false);

        read_scans(&ctx, &mut reader, Duration::from_secs(1), &mut rx).await;

        assert!(uplink.sent().is_empty());
        let queued = ctx.orchestrator.queue().peek_all().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].barcode, "777");
        assert_eq!(queued[0].weight_reading().unwrap().value, 4.2);
    }

    #[tokio::test]
    async fn test_scan_after_scale_loss_untagged() {
        let (ctx, _uplink) = context_with(false).await;
        ctx.set_scale_connected(true);
        ctx.update_weight(WeightReading::new(4.2, WeightUnit::Kilograms, true));
        // Scale unplugged; the loop has not cleared the reading yet
        ctx.set_scale_connected(false);

        let opener = FakeScannerOpener::default();
        opener.state.lock().unwrap().scripts.push_back(typed("888"));
        let source = open_scanner(&opener, None, 1, Duration::ZERO).await.unwrap();
        let mut reader = ScanReader::new(source, CompletionPolicy::Terminator, true);
        let (_tx, mut rx) = watch::channel(false);

        read_scans(&ctx, &mut reader, Duration::from_secs(1), &mut rx).await;

        let queued = ctx.orchestrator.queue().peek_all().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].barcode, "888");
        assert!(queued[0].weight_reading().is_none());
    }

    #[tokio::test]
    async fn test_run_reopens_after_device_loss() {
        let (ctx, uplink) = context().await;
        let opener = FakeScannerOpener::default();
        {
            let mut state = opener.state.lock().unwrap();
            state.scripts.push_back(typed("111"));
            state.scripts.push_back(typed("222"));
        }
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(ctx.clone(), opener.clone(), rx));

        for _ in 0..100 {
            if uplink.sent().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(
            uplink.sent(),
            vec![UplinkEvent::live_scan("111"), UplinkEvent::live_scan("222")]
        );
        // The second open reused the path the first one found
        let hints = opener.state.lock().unwrap().hints.clone();
        assert_eq!(hints[1].as_deref(), Some("/dev/input/event7"));
        assert!(!ctx.scanner_connected());
    }
}
