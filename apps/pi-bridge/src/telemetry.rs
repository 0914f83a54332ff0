//! Periodic `scale:debug` diagnostics.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use farmlink_sync::{DebugSnapshot, UplinkEvent};

use crate::context::BridgeContext;

/// Collects the current diagnostics.
pub async fn snapshot(ctx: &BridgeContext) -> DebugSnapshot {
    let queue_size = match ctx.orchestrator.queue().size().await {
        Ok(size) => size,
        Err(e) => {
            debug!(error = %e, "Queue size unavailable");
            0
        }
    };

    DebugSnapshot {
        scale_connected: ctx.scale_connected(),
        serial_port: ctx.config.scale.port.clone(),
        barcode_connected: ctx.scanner_connected(),
        uptime: ctx.uptime_secs(),
        last_weight: ctx.last_weight().map(|r| r.value),
        error_count: ctx.miss_count(),
        queue_size,
        pi_time: Utc::now(),
    }
}

/// Emits a snapshot every `telemetry.interval_secs` while connected.
pub async fn run(ctx: Arc<BridgeContext>, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(ctx.config.telemetry.interval_secs.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(interval_secs = period.as_secs(), "Telemetry loop started");

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        if !ctx.orchestrator.is_connected() {
            continue;
        }

        let snapshot = snapshot(&ctx).await;
        ctx.orchestrator
            .emit_live(UplinkEvent::ScaleDebug(snapshot))
            .await;
    }

    info!("Telemetry loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, context_with};
    use farmlink_core::{WeightReading, WeightUnit};

    #[tokio::test]
    async fn test_snapshot_fields() {
        let (ctx, _uplink) = context_with(false).await;
        ctx.set_scale_connected(true);
        ctx.update_weight(WeightReading::new(7.5, WeightUnit::Kilograms, true));
        ctx.record_miss();
        ctx.orchestrator.deliver_scan("123", None).await.unwrap();

        let snap = snapshot(&ctx).await;

        assert!(snap.scale_connected);
        assert!(!snap.barcode_connected);
        assert_eq!(snap.serial_port, "/dev/ttyUSB0");
        assert_eq!(snap.last_weight, Some(7.5));
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.queue_size, 1);
    }

    #[tokio::test]
    async fn test_run_emits_debug() {
        let (ctx, uplink) = context().await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(ctx, rx));

        // The first tick fires immediately
        for _ in 0..100 {
            if !uplink.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(uplink.sent_names(), vec!["scale:debug"]);
    }
}
