//! # Scale Loop
//!
//! Keeps the scale connected and forwards readings.
//!
//! ```text
//!   ┌──────────────┐  no   ┌───────────────────────────────┐
//!   │ connected? ──┼──────►│ forget weight, status{false}  │
//!   └──────┬───────┘       │ reconnect (backoff, N tries)  │
//!          │ yes           │  ok   ─► scale:status{true}   │
//!          ▼               │  fail ─► scale:error, pause   │
//!   ┌──────────────┐       └───────────────────────────────┘
//!   │ poll()       │
//!   └──────┬───────┘
//!          │ reading: changed? ─► deliver_weight
//!          │ none:    count miss, note every 10th
//!          ▼
//!   sleep read_interval
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use farmlink_devices::{LinkOpener, ScaleController};
use farmlink_sync::UplinkEvent;

use crate::context::BridgeContext;

/// Pause after reconnect attempts are exhausted.
const PORT_LOST_PAUSE: Duration = Duration::from_secs(5);

/// Empty reads between backlog notes.
const MISS_REPORT_THRESHOLD: u32 = 10;

pub const PORT_LOST_MESSAGE: &str = "Serial port lost";

/// Runs until `shutdown` flips.
pub async fn run<O: LinkOpener>(
    ctx: Arc<BridgeContext>,
    mut controller: ScaleController<O>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        port = %controller.settings().port,
        mode = %controller.settings().mode,
        "Scale loop started"
    );

    let read_interval = Duration::from_millis(ctx.config.scale.read_interval_ms);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let pause = tokio::select! {
            pause = cycle(&ctx, &mut controller, read_interval) => pause,
            _ = shutdown.changed() => break,
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = shutdown.changed() => break,
        }
    }

    controller.close().await;
    ctx.set_scale_connected(false);
    ctx.clear_weight();
    info!("Scale loop stopped");
}

/// One pass of the loop. Returns how long to wait before the next.
pub(crate) async fn cycle<O: LinkOpener>(
    ctx: &BridgeContext,
    controller: &mut ScaleController<O>,
    read_interval: Duration,
) -> Duration {
    if !controller.is_connected() {
        ctx.clear_weight();
        if ctx.set_scale_connected(false) {
            ctx.orchestrator
                .emit_live(UplinkEvent::scale_status(false))
                .await;
        }

        let outcome = controller.reconnect().await;
        if !outcome.connected {
            error!(attempts = outcome.attempts, "Scale reconnect failed");
            ctx.orchestrator
                .emit_live(UplinkEvent::scale_error(PORT_LOST_MESSAGE))
                .await;
            return PORT_LOST_PAUSE;
        }

        ctx.set_scale_connected(true);
        ctx.reset_misses();
        ctx.orchestrator
            .emit_live(UplinkEvent::scale_status(true))
            .await;
        return Duration::ZERO;
    }

    match controller.poll().await {
        Some(reading) => {
            ctx.reset_misses();
            if !ctx.set_scale_connected(true) {
                ctx.orchestrator
                    .emit_live(UplinkEvent::scale_status(true))
                    .await;
            }

            if ctx.update_weight(reading) {
                debug!(value = reading.value, unit = %reading.unit.as_str(), stable = reading.stable, "Weight changed");
                ctx.orchestrator.deliver_weight(reading).await;
            }
        }
        None if controller.is_connected() => {
            let misses = ctx.record_miss();
            if misses >= MISS_REPORT_THRESHOLD {
                debug!(misses, "No scale data, backlog flushed; link still open");
                ctx.reset_misses();
            }
        }
        // Link dropped during the read; reconnect next pass
        None => return Duration::ZERO,
    }

    read_interval
}
