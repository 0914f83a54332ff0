//! # FarmLink Pi Bridge
//!
//! Edge daemon connecting a serial scale and a USB barcode scanner to the
//! FarmLink service.
//!
//! ## Startup Sequence
//! ```text
//! 1. Initialize tracing (logging)
//! 2. Load configuration (defaults → bridge.toml → environment)
//! 3. Open the SQLite scan queue
//! 4. Spawn the WebSocket transport
//! 5. Start the delivery orchestrator and its reconnect watcher
//! 6. Spawn the scale, scanner and telemetry loops
//! 7. Wait for Ctrl+C / SIGTERM, then stop everything in order
//! ```
//!
//! ## Usage
//! ```text
//! pi-bridge [--config <path>]
//! ```

mod config;
mod context;
mod scale_loop;
mod scanner_loop;
mod telemetry;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use farmlink_db::Database;
use farmlink_devices::{ScaleController, TokioSerialOpener};
use farmlink_sync::{DeliveryOrchestrator, LatestWeightBuffer, Transport, Uplink};

use crate::config::BridgeConfig;
use crate::context::BridgeContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting FarmLink Pi bridge");

    let config = BridgeConfig::load(config_path_from_args()).context("Invalid configuration")?;
    info!(
        device_id = %config.device.id,
        device_name = %config.device.name,
        server = %config.uplink.url,
        serial_port = %config.scale.port,
        "Configuration loaded"
    );

    if let Some(parent) = config.buffer.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
    }
    let db = Database::new(config.db_config())
        .await
        .context("Failed to open scan queue")?;

    let (transport, transport_task) = Transport::spawn(config.transport_config())?;
    let uplink: Arc<dyn Uplink> = Arc::new(transport.clone());

    let orchestrator = Arc::new(DeliveryOrchestrator::new(
        uplink,
        db.scan_queue(),
        Arc::new(LatestWeightBuffer::new()),
        Duration::from_millis(config.flush.emit_delay_ms),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watcher = Arc::clone(&orchestrator).spawn_reconnect_watcher(shutdown_rx.clone());

    let ctx = Arc::new(BridgeContext::new(config, orchestrator));

    let mut tasks = Vec::new();

    let scale = ScaleController::new(TokioSerialOpener, ctx.config.scale_settings());
    tasks.push(tokio::spawn(scale_loop::run(
        Arc::clone(&ctx),
        scale,
        shutdown_rx.clone(),
    )));

    if ctx.config.scanner.enabled {
        match spawn_scanner(&ctx, shutdown_rx.clone()) {
            Some(task) => tasks.push(task),
            None => warn!("Barcode scanner not supported on this platform"),
        }
    } else {
        info!("Barcode scanner disabled");
    }

    tasks.push(tokio::spawn(telemetry::run(Arc::clone(&ctx), shutdown_rx)));

    info!("Pi bridge running");
    shutdown_signal().await;

    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Loop task panicked");
        }
    }
    let _ = watcher.await;

    if let Err(e) = transport.shutdown().await {
        warn!(error = %e, "Transport already stopped");
    }
    let _ = transport_task.await;

    db.close().await;

    info!("Pi bridge stopped");
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=farmlink=trace` - Show trace for farmlink crates only
/// - Default: INFO level
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,farmlink=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Reads `--config <path>` from the command line.
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn spawn_scanner(
    ctx: &Arc<BridgeContext>,
    shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let opener = farmlink_devices::EvdevScannerOpener::new(ctx.config.scanner_settings());
    Some(tokio::spawn(scanner_loop::run(
        Arc::clone(ctx),
        opener,
        shutdown,
    )))
}

#[cfg(not(target_os = "linux"))]
fn spawn_scanner(
    _ctx: &Arc<BridgeContext>,
    _shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    None
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
