//! # farmlink-sync: Uplink and Delivery for FarmLink
//!
//! Gets scans and readings to the service, buffering locally while the
//! uplink is down and replaying on reconnect.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Delivery Architecture                            │
//! │                                                                         │
//! │  scale loop ──┐                                   ┌── telemetry loop    │
//! │               ▼                                   ▼                     │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    DeliveryOrchestrator                          │  │
//! │  │                                                                  │  │
//! │  │  live when connected, buffered when not, flush on reconnect     │  │
//! │  └──────┬──────────────────────┬─────────────────────┬──────────────┘  │
//! │         ▼                      ▼                     ▼                  │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌──────────────────────┐  │
//! │  │ Uplink         │  │ ScanQueueRepository│  │ LatestWeightBuffer   │  │
//! │  │ (Transport,    │  │ (farmlink-db)      │  │ one slot             │  │
//! │  │  WebSocket)    │  │ durable FIFO       │  │ newest reading       │  │
//! │  └────────────────┘  └────────────────────┘  └──────────────────────┘  │
//! │         ▲                                                               │
//! │  scanner loop                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`error`] - Sync error types
//! - [`orchestrator`] - Live vs. buffered routing and flush
//! - [`protocol`] - Event types and wire format
//! - [`transport`] - WebSocket client with reconnection
//! - [`uplink`] - The `Uplink` trait the orchestrator talks to
//! - [`weight_buffer`] - Latest-reading slot

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod transport;
pub mod uplink;
pub mod weight_buffer;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{SyncError, SyncResult};
pub use orchestrator::{DeliveryOrchestrator, FlushReport, ScanDelivery, WeightDelivery};
pub use protocol::{BarcodeScan, DebugSnapshot, ScaleWeight, UplinkEvent};
pub use transport::{Transport, TransportConfig, TransportHandle};
pub use uplink::Uplink;
pub use weight_buffer::LatestWeightBuffer;
