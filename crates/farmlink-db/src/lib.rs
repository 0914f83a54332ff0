//! # farmlink-db: Durable Scan Queue for FarmLink
//!
//! SQLite storage that keeps scans safe while the uplink is down.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FarmLink Data Flow                               │
//! │                                                                         │
//! │  DeliveryOrchestrator (farmlink-sync)                                  │
//! │       │ uplink down: push       reconnect: peek_all + remove           │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   farmlink-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌─────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories   │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ ScanQueueRepo   │   │  (embedded)  │  │   │
//! │  │   │ + write lock  │    │                 │   │ 001_scan_... │  │   │
//! │  │   └───────────────┘    └─────────────────┘   └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │   /var/lib/farmlink/queue.db (WAL, synchronous=FULL)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use farmlink_db::{Database, DbConfig, PushOutcome};
//!
//! let db = Database::new(DbConfig::new("queue.db")).await?;
//! match db.scan_queue().push("4006381333931", Utc::now(), None).await? {
//!     PushOutcome::Queued { size, .. } => info!(size, "queued"),
//!     PushOutcome::StorageFull => warn!("disk full"),
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::scan_queue::{PushOutcome, ScanQueueRepository};
