//! # Repository Module
//!
//! Database repository implementations for FarmLink.
//!
//! ```text
//!   db.scan_queue().push("4006381333931", now, None)
//!        │
//!        ▼
//!   ScanQueueRepository
//!   ├── push(&self, barcode, scanned_at, weight)
//!   ├── peek_all(&self)
//!   ├── remove(&self, id) / remove_batch(&self, ids)
//!   ├── size(&self)
//!   └── clear(&self)
//!        │
//!        ▼
//!   SQLite (scan_queue table)
//! ```
//!
//! ## Available Repositories
//!
//! - [`scan_queue::ScanQueueRepository`] - Bounded FIFO of scans awaiting delivery

pub mod scan_queue;
