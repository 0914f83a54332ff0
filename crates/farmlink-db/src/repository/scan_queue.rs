//! # Scan Queue Repository
//!
//! Durable, bounded FIFO of scans captured while the uplink was down.
//!
//! ## Push With Eviction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    push(barcode) under write_lock                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. INSERT INTO scan_queue (...)      → new id (never reused)  │   │
//! │  │  2. SELECT COUNT(*)                   → n                      │   │
//! │  │  3. n > max?  DELETE oldest (n - max) rows, ORDER BY id ASC    │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT (fsync) ← only now does push return Queued { size, evicted }   │
//! │                                                                         │
//! │  SQLITE_FULL / ENOSPC → rollback, return PushOutcome::StorageFull      │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • Ids strictly increase and are never reused (AUTOINCREMENT)          │
//! │  • peek_all() order == insertion order                                 │
//! │  • Never more than max_queue_size rows after a push commits            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use farmlink_core::{QueuedScan, WeightReading};

use crate::error::{DbError, DbResult};

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The scan was committed.
    Queued {
        /// Queue size after the push (and any eviction).
        size: u32,
        /// Oldest records deleted to stay within the bound.
        evicted: u32,
    },
    /// The medium is full; nothing was written.
    StorageFull,
}

/// Repository for the durable scan queue.
#[derive(Debug, Clone)]
pub struct ScanQueueRepository {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    max_size: u32,
}

impl ScanQueueRepository {
    /// Creates a new ScanQueueRepository.
    ///
    /// Every handle that mutates the same database must share `write_lock`;
    /// use [`crate::Database::scan_queue`] rather than calling this directly.
    pub fn new(pool: SqlitePool, write_lock: Arc<Mutex<()>>, max_size: u32) -> Self {
        ScanQueueRepository {
            pool,
            write_lock,
            max_size,
        }
    }

    /// The configured bound.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Appends a scan, evicting the oldest records beyond the bound.
    ///
    /// ## Returns
    /// * `Ok(PushOutcome::Queued { .. })` - committed to disk
    /// * `Ok(PushOutcome::StorageFull)` - medium full, scan not stored
    /// * `Err(DbError)` - any other storage failure
    pub async fn push(
        &self,
        barcode: &str,
        scanned_at: DateTime<Utc>,
        weight: Option<&WeightReading>,
    ) -> DbResult<PushOutcome> {
        let _guard = self.write_lock.lock().await;

        match self.push_locked(barcode, scanned_at, weight).await {
            Ok(outcome) => Ok(outcome),
            Err(DbError::StorageFull(reason)) => {
                warn!(%barcode, %reason, "Scan queue storage full, scan not persisted");
                Ok(PushOutcome::StorageFull)
            }
            Err(e) => Err(e),
        }
    }

    async fn push_locked(
        &self,
        barcode: &str,
        scanned_at: DateTime<Utc>,
        weight: Option<&WeightReading>,
    ) -> DbResult<PushOutcome> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO scan_queue (
                barcode, scanned_at, created_at,
                weight, weight_unit, weight_stable
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id
            "#,
        )
        .bind(barcode)
        .bind(scanned_at)
        .bind(Utc::now())
        .bind(weight.map(|w| w.value))
        .bind(weight.map(|w| w.unit))
        .bind(weight.map(|w| w.stable))
        .fetch_one(&mut *tx)
        .await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_queue")
            .fetch_one(&mut *tx)
            .await?;

        let excess = (count - i64::from(self.max_size)).max(0);
        let evicted = if excess > 0 {
            sqlx::query(
                r#"
                DELETE FROM scan_queue
                WHERE id IN (SELECT id FROM scan_queue ORDER BY id ASC LIMIT ?1)
                "#,
            )
            .bind(excess)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        } else {
            0
        };

        tx.commit()
            .await
            .map_err(|e| match DbError::from(e) {
                full @ DbError::StorageFull(_) => full,
                other => DbError::TransactionFailed(other.to_string()),
            })?;

        let size = count - evicted as i64;
        debug!(id, %barcode, size, "Scan queued");
        if evicted > 0 {
            warn!(evicted, max = self.max_size, "Scan queue full, oldest scans evicted");
        }

        Ok(PushOutcome::Queued {
            size: size as u32,
            evicted: evicted as u32,
        })
    }

    /// Returns every queued scan, oldest first.
    ///
    /// Reads without `write_lock`: a push still in flight is not visible.
    pub async fn peek_all(&self) -> DbResult<Vec<QueuedScan>> {
        let scans = sqlx::query_as::<_, QueuedScan>(
            r#"
            SELECT
                id, barcode, scanned_at, created_at,
                weight, weight_unit, weight_stable
            FROM scan_queue
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(scans)
    }

    /// Deletes one record. Returns false if it was already gone.
    pub async fn remove(&self, id: i64) -> DbResult<bool> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM scan_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes several records in one transaction. Returns how many existed.
    pub async fn remove_batch(&self, ids: &[i64]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut removed = 0;
        for id in ids {
            removed += sqlx::query("DELETE FROM scan_queue WHERE id = ?1")
                .bind(*id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(requested = ids.len(), removed, "Removed queued scans");
        Ok(removed)
    }

    /// Number of queued scans.
    ///
    /// Like [`Self::peek_all`], sees only committed pushes.
    pub async fn size(&self) -> DbResult<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u32)
    }

    /// Deletes every queued scan. Returns how many were removed.
    pub async fn clear(&self) -> DbResult<u64> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM scan_queue")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
