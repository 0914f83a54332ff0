//! # Database Error Types
//!
//! Error types for queue storage.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds categorization                           │
//! │       │                                                                 │
//! │       ├── StorageFull ──► ScanQueueRepository::push returns            │
//! │       │                   PushOutcome::StorageFull (not an error)      │
//! │       ▼                                                                 │
//! │  SyncError (farmlink-sync) ← logged, delivery continues                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// SQLite primary result code for "database or disk is full".
const SQLITE_FULL: &str = "13";

/// errno for "No space left on device".
const ENOSPC: i32 = 28;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// The storage medium has no room for another row.
    ///
    /// ## When This Occurs
    /// - SQLite reports SQLITE_FULL
    /// - The filesystem reports ENOSPC while writing the WAL
    #[error("Storage full: {0}")]
    StorageFull(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Returns true if the medium ran out of space.
    pub fn is_storage_full(&self) -> bool {
        matches!(self, DbError::StorageFull(_))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database (code 13)  → DbError::StorageFull
/// sqlx::Error::Io (ENOSPC)         → DbError::StorageFull
/// sqlx::Error::Database (other)    → DbError::QueryFailed
/// sqlx::Error::PoolTimedOut        → DbError::PoolExhausted
/// Other                            → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                let full = db_err.code().as_deref() == Some(SQLITE_FULL)
                    || msg.contains("database or disk is full");

                if full {
                    DbError::StorageFull(msg)
                } else {
                    DbError::QueryFailed(msg)
                }
            }

            sqlx::Error::Io(io) if io.raw_os_error() == Some(ENOSPC) => {
                DbError::StorageFull(io.to_string())
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
