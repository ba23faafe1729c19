//! # Store Error Types
//!
//! Errors for durable queue operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← Adds context and categorization            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (biolink-sync) ← Attributed to the item concerned           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Item not found in the queue.
    #[error("Sync item not found: {id}")]
    NotFound { id: String },

    /// Attempted to insert an item whose id already exists.
    #[error("Duplicate sync item id: {id}")]
    DuplicateId { id: String },

    /// Store file could not be opened or created.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A persisted row could not be decoded back into a domain item.
    ///
    /// This indicates on-disk corruption or a schema/code mismatch; the
    /// offending row id is included so an operator can inspect it.
    #[error("Corrupt queue row {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    /// Payload (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal store error.
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Creates a CorruptRow error.
    pub fn corrupt(id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        StoreError::CorruptRow {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convert sqlx errors to StoreError.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                // SQLite reports "UNIQUE constraint failed: sync_queue.id"
                if msg.contains("UNIQUE constraint failed") {
                    StoreError::DuplicateId {
                        id: "unknown".to_string(),
                    }
                } else {
                    StoreError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => StoreError::PoolExhausted,

            sqlx::Error::PoolClosed => StoreError::ConnectionFailed("Pool is closed".to_string()),

            _ => StoreError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
