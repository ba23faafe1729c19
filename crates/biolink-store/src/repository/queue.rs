//! # Sync Queue Repository
//!
//! Data access for the `sync_queue` table.
//!
//! ## The Queue Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Durable Queue Implementation                         │
//! │                                                                         │
//! │  PRODUCER (measurement/calibration logic)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO sync_queue (id, kind, payload, priority, status, ...)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            SYNC ENGINE (async drain)                            │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT * FROM sync_queue WHERE status = 'pending'          │   │
//! │  │     ORDER BY priority DESC, created_at ASC LIMIT batch         │   │
//! │  │                                                                 │   │
//! │  │  2. For each item:                                             │   │
//! │  │     a. UPDATE ... SET status='syncing', attempts+1             │   │
//! │  │     b. POST to remote endpoint                                 │   │
//! │  │     c. On 2xx:  status='synced', synced_at=NOW()               │   │
//! │  │     d. On 409:  status='conflict', remote_response=body        │   │
//! │  │     e. Else:    status='failed', last_error=...                │   │
//! │  │                                                                 │   │
//! │  │  3. After pass: reset failed items below the attempt ceiling   │   │
//! │  │     back to 'pending'; purge synced items past the grace       │   │
//! │  │     window                                                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • An enqueued item is durable before the enqueue call returns         │
//! │  • Every mutation is one statement - no half-written items             │
//! │  • Offline? Items queue up. Back online? The engine drains them        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use biolink_core::{SyncItem, SyncItemKind, SyncPriority, SyncStatus};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Row Type
// =============================================================================

/// Raw database row for a sync item.
///
/// Enum fields are stored as their string/rank forms; conversion back into
/// domain types surfaces corrupt rows as `StoreError::CorruptRow` instead of
/// panicking or silently defaulting.
#[derive(Debug, sqlx::FromRow)]
struct SyncItemRow {
    id: String,
    kind: String,
    payload: String,
    device_id: Option<String>,
    user_id: Option<String>,
    priority: i64,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    remote_response: Option<String>,
    force_overwrite: bool,
    created_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    synced_at: Option<DateTime<Utc>>,
}

impl SyncItemRow {
    fn into_item(self) -> StoreResult<SyncItem> {
        let kind: SyncItemKind = self
            .kind
            .parse()
            .map_err(|e| StoreError::corrupt(&self.id, e))?;
        let status: SyncStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::corrupt(&self.id, e))?;
        let priority = SyncPriority::from_rank(self.priority)
            .map_err(|e| StoreError::corrupt(&self.id, e))?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| StoreError::corrupt(&self.id, e))?;
        let remote_response = match self.remote_response {
            Some(body) => {
                Some(serde_json::from_str(&body).map_err(|e| StoreError::corrupt(&self.id, e))?)
            }
            None => None,
        };

        Ok(SyncItem {
            id: self.id,
            kind,
            payload,
            device_id: self.device_id,
            user_id: self.user_id,
            priority,
            status,
            attempts: self.attempts as u32,
            last_error: self.last_error,
            remote_response,
            force_overwrite: self.force_overwrite,
            created_at: self.created_at,
            last_attempt_at: self.last_attempt_at,
            synced_at: self.synced_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sync queue operations.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    /// Creates a new SyncQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncQueueRepository { pool }
    }

    /// Inserts a new item.
    ///
    /// Fails with `DuplicateId` if the id already exists; ids are never
    /// reused.
    pub async fn add(&self, item: &SyncItem) -> StoreResult<()> {
        debug!(id = %item.id, kind = %item.kind, "Adding sync item");

        let payload = item.payload.to_string();
        let remote_response = item.remote_response.as_ref().map(|v| v.to_string());

        sqlx::query(
            r#"
            INSERT INTO sync_queue (
                id, kind, payload, device_id, user_id,
                priority, status, attempts, last_error, remote_response,
                force_overwrite, created_at, last_attempt_at, synced_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&item.id)
        .bind(item.kind.to_string())
        .bind(payload)
        .bind(&item.device_id)
        .bind(&item.user_id)
        .bind(item.priority.rank())
        .bind(item.status.to_string())
        .bind(item.attempts as i64)
        .bind(&item.last_error)
        .bind(remote_response)
        .bind(item.force_overwrite)
        .bind(item.created_at)
        .bind(item.last_attempt_at)
        .bind(item.synced_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::DuplicateId { .. } => StoreError::DuplicateId {
                id: item.id.clone(),
            },
            other => other,
        })?;

        Ok(())
    }

    /// Replaces an item by id.
    pub async fn update(&self, item: &SyncItem) -> StoreResult<()> {
        let payload = item.payload.to_string();
        let remote_response = item.remote_response.as_ref().map(|v| v.to_string());

        let result = sqlx::query(
            r#"
            UPDATE sync_queue SET
                kind = ?2,
                payload = ?3,
                device_id = ?4,
                user_id = ?5,
                priority = ?6,
                status = ?7,
                attempts = ?8,
                last_error = ?9,
                remote_response = ?10,
                force_overwrite = ?11,
                created_at = ?12,
                last_attempt_at = ?13,
                synced_at = ?14
            WHERE id = ?1
            "#,
        )
        .bind(&item.id)
        .bind(item.kind.to_string())
        .bind(payload)
        .bind(&item.device_id)
        .bind(&item.user_id)
        .bind(item.priority.rank())
        .bind(item.status.to_string())
        .bind(item.attempts as i64)
        .bind(&item.last_error)
        .bind(remote_response)
        .bind(item.force_overwrite)
        .bind(item.created_at)
        .bind(item.last_attempt_at)
        .bind(item.synced_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                id: item.id.clone(),
            });
        }

        Ok(())
    }

    /// Deletes an item by id. Returns true if a row was removed.
    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetches an item by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<SyncItem>> {
        let row = sqlx::query_as::<_, SyncItemRow>("SELECT * FROM sync_queue WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SyncItemRow::into_item).transpose()
    }

    /// Fetches all items with the given status, oldest first.
    pub async fn get_by_status(&self, status: SyncStatus) -> StoreResult<Vec<SyncItem>> {
        let rows = sqlx::query_as::<_, SyncItemRow>(
            "SELECT * FROM sync_queue WHERE status = ?1 ORDER BY created_at ASC",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncItemRow::into_item).collect()
    }

    /// Fetches every item, oldest first.
    pub async fn get_all(&self) -> StoreResult<Vec<SyncItem>> {
        let rows =
            sqlx::query_as::<_, SyncItemRow>("SELECT * FROM sync_queue ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(SyncItemRow::into_item).collect()
    }

    /// Counts all items.
    pub async fn count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    /// Counts items with the given status.
    pub async fn count_by_status(&self, status: SyncStatus) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE status = ?1")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    /// Removes every item. Operator/testing surface.
    pub async fn clear(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sync_queue").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Fetches pending items in drain order: priority rank first, oldest
    /// first within a rank. Fairness within a rank bounds worst-case item
    /// age.
    pub async fn get_pending(&self, limit: u32) -> StoreResult<Vec<SyncItem>> {
        let rows = sqlx::query_as::<_, SyncItemRow>(
            r#"
            SELECT * FROM sync_queue
            WHERE status = 'pending'
            ORDER BY priority DESC, created_at ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncItemRow::into_item).collect()
    }

    /// Resets failed items below the attempt ceiling back to pending.
    ///
    /// Items at or above the ceiling stay `failed` and must be surfaced to
    /// an operator or retried explicitly. Returns the number reset.
    pub async fn reset_failed_below(&self, max_attempts: u32) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE sync_queue SET status = 'pending' WHERE status = 'failed' AND attempts < ?1",
        )
        .bind(max_attempts as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes synced items whose grace window has elapsed.
    ///
    /// Runs at the start of every sync pass so rows left behind by a crash
    /// are still removed. Returns the number purged.
    pub async fn purge_synced_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM sync_queue WHERE status = 'synced' AND synced_at IS NOT NULL AND synced_at < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(purged = result.rows_affected(), "Purged synced items");
        }

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
