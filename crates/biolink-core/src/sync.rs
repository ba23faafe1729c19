//! # Sync Item Types
//!
//! The durable unit of work for offline-first synchronization, plus the
//! conflict-resolution vocabulary.
//!
//! ## Item Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SyncItem State Machine                             │
//! │                                                                         │
//! │   enqueue                                                               │
//! │      │                                                                  │
//! │      ▼          sync pass          2xx                                  │
//! │  ┌─────────┐   ┌─────────┐   ┌──────────┐   grace window   (deleted)   │
//! │  │ Pending │──►│ Syncing │──►│  Synced  │────────────────►             │
//! │  └─────────┘   └────┬────┘   └──────────┘                              │
//! │      ▲              │                                                   │
//! │      │              │ 409        ┌──────────┐  keep-remote  (deleted)  │
//! │      │              ├───────────►│ Conflict │─────────────►            │
//! │      │              │            └────┬─────┘                          │
//! │      │              │ other           │ keep-local / merge             │
//! │      │              ▼                 │                                 │
//! │      │         ┌─────────┐            │                                 │
//! │      └─────────│ Failed  │◄───────────┘                                │
//! │   auto-retry   └─────────┘                                             │
//! │  (below max    at max attempts: stays Failed for operator action      │
//! │   attempts)                                                            │
//! │                                                                         │
//! │  INVARIANT: an item is never silently dropped. The only exits are     │
//! │  confirmed remote acceptance (Synced + grace) and explicit deletion    │
//! │  by a keep-remote resolution.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// =============================================================================
// Sync Priority
// =============================================================================

/// Drain priority of a sync item. Higher ranks drain first; age breaks ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl SyncPriority {
    /// Numeric rank used for the store's ORDER BY.
    pub fn rank(&self) -> i64 {
        match self {
            SyncPriority::Low => 0,
            SyncPriority::Normal => 1,
            SyncPriority::High => 2,
            SyncPriority::Critical => 3,
        }
    }

    /// Inverse of [`rank`](Self::rank). Unknown ranks come back as an error
    /// so a corrupted row is noticed instead of silently demoted.
    pub fn from_rank(rank: i64) -> Result<Self, CoreError> {
        match rank {
            0 => Ok(SyncPriority::Low),
            1 => Ok(SyncPriority::Normal),
            2 => Ok(SyncPriority::High),
            3 => Ok(SyncPriority::Critical),
            other => Err(CoreError::UnknownVariant {
                field: "priority",
                value: other.to_string(),
            }),
        }
    }
}

impl Default for SyncPriority {
    fn default() -> Self {
        SyncPriority::Normal
    }
}

// =============================================================================
// Sync Item Kind
// =============================================================================

/// What kind of record a sync item carries. Each kind maps to its own
/// remote ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncItemKind {
    Measurement,
    Calibration,
    UserAction,
    DeviceConfig,
    Feedback,
    HealthRecord,
}

impl SyncItemKind {
    /// Remote endpoint path for this kind.
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            SyncItemKind::Measurement => "/measurements",
            SyncItemKind::Calibration => "/calibrations",
            SyncItemKind::UserAction => "/user-actions",
            SyncItemKind::DeviceConfig => "/device-config",
            SyncItemKind::Feedback => "/feedback",
            SyncItemKind::HealthRecord => "/health-records",
        }
    }
}

impl std::fmt::Display for SyncItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncItemKind::Measurement => write!(f, "measurement"),
            SyncItemKind::Calibration => write!(f, "calibration"),
            SyncItemKind::UserAction => write!(f, "user_action"),
            SyncItemKind::DeviceConfig => write!(f, "device_config"),
            SyncItemKind::Feedback => write!(f, "feedback"),
            SyncItemKind::HealthRecord => write!(f, "health_record"),
        }
    }
}

impl std::str::FromStr for SyncItemKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "measurement" => Ok(SyncItemKind::Measurement),
            "calibration" => Ok(SyncItemKind::Calibration),
            "user_action" => Ok(SyncItemKind::UserAction),
            "device_config" => Ok(SyncItemKind::DeviceConfig),
            "feedback" => Ok(SyncItemKind::Feedback),
            "health_record" => Ok(SyncItemKind::HealthRecord),
            other => Err(CoreError::UnknownVariant {
                field: "kind",
                value: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Sync Status
// =============================================================================

/// Lifecycle status of a sync item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Waiting to be sent.
    Pending,
    /// A sync pass is sending it right now.
    Syncing,
    /// Remote confirmed acceptance; deleted after the grace window.
    Synced,
    /// Last attempt failed; auto-retried while below the attempt ceiling.
    Failed,
    /// Remote rejected it as diverged; awaiting explicit resolution.
    Conflict,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Pending => write!(f, "pending"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Failed => write!(f, "failed"),
            SyncStatus::Conflict => write!(f, "conflict"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "syncing" => Ok(SyncStatus::Syncing),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            "conflict" => Ok(SyncStatus::Conflict),
            other => Err(CoreError::UnknownVariant {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Sync Item
// =============================================================================

/// One durable unit of work: a record that must reach the remote system.
///
/// Created by producers via the engine's enqueue; mutated only by the sync
/// engine and conflict resolver; persisted for its whole
/// pending/syncing/failed/conflict lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItem {
    /// Unique id, also used by the remote side to deduplicate retries.
    pub id: String,

    /// Record kind, selects the remote endpoint.
    pub kind: SyncItemKind,

    /// Opaque payload owned by the producer.
    pub payload: serde_json::Value,

    /// Device the record originated from, if any.
    pub device_id: Option<String>,

    /// User the record belongs to, if any.
    pub user_id: Option<String>,

    /// Drain priority.
    pub priority: SyncPriority,

    /// Lifecycle status.
    pub status: SyncStatus,

    /// Number of delivery attempts so far.
    pub attempts: u32,

    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,

    /// Remote's view of the record, stored on a 409.
    pub remote_response: Option<serde_json::Value>,

    /// Set by a keep-local resolution; the next send carries an explicit
    /// overwrite marker.
    pub force_overwrite: bool,

    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncItem {
    /// Creates a pending item with a fresh id.
    pub fn new(kind: SyncItemKind, payload: serde_json::Value) -> Self {
        SyncItem {
            id: Uuid::new_v4().to_string(),
            kind,
            payload,
            device_id: None,
            user_id: None,
            priority: SyncPriority::default(),
            status: SyncStatus::Pending,
            attempts: 0,
            last_error: None,
            remote_response: None,
            force_overwrite: false,
            created_at: Utc::now(),
            last_attempt_at: None,
            synced_at: None,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_priority(mut self, priority: SyncPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Returns true while the item still needs engine attention.
    pub fn is_outstanding(&self) -> bool {
        !matches!(self.status, SyncStatus::Synced)
    }
}

// =============================================================================
// Conflict Resolution
// =============================================================================

/// Caller-chosen strategy for a conflicted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Re-send the local payload with a force-overwrite marker.
    KeepLocal,
    /// Accept the remote's view: delete the local item outright.
    KeepRemote,
    /// Replace the payload with caller-merged data and re-send.
    Merge,
}

/// A resolution decision for one conflicted item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    /// Item to resolve.
    pub item_id: String,

    /// Chosen strategy.
    pub strategy: ConflictStrategy,

    /// Merged payload; required iff strategy is `Merge`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_payload: Option<serde_json::Value>,
}

impl ConflictResolution {
    pub fn keep_local(item_id: impl Into<String>) -> Self {
        ConflictResolution {
            item_id: item_id.into(),
            strategy: ConflictStrategy::KeepLocal,
            merged_payload: None,
        }
    }

    pub fn keep_remote(item_id: impl Into<String>) -> Self {
        ConflictResolution {
            item_id: item_id.into(),
            strategy: ConflictStrategy::KeepRemote,
            merged_payload: None,
        }
    }

    pub fn merge(item_id: impl Into<String>, merged_payload: serde_json::Value) -> Self {
        ConflictResolution {
            item_id: item_id.into(),
            strategy: ConflictStrategy::Merge,
            merged_payload: Some(merged_payload),
        }
    }

    /// Checks the merged-payload rule.
    pub fn validate(&self) -> Result<(), CoreError> {
        match (self.strategy, self.merged_payload.is_some()) {
            (ConflictStrategy::Merge, false) => Err(CoreError::InvalidResolution(
                "merge resolution requires a merged payload".into(),
            )),
            (ConflictStrategy::KeepLocal | ConflictStrategy::KeepRemote, true) => {
                Err(CoreError::InvalidResolution(
                    "merged payload is only valid with the merge strategy".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Sync Report
// =============================================================================

/// Outcome totals for one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Items confirmed by the remote this pass.
    pub synced: usize,
    /// Items that failed this pass.
    pub failed: usize,
    /// Items the remote rejected as conflicting this pass.
    pub conflicts: usize,
}

impl SyncReport {
    /// The report returned by a pass that did nothing (offline, or a pass
    /// already running).
    pub fn noop() -> Self {
        SyncReport::default()
    }

    pub fn total(&self) -> usize {
        self.synced + self.failed + self.conflicts
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_rank_roundtrip() {
        for priority in [
            SyncPriority::Low,
            SyncPriority::Normal,
            SyncPriority::High,
            SyncPriority::Critical,
        ] {
            assert_eq!(SyncPriority::from_rank(priority.rank()).unwrap(), priority);
        }
        assert!(SyncPriority::from_rank(9).is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(SyncPriority::Critical > SyncPriority::High);
        assert!(SyncPriority::High > SyncPriority::Normal);
        assert!(SyncPriority::Normal > SyncPriority::Low);
    }

    #[test]
    fn test_kind_endpoint_paths() {
        assert_eq!(SyncItemKind::Measurement.endpoint_path(), "/measurements");
        assert_eq!(SyncItemKind::HealthRecord.endpoint_path(), "/health-records");
    }

    #[test]
    fn test_kind_string_roundtrip() {
        for kind in [
            SyncItemKind::Measurement,
            SyncItemKind::Calibration,
            SyncItemKind::UserAction,
            SyncItemKind::DeviceConfig,
            SyncItemKind::Feedback,
            SyncItemKind::HealthRecord,
        ] {
            let parsed: SyncItemKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Syncing,
            SyncStatus::Synced,
            SyncStatus::Failed,
            SyncStatus::Conflict,
        ] {
            let parsed: SyncStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_new_item_is_pending() {
        let item = SyncItem::new(SyncItemKind::Measurement, json!({"glucose": 5.4}))
            .with_device("dev-1")
            .with_priority(SyncPriority::High);

        assert_eq!(item.status, SyncStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.device_id.as_deref(), Some("dev-1"));
        assert!(item.is_outstanding());
    }

    #[test]
    fn test_resolution_validation() {
        assert!(ConflictResolution::keep_local("item-1").validate().is_ok());
        assert!(ConflictResolution::keep_remote("item-1").validate().is_ok());
        assert!(ConflictResolution::merge("item-1", json!({}))
            .validate()
            .is_ok());

        // Merge without payload
        let bad = ConflictResolution {
            item_id: "item-1".into(),
            strategy: ConflictStrategy::Merge,
            merged_payload: None,
        };
        assert!(bad.validate().is_err());

        // Payload on a non-merge strategy
        let bad = ConflictResolution {
            item_id: "item-1".into(),
            strategy: ConflictStrategy::KeepRemote,
            merged_payload: Some(json!({})),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_report_noop() {
        let report = SyncReport::noop();
        assert_eq!(report.total(), 0);
    }
}
