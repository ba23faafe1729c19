//! # Device Registry
//!
//! In-memory table of known devices and their live state - the single
//! source of truth for "what do we know about device X right now".
//!
//! Pure data holder: no I/O, no background tasks. Writers are the
//! connection coordinator and the health monitor; everything else reads.
//!
//! ## Consistency
//! Updates are atomic whole-record replacements under the write lock, so a
//! concurrent reader sees either the old record or the new one, never a
//! half-written mix.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use biolink_core::{DeviceCounts, DeviceRecord, DeviceStatus};

/// Shared device table. Cheap to clone; all clones see the same table.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<String, DeviceRecord>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record for a device. Returns the previous
    /// record if one existed.
    pub async fn upsert(&self, record: DeviceRecord) -> Option<DeviceRecord> {
        debug!(device_id = %record.id, status = %record.status, "Registry upsert");
        self.devices
            .write()
            .await
            .insert(record.id.clone(), record)
    }

    /// Fetches a device's record.
    pub async fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.read().await.get(device_id).cloned()
    }

    /// Returns every record, sorted by device id for stable iteration.
    pub async fn all(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> =
            self.devices.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Returns every record with the given status.
    pub async fn by_status(&self, status: DeviceStatus) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self
            .devices
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Registry totals.
    pub async fn count(&self) -> DeviceCounts {
        let devices = self.devices.read().await;
        let total = devices.len();
        let online = devices
            .values()
            .filter(|r| r.status.counts_as_online())
            .count();
        DeviceCounts {
            total,
            online,
            offline: total - online,
        }
    }

    /// Applies a mutation to one record under the write lock. Returns the
    /// updated record, or None if the device is unknown.
    ///
    /// The closure runs with the lock held; it must not block.
    pub async fn update<F>(&self, device_id: &str, f: F) -> Option<DeviceRecord>
    where
        F: FnOnce(&mut DeviceRecord),
    {
        let mut devices = self.devices.write().await;
        let record = devices.get_mut(device_id)?;
        f(record);
        Some(record.clone())
    }

    /// Removes a device. Records are destroyed only on explicit
    /// disconnect/removal, never implicitly.
    pub async fn remove(&self, device_id: &str) -> Option<DeviceRecord> {
        debug!(device_id, "Registry remove");
        self.devices.write().await.remove(device_id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use biolink_core::ConnectionType;
    use chrono::Utc;

    fn record(id: &str, status: DeviceStatus) -> DeviceRecord {
        let mut record = DeviceRecord::placeholder(id, Utc::now());
        record.status = status;
        record
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let registry = DeviceRegistry::new();
        assert!(registry.upsert(record("dev-a", DeviceStatus::Online)).await.is_none());

        let fetched = registry.get("dev-a").await.unwrap();
        assert_eq!(fetched.status, DeviceStatus::Online);

        // Replace wholesale
        let previous = registry
            .upsert(record("dev-a", DeviceStatus::Measuring))
            .await
            .unwrap();
        assert_eq!(previous.status, DeviceStatus::Online);
        assert_eq!(
            registry.get("dev-a").await.unwrap().status,
            DeviceStatus::Measuring
        );
    }

    #[tokio::test]
    async fn test_counts() {
        let registry = DeviceRegistry::new();
        registry.upsert(record("a", DeviceStatus::Online)).await;
        registry.upsert(record("b", DeviceStatus::Measuring)).await;
        registry.upsert(record("c", DeviceStatus::Offline)).await;

        let counts = registry.count().await;
        assert_eq!(counts.total, 3);
        assert_eq!(counts.online, 2);
        assert_eq!(counts.offline, 1);
    }

    #[tokio::test]
    async fn test_by_status_sorted() {
        let registry = DeviceRegistry::new();
        registry.upsert(record("b", DeviceStatus::Offline)).await;
        registry.upsert(record("a", DeviceStatus::Offline)).await;
        registry.upsert(record("c", DeviceStatus::Online)).await;

        let offline = registry.by_status(DeviceStatus::Offline).await;
        let ids: Vec<&str> = offline.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_update_in_place() {
        let registry = DeviceRegistry::new();
        registry.upsert(record("dev-a", DeviceStatus::Online)).await;

        let updated = registry
            .update("dev-a", |r| {
                r.status = DeviceStatus::Offline;
                r.connection_type = ConnectionType::Disconnected;
            })
            .await
            .unwrap();
        assert_eq!(updated.status, DeviceStatus::Offline);

        assert!(registry.update("ghost", |_| {}).await.is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = DeviceRegistry::new();
        registry.upsert(record("dev-a", DeviceStatus::Online)).await;
        assert!(registry.remove("dev-a").await.is_some());
        assert!(registry.get("dev-a").await.is_none());
        assert_eq!(registry.count().await.total, 0);
    }
}
