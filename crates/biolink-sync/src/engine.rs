//! # Sync Engine
//!
//! Drains the durable queue to the remote system in priority order,
//! classifies outcomes, and re-queues or resolves accordingly.
//!
//! ## Engine Behavior
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Pass                                       │
//! │                                                                         │
//! │  TRIGGERS: 30s timer | offline→online transition | manual trigger      │
//! │  (never concurrent with itself - a second call is a reported no-op)    │
//! │                                                                         │
//! │  1. Offline? ──► no-op report {0,0,0}                                  │
//! │  2. Purge synced items past the grace window (crash-safe sweep)        │
//! │  3. Loop:                                                              │
//! │     batch = pending items, priority DESC then created_at ASC,          │
//! │             LIMIT batch_size                                           │
//! │     for each item:                                                     │
//! │       pending → syncing (attempt counter increments)                   │
//! │       POST to the kind's endpoint                                      │
//! │         2xx ──► synced  (deferred deletion after the grace window)     │
//! │         409 ──► conflict (remote's view stored for resolution)         │
//! │         else ──► failed  (error recorded)                              │
//! │     emit BatchCompleted (incremental progress)                         │
//! │  4. failed items below the attempt ceiling ──► pending (next pass)     │
//! │     items at the ceiling stay failed for operator action               │
//! │                                                                         │
//! │  ENQUEUE: durable insert first, always. QueueFull beyond the           │
//! │  configured ceiling. Critical items additionally attempt an            │
//! │  immediate send when online.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use biolink_core::{
    validation, ConflictResolution, NetworkMode, SyncItem, SyncItemKind, SyncPriority, SyncReport,
    SyncStatus,
};
use biolink_store::{Store, SyncQueueRepository};

use crate::client::{PushOutcome, RemoteClient};
use crate::config::EngineSettings;
use crate::conflict::{ConflictResolver, ResolutionAction};
use crate::error::{SyncError, SyncResult};
use crate::events::{SyncEvent, SyncEventBus};

/// Time budget for the immediate send of a critical enqueue. Transient
/// failures are retried with backoff inside this budget; the item stays
/// durably queued either way.
const CRITICAL_SEND_BUDGET: Duration = Duration::from_secs(3);

// =============================================================================
// Enqueue Options
// =============================================================================

/// Origin metadata and priority for an enqueued item.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub priority: SyncPriority,
}

impl EnqueueOptions {
    pub fn priority(priority: SyncPriority) -> Self {
        EnqueueOptions {
            priority,
            ..Default::default()
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for the background engine loop.
pub struct SyncEngineHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SyncEngineHandle {
    /// Stops the trigger loop. In-flight passes finish on their own.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// The sync engine. One instance per process by convention; construct with
/// [`SyncEngine::new`] and share via `Arc`.
pub struct SyncEngine {
    queue: SyncQueueRepository,
    client: RemoteClient,
    config: EngineSettings,
    events: SyncEventBus,

    /// Network mode feed from the device layer (or a test fixture).
    network: watch::Receiver<NetworkMode>,

    /// Single-flight guard: at most one sync pass at a time.
    pass_lock: Mutex<()>,

    trigger_tx: mpsc::Sender<()>,
    trigger_rx: StdMutex<Option<mpsc::Receiver<()>>>,
}

impl SyncEngine {
    pub fn new(
        store: &Store,
        client: RemoteClient,
        config: EngineSettings,
        events: SyncEventBus,
        network: watch::Receiver<NetworkMode>,
    ) -> Arc<Self> {
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        Arc::new(SyncEngine {
            queue: store.queue(),
            client,
            config,
            events,
            network,
            pass_lock: Mutex::new(()),
            trigger_tx,
            trigger_rx: StdMutex::new(Some(trigger_rx)),
        })
    }

    /// Whether a remote path currently exists.
    pub fn is_online(&self) -> bool {
        self.network.borrow().is_online()
    }

    /// The event bus this engine publishes on.
    pub fn events(&self) -> &SyncEventBus {
        &self.events
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    /// Durably enqueues a record for delivery.
    ///
    /// Rejects with `QueueFull` at the configured ceiling. Critical items
    /// additionally attempt an immediate send when online - after the
    /// durable insert, never instead of it.
    pub async fn enqueue(
        &self,
        kind: SyncItemKind,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> SyncResult<SyncItem> {
        validation::validate_payload(&payload)?;

        let count = self.queue.count().await?;
        if count >= self.config.max_queue_items {
            warn!(count, max = self.config.max_queue_items, "Sync queue full");
            return Err(SyncError::QueueFull {
                max: self.config.max_queue_items,
            });
        }

        let mut item = SyncItem::new(kind, payload).with_priority(options.priority);
        if let Some(device_id) = options.device_id {
            item = item.with_device(device_id);
        }
        if let Some(user_id) = options.user_id {
            item = item.with_user(user_id);
        }

        self.queue.add(&item).await?;
        debug!(id = %item.id, kind = %item.kind, priority = ?item.priority, "Item enqueued");
        self.events.emit(SyncEvent::ItemQueued {
            id: item.id.clone(),
            kind: item.kind,
            priority: item.priority,
        });

        if item.priority == SyncPriority::Critical && self.is_online() {
            // Skip the immediate send when a pass is already draining; the
            // pass will pick the item up at the head of the next batch.
            if let Ok(_guard) = self.pass_lock.try_lock() {
                self.deliver(item.clone(), true).await?;
            } else {
                debug!(id = %item.id, "Sync pass running, critical item rides along");
            }
        }

        // The immediate send may have advanced the item's lifecycle.
        Ok(self.queue.get(&item.id).await?.unwrap_or(item))
    }

    // =========================================================================
    // Sync Pass
    // =========================================================================

    /// Runs one sync pass.
    ///
    /// A no-op (reported, not an error) when offline or when a pass is
    /// already running - at most one pass runs at a time and no item is
    /// ever double-processed.
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        if !self.is_online() {
            debug!("Offline, sync pass skipped");
            return Ok(SyncReport::noop());
        }

        let Ok(_guard) = self.pass_lock.try_lock() else {
            debug!("Sync pass already running, skipped");
            return Ok(SyncReport::noop());
        };

        self.events.emit(SyncEvent::SyncStarted);

        // Crash-safe half of the grace-window deletion: rows whose deferred
        // delete never ran are purged here.
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.grace())
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
        self.queue.purge_synced_before(cutoff).await?;

        let mut report = SyncReport::default();

        loop {
            let batch = self.queue.get_pending(self.config.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();

            for item in batch {
                match self.deliver(item, false).await? {
                    PushOutcome::Accepted(_) => report.synced += 1,
                    PushOutcome::Conflict(_) => report.conflicts += 1,
                    PushOutcome::Failed { .. } => report.failed += 1,
                }
            }

            self.events.emit(SyncEvent::BatchCompleted {
                processed: report.total(),
            });

            if batch_len < self.config.batch_size as usize {
                break;
            }
        }

        // Failed items below the ceiling go back to pending for the next
        // pass; items at the ceiling stay failed for operator action.
        let reset = self.queue.reset_failed_below(self.config.max_attempts).await?;
        if reset > 0 {
            debug!(reset, "Failed items re-queued for the next pass");
        }

        info!(
            synced = report.synced,
            failed = report.failed,
            conflicts = report.conflicts,
            "Sync pass complete"
        );
        self.events.emit(SyncEvent::SyncCompleted { report });

        Ok(report)
    }

    /// Delivers one item and persists its new state. `immediate` selects
    /// the backoff-wrapped send used for critical enqueues.
    async fn deliver(&self, mut item: SyncItem, immediate: bool) -> SyncResult<PushOutcome> {
        item.status = SyncStatus::Syncing;
        item.attempts += 1;
        item.last_attempt_at = Some(Utc::now());
        self.queue.update(&item).await?;

        let outcome = if immediate {
            self.client.push_with_backoff(&item, CRITICAL_SEND_BUDGET).await
        } else {
            self.client.push(&item).await
        };

        match &outcome {
            PushOutcome::Accepted(body) => {
                item.status = SyncStatus::Synced;
                item.synced_at = Some(Utc::now());
                item.remote_response = body.clone();
                item.last_error = None;
                item.force_overwrite = false;
                self.queue.update(&item).await?;

                self.schedule_grace_delete(item.id.clone());
                self.events.emit(SyncEvent::ItemSynced { id: item.id });
            }
            PushOutcome::Conflict(body) => {
                item.status = SyncStatus::Conflict;
                item.remote_response = body.clone();
                self.queue.update(&item).await?;

                warn!(id = %item.id, "Remote reported a conflict");
                self.events.emit(SyncEvent::ItemConflicted { id: item.id });
            }
            PushOutcome::Failed { message, .. } => {
                item.status = SyncStatus::Failed;
                item.last_error = Some(message.clone());
                self.queue.update(&item).await?;

                self.events.emit(SyncEvent::ItemFailed {
                    id: item.id.clone(),
                    attempts: item.attempts,
                    error: message.clone(),
                });
                if item.attempts >= self.config.max_attempts {
                    warn!(id = %item.id, attempts = item.attempts, "Item exhausted its retries");
                    self.events.emit(SyncEvent::ItemExhausted {
                        id: item.id,
                        attempts: item.attempts,
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// In-process half of the grace-window deletion. The purge sweep at the
    /// start of every pass covers rows this task never got to.
    fn schedule_grace_delete(&self, id: String) {
        let queue = self.queue.clone();
        let grace = self.config.grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match queue.get(&id).await {
                Ok(Some(item)) if item.status == SyncStatus::Synced => {
                    debug!(id, "Grace window elapsed, deleting synced item");
                    let _ = queue.delete(&id).await;
                }
                _ => {}
            }
        });
    }

    // =========================================================================
    // Conflict Resolution
    // =========================================================================

    /// Applies a conflict resolution. Every strategy except keep-remote
    /// triggers an immediate sync attempt.
    pub async fn resolve_conflict(&self, resolution: ConflictResolution) -> SyncResult<()> {
        let resolver = ConflictResolver::new(self.queue.clone(), self.events.clone());
        let action = resolver.apply(resolution).await?;

        if action == ResolutionAction::Requeued {
            let _ = self.sync().await;
        }
        Ok(())
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    /// Requests a sync pass from the background loop. Non-blocking; extra
    /// triggers while one is queued are coalesced.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Spawns the background trigger loop: fixed timer, offline→online
    /// transitions, and manual triggers. Panics if called twice.
    pub fn spawn(self: &Arc<Self>) -> SyncEngineHandle {
        let engine = self.clone();
        let mut trigger_rx = self
            .trigger_rx
            .lock()
            .expect("trigger slot poisoned")
            .take()
            .expect("sync engine already spawned");
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            info!(interval = ?engine.config.sync_interval(), "Sync engine loop starting");
            let mut interval = tokio::time::interval(engine.config.sync_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            let mut network = engine.network.clone();
            let mut previous = *network.borrow();

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = engine.sync().await {
                            warn!(?e, "Timer-driven sync pass failed");
                        }
                    }

                    changed = network.changed() => {
                        if changed.is_err() {
                            warn!("Network mode feed closed, stopping sync loop");
                            break;
                        }
                        let mode = *network.borrow_and_update();
                        if !previous.is_online() && mode.is_online() {
                            info!(mode = %mode, "Back online, starting sync pass");
                            if let Err(e) = engine.sync().await {
                                warn!(?e, "Reconnect-driven sync pass failed");
                            }
                        }
                        previous = mode;
                    }

                    Some(()) = trigger_rx.recv() => {
                        if let Err(e) = engine.sync().await {
                            warn!(?e, "Manual sync pass failed");
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        info!("Sync engine loop shutting down");
                        break;
                    }
                }
            }
        });

        SyncEngineHandle { shutdown_tx }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteSettings;
    use biolink_store::StoreConfig;
    use serde_json::json;

    async fn offline_engine(config: EngineSettings) -> (Arc<SyncEngine>, Store) {
        let store = Store::open(StoreConfig::in_memory()).await.unwrap();
        // Unroutable remote; offline fixtures never reach it.
        let client = RemoteClient::new(&RemoteSettings {
            base_url: Some("http://127.0.0.1:9".into()),
            auth_token: None,
            request_timeout_secs: 1,
        })
        .unwrap();
        let (_tx, rx) = watch::channel(NetworkMode::Offline);
        let engine = SyncEngine::new(&store, client, config, SyncEventBus::new(), rx);
        (engine, store)
    }

    #[tokio::test]
    async fn test_enqueue_is_immediately_visible() {
        let (engine, store) = offline_engine(EngineSettings::default()).await;

        let item = engine
            .enqueue(
                SyncItemKind::Measurement,
                json!({"glucose": 5.4}),
                EnqueueOptions::priority(SyncPriority::High),
            )
            .await
            .unwrap();

        assert_eq!(item.status, SyncStatus::Pending);
        let pending = store.queue().get_by_status(SyncStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, item.id);
        assert_eq!(store.queue().get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_full_rejects_enqueue() {
        let (engine, _store) = offline_engine(EngineSettings {
            max_queue_items: 2,
            ..Default::default()
        })
        .await;

        for _ in 0..2 {
            engine
                .enqueue(SyncItemKind::Feedback, json!({}), EnqueueOptions::default())
                .await
                .unwrap();
        }

        let err = engine
            .enqueue(SyncItemKind::Feedback, json!({}), EnqueueOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::QueueFull { max: 2 }));
    }

    #[tokio::test]
    async fn test_sync_is_noop_while_offline() {
        let (engine, store) = offline_engine(EngineSettings::default()).await;
        engine
            .enqueue(SyncItemKind::Measurement, json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        let report = engine.sync().await.unwrap();
        assert_eq!(report, SyncReport::noop());

        // Nothing was touched.
        let items = store.queue().get_all().await.unwrap();
        assert_eq!(items[0].status, SyncStatus::Pending);
        assert_eq!(items[0].attempts, 0);
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let (engine, _store) = offline_engine(EngineSettings::default()).await;
        let blob = "x".repeat(biolink_core::MAX_SYNC_PAYLOAD_BYTES + 1);
        let err = engine
            .enqueue(
                SyncItemKind::Measurement,
                json!({ "blob": blob }),
                EnqueueOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Core(_)));
    }
}
