//! # Sync Events
//!
//! Typed event values published by the sync engine and conflict resolver.
//!
//! Same delivery contract as the device layer's bus: best-effort broadcast,
//! per-publisher ordering only, nothing implied across event types.

use tokio::sync::broadcast;
use tracing::trace;

use biolink_core::{ConflictStrategy, SyncItemKind, SyncPriority, SyncReport};

/// Default buffered events per subscriber.
const DEFAULT_CAPACITY: usize = 128;

/// Everything the sync layer announces.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// An item was durably enqueued.
    ItemQueued {
        id: String,
        kind: SyncItemKind,
        priority: SyncPriority,
    },

    /// A sync pass started draining the queue.
    SyncStarted,

    /// Incremental progress: one batch finished within a pass.
    BatchCompleted { processed: usize },

    /// Remote confirmed acceptance of an item.
    ItemSynced { id: String },

    /// Remote rejected an item as conflicting; resolution required.
    ItemConflicted { id: String },

    /// A delivery attempt failed.
    ItemFailed {
        id: String,
        attempts: u32,
        error: String,
    },

    /// An item exhausted its attempt ceiling and stays failed until an
    /// operator intervenes.
    ItemExhausted { id: String, attempts: u32 },

    /// A sync pass finished.
    SyncCompleted { report: SyncReport },

    /// A conflict was resolved.
    ConflictResolved {
        id: String,
        strategy: ConflictStrategy,
    },
}

/// Broadcast bus for sync events. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SyncEventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        SyncEventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Never fails; without subscribers the event is
    /// dropped.
    pub fn emit(&self, event: SyncEvent) {
        trace!(?event, "Sync event");
        let _ = self.tx.send(event);
    }
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::new()
    }
}
