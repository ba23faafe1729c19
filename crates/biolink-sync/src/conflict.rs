//! # Conflict Resolver
//!
//! Applies caller-chosen strategies to items the remote rejected as
//! conflicting. Conflicts are never auto-resolved; they wait here for an
//! explicit decision.
//!
//! ## Strategies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Conflict Resolution                                  │
//! │                                                                         │
//! │  KEEP-LOCAL   item → pending, force_overwrite set                      │
//! │               next send carries X-Force-Overwrite so the remote        │
//! │               replaces its view with ours                              │
//! │                                                                         │
//! │  KEEP-REMOTE  local item deleted outright (the one sanctioned          │
//! │               deletion besides the post-sync grace window)             │
//! │                                                                         │
//! │  MERGE        payload replaced with caller-merged data → pending       │
//! │                                                                         │
//! │  Resolutions other than keep-remote trigger an immediate sync          │
//! │  attempt (driven by the engine).                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{info, warn};

use biolink_core::{ConflictResolution, ConflictStrategy, SyncStatus};
use biolink_store::SyncQueueRepository;

use crate::error::{SyncError, SyncResult};
use crate::events::{SyncEvent, SyncEventBus};

/// What a resolution did with the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    /// Item is pending again and should be synced promptly.
    Requeued,
    /// Item was deleted (keep-remote).
    Deleted,
}

/// Applies conflict resolutions against the durable queue.
#[derive(Clone)]
pub struct ConflictResolver {
    queue: SyncQueueRepository,
    events: SyncEventBus,
}

impl ConflictResolver {
    pub fn new(queue: SyncQueueRepository, events: SyncEventBus) -> Self {
        ConflictResolver { queue, events }
    }

    /// Validates and applies one resolution.
    ///
    /// Only items in `conflict` status can be resolved; resolving anything
    /// else is a caller error, not a state transition.
    pub async fn apply(&self, resolution: ConflictResolution) -> SyncResult<ResolutionAction> {
        resolution.validate()?;

        let mut item = self
            .queue
            .get(&resolution.item_id)
            .await?
            .ok_or_else(|| SyncError::ItemNotFound {
                id: resolution.item_id.clone(),
            })?;

        if item.status != SyncStatus::Conflict {
            return Err(SyncError::NotConflicted {
                id: item.id,
                status: item.status.to_string(),
            });
        }

        let action = match resolution.strategy {
            ConflictStrategy::KeepRemote => {
                warn!(id = %item.id, "Resolving conflict: keep remote (deleting local item)");
                self.queue.delete(&item.id).await?;
                ResolutionAction::Deleted
            }

            ConflictStrategy::KeepLocal => {
                info!(id = %item.id, "Resolving conflict: keep local (force overwrite)");
                item.status = SyncStatus::Pending;
                item.force_overwrite = true;
                item.last_error = None;
                self.queue.update(&item).await?;
                ResolutionAction::Requeued
            }

            ConflictStrategy::Merge => {
                info!(id = %item.id, "Resolving conflict: merge");
                // validate() already enforced this; the error path is for
                // the type system, not for reachable states
                let Some(merged) = resolution.merged_payload.clone() else {
                    return Err(SyncError::Core(
                        biolink_core::CoreError::InvalidResolution(
                            "merge resolution requires a merged payload".into(),
                        ),
                    ));
                };
                item.payload = merged;
                item.status = SyncStatus::Pending;
                item.force_overwrite = false;
                item.last_error = None;
                item.remote_response = None;
                self.queue.update(&item).await?;
                ResolutionAction::Requeued
            }
        };

        self.events.emit(SyncEvent::ConflictResolved {
            id: resolution.item_id,
            strategy: resolution.strategy,
        });

        Ok(action)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
