//! # biolink-store: Durable Sync Queue
//!
//! SQLite-backed store for pending synchronization items. Every locally
//! produced record lives here from enqueue until confirmed remote
//! acceptance (plus a grace window) or explicit resolution, surviving
//! process restarts and crashes in between.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          biolink-store                                  │
//! │                                                                         │
//! │  producers (enqueue)          sync engine (drain)                       │
//! │       │                            │                                    │
//! │       ▼                            ▼                                    │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  SyncQueueRepository                            │   │
//! │  │   add / update / delete / get / get_by_status / get_all        │   │
//! │  │   count / clear / get_pending / reset_failed_below             │   │
//! │  │   purge_synced_before                                          │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │  ┌────────────────────────────▼────────────────────────────────────┐   │
//! │  │            SQLite (WAL, NORMAL sync, FK on)                     │   │
//! │  │            sync_queue table, embedded migrations                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  DURABILITY: every mutation is a single SQL statement, so a crash      │
//! │  mid-write never leaves a half-written item visible.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`pool`] - Store configuration and connection pool
//! - [`migrations`] - Embedded schema migrations
//! - [`repository`] - The sync queue repository
//! - [`export`] - Read-only reporting surface (structured rows + delimited text)
//! - [`error`] - Store error types

pub mod error;
pub mod export;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{StoreError, StoreResult};
pub use export::{queue_export_rows, queue_to_delimited, QueueExportRow};
pub use pool::{Store, StoreConfig};
pub use repository::queue::SyncQueueRepository;
