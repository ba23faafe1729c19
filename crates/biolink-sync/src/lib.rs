//! # biolink-sync: Offline-First Sync Engine
//!
//! Guarantees that every locally-generated record eventually reaches the
//! remote system, through prolonged disconnection, process restarts, and
//! partial failures.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Engine Architecture                          │
//! │                                                                         │
//! │  producers (measurement / calibration logic)                            │
//! │       │ enqueue                                                         │
//! │       ▼                                                                 │
//! │  ┌─────────────────┐   drain    ┌─────────────────┐   POST per kind    │
//! │  │  biolink-store  │ ─────────► │   SyncEngine    │ ─────────────────► │
//! │  │  durable queue  │ ◄───────── │                 │ ◄───────────────── │
//! │  └─────────────────┘  outcomes  └───────┬─────────┘  2xx / 409 / err   │
//! │                                         │                              │
//! │                                         ▼                              │
//! │                               ┌──────────────────┐                     │
//! │                               │ ConflictResolver │  keep-local /       │
//! │                               │                  │  keep-remote /      │
//! │                               └──────────────────┘  merge              │
//! │                                                                         │
//! │  TRIGGERS: fixed timer (30s) • offline→online transition • manual      │
//! │  Never concurrent with itself; never blocks device command paths.      │
//! │                                                                         │
//! │  INVARIANT: items leave the queue only by confirmed remote             │
//! │  acceptance (plus grace window) or explicit keep-remote resolution.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - The sync engine: enqueue admission, prioritized batch
//!   passes, retry ceiling, trigger policy
//! - [`client`] - HTTP client for the per-kind remote endpoints
//! - [`conflict`] - Conflict resolution strategies
//! - [`config`] - TOML + environment configuration
//! - [`events`] - Typed sync events
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use biolink_sync::{EnqueueOptions, RemoteClient, SyncConfig, SyncEngine, SyncEventBus};
//!
//! let config = SyncConfig::load_or_default(None);
//! let client = RemoteClient::new(&config.remote)?;
//! let engine = SyncEngine::new(&store, client, config.engine, SyncEventBus::new(), network_rx);
//! let handle = engine.spawn();
//!
//! engine.enqueue(SyncItemKind::Measurement, payload, EnqueueOptions::default()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod events;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{PushOutcome, RemoteClient, FORCE_OVERWRITE_HEADER, ITEM_ID_HEADER};
pub use config::{EngineSettings, RemoteSettings, SyncConfig};
pub use conflict::{ConflictResolver, ResolutionAction};
pub use engine::{EnqueueOptions, SyncEngine, SyncEngineHandle};
pub use error::{SyncError, SyncResult};
pub use events::{SyncEvent, SyncEventBus};
