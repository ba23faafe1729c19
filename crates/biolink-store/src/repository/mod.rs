//! # Repository Layer
//!
//! Data access objects over the store's connection pool. The single
//! repository here owns the `sync_queue` table; the sync engine and the
//! conflict resolver are its only writers.

pub mod queue;

pub use queue::SyncQueueRepository;
