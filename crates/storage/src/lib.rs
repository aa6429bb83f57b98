#![forbid(unsafe_code)]

//! Persistence and sync for snapshots: the seal/open pipeline, model migrations, batch plan
//! application, the SQLite-backed local store and the sync engine.

pub mod migrate;
pub mod pipeline;
pub mod snapshot;
mod store;
pub mod sync;
pub mod time;

pub use store::{
    LocalClock, SYNC_LEASE_TTL_MS, SqliteStore, StoreError, StoredSnapshot, SyncLogEntry,
};
