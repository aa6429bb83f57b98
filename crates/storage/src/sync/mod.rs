#![forbid(unsafe_code)]

//! Sync orchestration: resolve the clocks, then push, pull, ask, or repair bookkeeping.

mod conflict;
mod engine;
mod guard;
mod local;
mod remote;

pub use conflict::{ConflictPrompt, ConflictResolution, ConflictView, present_conflict};
pub use engine::{SyncEngine, SyncOutcome, SyncStatus};
pub use guard::SyncState;
pub use local::{BatchCommit, ImportCommit};
pub use remote::{LocalDirRemote, RemoteMeta, RemoteTarget};

#[cfg(test)]
mod tests;
