#![forbid(unsafe_code)]

use crate::migrate::MigrationError;
use crate::pipeline::PipelineError;
use crate::snapshot::SnapshotError;
use pf_core::clock::ClockError;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    Json(serde_json::Error),
    InvalidInput(&'static str),
    Clock(ClockError),
    Pipeline(PipelineError),
    Migration(MigrationError),
    Snapshot(SnapshotError),
    DigestMismatch { expected: String, actual: String },
    SyncAlreadyInProgress { started_at_ms: u64 },
    Remote(String),
}

impl StoreError {
    /// Stable code used at the tool boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(message) if message.starts_with("RESET_REQUIRED") => {
                "RESET_REQUIRED"
            }
            Self::InvalidInput(_) | Self::Snapshot(_) => "INVALID_INPUT",
            Self::Clock(ClockError::Precondition { .. }) => "PRECONDITION",
            Self::Clock(ClockError::Inconclusive { .. }) => "INCONCLUSIVE",
            Self::Pipeline(err) => err.code(),
            Self::Migration(err) => err.code(),
            Self::SyncAlreadyInProgress { .. } => "SYNC_IN_PROGRESS",
            Self::Io(_)
            | Self::Sql(_)
            | Self::Json(_)
            | Self::DigestMismatch { .. }
            | Self::Remote(_) => "STORE_ERROR",
        }
    }

    /// Clock corruption and resolver gaps are bugs, everything else is normal operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Clock(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::Json(err) => write!(f, "json: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Clock(err) => write!(f, "{err}"),
            Self::Pipeline(err) => write!(f, "{err}"),
            Self::Migration(err) => write!(f, "{err}"),
            Self::Snapshot(err) => write!(f, "snapshot: {err}"),
            Self::DigestMismatch { expected, actual } => write!(
                f,
                "stored snapshot digest mismatch (expected={expected}, actual={actual})"
            ),
            Self::SyncAlreadyInProgress { started_at_ms } => {
                write!(f, "sync already in progress (started_at_ms={started_at_ms})")
            }
            Self::Remote(message) => write!(f, "remote: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ClockError> for StoreError {
    fn from(value: ClockError) -> Self {
        Self::Clock(value)
    }
}

impl From<PipelineError> for StoreError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<MigrationError> for StoreError {
    fn from(value: MigrationError) -> Self {
        Self::Migration(value)
    }
}

impl From<SnapshotError> for StoreError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}
