#![forbid(unsafe_code)]

use crate::StoreError;

/// Whether a sync attempt is in flight. The store persists it as a lease so separate handles
/// on one storage directory agree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Idle,
    InProgress {
        started_at_ms: u64,
    },
}

impl SyncState {
    pub fn begin(self, now_ms: u64) -> Result<Self, StoreError> {
        match self {
            Self::Idle => Ok(Self::InProgress {
                started_at_ms: now_ms,
            }),
            Self::InProgress { started_at_ms } => {
                Err(StoreError::SyncAlreadyInProgress { started_at_ms })
            }
        }
    }

    pub fn finish(self) -> Self {
        Self::Idle
    }

    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}
