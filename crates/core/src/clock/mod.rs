#![forbid(unsafe_code)]

use std::cmp::Ordering;

/// One device's view of the three logical clocks, read fresh at the start of a sync attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockTriple {
    pub local: u64,
    pub remote: u64,
    pub last_sync: u64,
}

impl ClockTriple {
    pub fn new(local: u64, remote: u64, last_sync: u64) -> Self {
        Self {
            local,
            remote,
            last_sync,
        }
    }

    pub fn resolve(&self) -> Result<SyncDisposition, ClockError> {
        resolve(self.local, self.remote, self.last_sync)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncDisposition {
    InSync,
    LocalUpdateRequired,
    RemoteUpdateRequired,
    DataDiverged,
    RemoteNotUpToDateDespiteSync,
    LastSyncNotUpToDate,
}

impl SyncDisposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InSync => "in_sync",
            Self::LocalUpdateRequired => "local_update_required",
            Self::RemoteUpdateRequired => "remote_update_required",
            Self::DataDiverged => "data_diverged",
            Self::RemoteNotUpToDateDespiteSync => "remote_not_up_to_date_despite_sync",
            Self::LastSyncNotUpToDate => "last_sync_not_up_to_date",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockError {
    /// `last_sync > local`: the local clock is corrupted. Sync must halt.
    Precondition { local: u64, last_sync: u64 },
    /// No branch of the resolver matched. Indicates a resolver bug; never defaulted.
    Inconclusive {
        local: u64,
        remote: u64,
        last_sync: u64,
    },
}

impl std::fmt::Display for ClockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precondition { local, last_sync } => write!(
                f,
                "clock precondition violated (last_sync={last_sync} > local={local})"
            ),
            Self::Inconclusive {
                local,
                remote,
                last_sync,
            } => write!(
                f,
                "inconclusive sync state (local={local}, remote={remote}, last_sync={last_sync})"
            ),
        }
    }
}

impl std::error::Error for ClockError {}

pub fn resolve(local: u64, remote: u64, last_sync: u64) -> Result<SyncDisposition, ClockError> {
    if last_sync > local {
        return Err(ClockError::Precondition { local, last_sync });
    }

    let disposition = match local.cmp(&remote) {
        Ordering::Equal => {
            if last_sync == local {
                Some(SyncDisposition::InSync)
            } else {
                Some(SyncDisposition::LastSyncNotUpToDate)
            }
        }
        Ordering::Greater => {
            if last_sync < remote {
                Some(SyncDisposition::DataDiverged)
            } else if last_sync < local {
                Some(SyncDisposition::RemoteUpdateRequired)
            } else if last_sync == local {
                Some(SyncDisposition::RemoteNotUpToDateDespiteSync)
            } else {
                None
            }
        }
        Ordering::Less => {
            if last_sync != local {
                Some(SyncDisposition::DataDiverged)
            } else {
                Some(SyncDisposition::LocalUpdateRequired)
            }
        }
    };

    disposition.ok_or(ClockError::Inconclusive {
        local,
        remote,
        last_sync,
    })
}

#[cfg(test)]
mod tests;
