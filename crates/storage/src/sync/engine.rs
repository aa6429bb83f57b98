#![forbid(unsafe_code)]

use super::conflict::{ConflictPrompt, ConflictResolution, ConflictView, present_conflict};
use super::remote::{RemoteMeta, RemoteTarget};
use crate::migrate::{MigrationContext, MigrationRegistry, default_registry};
use crate::pipeline::{Codecs, Opened};
use crate::snapshot::AppSnapshot;
use crate::{LocalClock, SqliteStore, StoreError};
use pf_core::clock::{ClockTriple, SyncDisposition};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum SyncOutcome {
    InSync,
    Pushed {
        local_ms: u64,
    },
    Pulled {
        remote_ms: u64,
        migrated_from: Option<f64>,
    },
    /// Both sides already agreed; only `last_sync` was stale.
    BookkeepingRepaired {
        last_sync_ms: u64,
    },
    /// Divergence that nobody resolved.
    Cancelled {
        conflict: ConflictView,
    },
    /// The local side believes it pushed, but the remote clock never moved. Left to a human.
    RemoteNotUpToDate {
        local_ms: u64,
        remote_ms: u64,
    },
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InSync => "in_sync",
            Self::Pushed { .. } => "pushed",
            Self::Pulled { .. } => "pulled",
            Self::BookkeepingRepaired { .. } => "bookkeeping_repaired",
            Self::Cancelled { .. } => "cancelled",
            Self::RemoteNotUpToDate { .. } => "remote_not_up_to_date",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            Self::InSync => None,
            Self::Pushed { local_ms } => Some(format!("local={local_ms}")),
            Self::Pulled {
                remote_ms,
                migrated_from,
            } => Some(match migrated_from {
                Some(from) => format!("remote={remote_ms} migrated_from={from}"),
                None => format!("remote={remote_ms}"),
            }),
            Self::BookkeepingRepaired { last_sync_ms } => {
                Some(format!("last_sync={last_sync_ms}"))
            }
            Self::Cancelled { conflict } => Some(format!(
                "local={} remote={} last_sync={}",
                conflict.local, conflict.remote, conflict.last_sync
            )),
            Self::RemoteNotUpToDate {
                local_ms,
                remote_ms,
            } => Some(format!("local={local_ms} remote={remote_ms}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncStatus {
    pub local_ms: u64,
    pub last_sync_ms: u64,
    /// `None` when the remote has never been written.
    pub remote_ms: Option<u64>,
    pub remote_model_version: Option<f64>,
    pub disposition: SyncDisposition,
}

/// Runs sync attempts against a store. Owns the codecs and the migration chain; the
/// in-flight guard lives in the store so every handle on it sees the same lease.
#[derive(Debug)]
pub struct SyncEngine {
    codecs: Codecs,
    registry: MigrationRegistry,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new(Codecs::plain(), default_registry())
    }
}

impl SyncEngine {
    pub fn new(codecs: Codecs, registry: MigrationRegistry) -> Self {
        Self { codecs, registry }
    }

    pub fn codecs(&self) -> &Codecs {
        &self.codecs
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Resolves where the two sides stand without moving any data.
    pub fn status(
        &self,
        store: &SqliteStore,
        remote: &dyn RemoteTarget,
    ) -> Result<SyncStatus, StoreError> {
        let local = store.clock()?;
        let meta = remote.read_meta()?;
        let disposition = match meta {
            Some(meta) => self.resolve(&local, &meta)?,
            None => SyncDisposition::RemoteUpdateRequired,
        };
        Ok(SyncStatus {
            local_ms: local.local_ms,
            last_sync_ms: local.last_sync_ms,
            remote_ms: meta.map(|meta| meta.last_update_ms),
            remote_model_version: meta.map(|meta| meta.model_version),
            disposition,
        })
    }

    /// One sync attempt. Every outcome and every failure lands in the store's sync log. Fails
    /// with `SyncAlreadyInProgress` while another handle holds the store's lease.
    pub fn run(
        &self,
        store: &mut SqliteStore,
        remote: &dyn RemoteTarget,
        prompt: &mut dyn ConflictPrompt,
        now_ms: u64,
    ) -> Result<SyncOutcome, StoreError> {
        let lease = store.begin_sync(now_ms)?;
        let result = self.attempt(store, remote, prompt, now_ms);
        if let Err(err) = store.finish_sync(lease) {
            tracing::warn!(error = %err, "sync lease release failed");
        }

        let logged = match &result {
            Ok(outcome) => {
                store.append_sync_log(now_ms, outcome.as_str(), outcome.detail().as_deref())
            }
            Err(err) => {
                if err.is_fatal() {
                    tracing::error!(code = err.code(), error = %err, "sync halted");
                } else {
                    tracing::warn!(code = err.code(), error = %err, "sync failed");
                }
                store.append_sync_log(now_ms, "error", Some(&err.to_string()))
            }
        };
        if let Err(err) = logged {
            tracing::warn!(error = %err, "sync log append failed");
        }
        result
    }

    fn attempt(
        &self,
        store: &mut SqliteStore,
        remote: &dyn RemoteTarget,
        prompt: &mut dyn ConflictPrompt,
        now_ms: u64,
    ) -> Result<SyncOutcome, StoreError> {
        let local = store.clock()?;
        let Some(meta) = remote.read_meta()? else {
            tracing::debug!(local = local.local_ms, "remote has no meta; first push");
            return self.push(store, remote, None, now_ms);
        };

        match self.resolve(&local, &meta)? {
            SyncDisposition::InSync => Ok(SyncOutcome::InSync),
            SyncDisposition::LastSyncNotUpToDate => {
                store.record_synced(local.local_ms)?;
                Ok(SyncOutcome::BookkeepingRepaired {
                    last_sync_ms: local.local_ms,
                })
            }
            SyncDisposition::RemoteUpdateRequired => self.push(store, remote, Some(&meta), now_ms),
            SyncDisposition::LocalUpdateRequired => self.pull(store, remote, &meta, now_ms),
            SyncDisposition::RemoteNotUpToDateDespiteSync => {
                tracing::warn!(
                    local = local.local_ms,
                    remote = meta.last_update_ms,
                    "remote did not advance after the last sync"
                );
                Ok(SyncOutcome::RemoteNotUpToDate {
                    local_ms: local.local_ms,
                    remote_ms: meta.last_update_ms,
                })
            }
            SyncDisposition::DataDiverged => {
                let view = ConflictView::new(ClockTriple::new(
                    local.local_ms,
                    meta.last_update_ms,
                    local.last_sync_ms,
                ));
                match present_conflict(prompt, &view) {
                    ConflictResolution::UseLocal => {
                        self.push(store, remote, Some(&meta), now_ms)
                    }
                    ConflictResolution::UseRemote => self.pull(store, remote, &meta, now_ms),
                    ConflictResolution::Cancel => Ok(SyncOutcome::Cancelled { conflict: view }),
                }
            }
        }
    }

    fn resolve(
        &self,
        local: &LocalClock,
        meta: &RemoteMeta,
    ) -> Result<SyncDisposition, StoreError> {
        let disposition =
            ClockTriple::new(local.local_ms, meta.last_update_ms, local.last_sync_ms).resolve()?;
        tracing::debug!(
            disposition = disposition.as_str(),
            local = local.local_ms,
            remote = meta.last_update_ms,
            last_sync = local.last_sync_ms,
            "sync disposition resolved"
        );
        Ok(disposition)
    }

    /// Uploads the local snapshot. The pushed clock always ends above the remote clock it
    /// replaces, so a device that synced the overwritten copy sees the remote as newer.
    fn push(
        &self,
        store: &mut SqliteStore,
        remote: &dyn RemoteTarget,
        replacing: Option<&RemoteMeta>,
        now_ms: u64,
    ) -> Result<SyncOutcome, StoreError> {
        let snapshot = match self.load_current(store, now_ms)? {
            Some(snapshot) => snapshot,
            None => {
                let snapshot = crate::migrate::initial_snapshot();
                self.commit_snapshot(store, &snapshot, now_ms)?;
                snapshot
            }
        };
        let sealed = self.codecs.seal(snapshot.state(), snapshot.model_version)?;
        let mut local_ms = store.clock()?.local_ms;
        if let Some(meta) = replacing
            && local_ms <= meta.last_update_ms
        {
            let past_remote = now_ms.max(meta.last_update_ms.saturating_add(1));
            local_ms = store.record_local_write(past_remote)?.local_ms;
            tracing::debug!(
                remote = meta.last_update_ms,
                local = local_ms,
                "local clock moved past the remote it overwrites"
            );
        }
        remote.write(
            &RemoteMeta {
                last_update_ms: local_ms,
                model_version: snapshot.model_version,
            },
            &sealed,
        )?;
        store.record_synced(local_ms)?;
        Ok(SyncOutcome::Pushed { local_ms })
    }

    fn pull(
        &self,
        store: &mut SqliteStore,
        remote: &dyn RemoteTarget,
        meta: &RemoteMeta,
        now_ms: u64,
    ) -> Result<SyncOutcome, StoreError> {
        let sealed = remote.read_snapshot()?.ok_or_else(|| {
            StoreError::Remote("remote meta exists but its snapshot is missing".to_string())
        })?;
        let (snapshot, migrated_from) = self.open_current(&sealed, now_ms)?;
        let resealed = self.codecs.seal(snapshot.state(), snapshot.model_version)?;
        store.commit_pulled(&resealed, meta.last_update_ms, now_ms)?;
        Ok(SyncOutcome::Pulled {
            remote_ms: meta.last_update_ms,
            migrated_from,
        })
    }

    /// Opens sealed text from anywhere and brings it to the current model version.
    pub(super) fn open_current(
        &self,
        sealed: &str,
        now_ms: u64,
    ) -> Result<(AppSnapshot, Option<f64>), StoreError> {
        let opened: Opened<Value> = self.codecs.open(sealed)?;
        let snapshot = AppSnapshot::from_value(opened.model_version, opened.data)?;
        Ok(self
            .registry
            .bring_current(snapshot, &MigrationContext::for_ms(now_ms))?)
    }

    /// The local snapshot at the current model version, or `None` before the first write. An
    /// outdated local snapshot is migrated and saved back without touching the clocks.
    pub fn load_current(
        &self,
        store: &mut SqliteStore,
        now_ms: u64,
    ) -> Result<Option<AppSnapshot>, StoreError> {
        let Some(stored) = store.load_sealed()? else {
            return Ok(None);
        };
        let (snapshot, migrated_from) = self.open_current(&stored.sealed, now_ms)?;
        if migrated_from.is_some() {
            let resealed = self.codecs.seal(snapshot.state(), snapshot.model_version)?;
            store.save_sealed(&resealed, now_ms)?;
        }
        Ok(Some(snapshot))
    }

    /// Seals and saves a locally changed snapshot, advancing the local clock.
    pub fn commit_snapshot(
        &self,
        store: &mut SqliteStore,
        snapshot: &AppSnapshot,
        now_ms: u64,
    ) -> Result<LocalClock, StoreError> {
        let sealed = self.codecs.seal(snapshot.state(), snapshot.model_version)?;
        store.commit_local_change(&sealed, now_ms)
    }
}
