#![forbid(unsafe_code)]

use super::engine::SyncEngine;
use crate::migrate::initial_snapshot;
use crate::snapshot::ApplySummary;
use crate::{LocalClock, SqliteStore, StoreError};
use pf_core::batch::{AppliedPlan, BatchError, BatchOperation, BatchPolicy, TaskIdSource, validate};

/// A batch that passed validation and was written to the local store.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchCommit {
    pub plan: AppliedPlan,
    pub summary: ApplySummary,
    pub clock: LocalClock,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportCommit {
    pub model_version: f64,
    pub migrated_from: Option<f64>,
    pub clock: LocalClock,
}

impl SyncEngine {
    /// Validates `operations` against the local snapshot and, only if every operation is
    /// valid, applies them and commits the result. Rejected batches leave the store untouched.
    pub fn apply_batch(
        &self,
        store: &mut SqliteStore,
        project_id: &str,
        operations: &[BatchOperation],
        policy: &BatchPolicy,
        ids: &mut impl TaskIdSource,
        now_ms: u64,
    ) -> Result<Result<BatchCommit, Vec<BatchError>>, StoreError> {
        let mut snapshot = match self.load_current(store, now_ms)? {
            Some(snapshot) => snapshot,
            None => initial_snapshot(),
        };
        let hierarchy = snapshot.task_hierarchy()?;
        let plan = match validate(project_id, operations, &hierarchy, policy, ids) {
            Ok(plan) => plan,
            Err(errors) => return Ok(Err(errors)),
        };
        let summary = snapshot.apply_plan(&plan, now_ms)?;
        let clock = self.commit_snapshot(store, &snapshot, now_ms)?;
        Ok(Ok(BatchCommit {
            plan,
            summary,
            clock,
        }))
    }

    /// Replaces the local snapshot with sealed text produced elsewhere, migrating it first.
    pub fn import_sealed(
        &self,
        store: &mut SqliteStore,
        sealed: &str,
        now_ms: u64,
    ) -> Result<ImportCommit, StoreError> {
        let (snapshot, migrated_from) = self.open_current(sealed, now_ms)?;
        let clock = self.commit_snapshot(store, &snapshot, now_ms)?;
        tracing::info!(
            model_version = snapshot.model_version,
            migrated = migrated_from.is_some(),
            "snapshot imported"
        );
        Ok(ImportCommit {
            model_version: snapshot.model_version,
            migrated_from,
            clock,
        })
    }

    /// The local snapshot sealed with the engine's codecs; a fresh one when nothing is stored.
    pub fn export_sealed(
        &self,
        store: &mut SqliteStore,
        now_ms: u64,
    ) -> Result<String, StoreError> {
        let snapshot = match self.load_current(store, now_ms)? {
            Some(snapshot) => snapshot,
            None => initial_snapshot(),
        };
        Ok(self.codecs().seal(snapshot.state(), snapshot.model_version)?)
    }
}
