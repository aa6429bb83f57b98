#![forbid(unsafe_code)]

mod steps;

pub use steps::{INBOX_PROJECT, TODAY_TAG, initial_snapshot};

use crate::snapshot::{AppSnapshot, SnapshotError};
use pf_core::model_version::{self, ModelVersionCheck};

pub const CURRENT_MODEL_VERSION: f64 = 3.0;

/// Ambient inputs a step may consult. Everything else a step sees comes from the snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationContext {
    /// Calendar day (`YYYY-MM-DD`) the migration runs on.
    pub today: String,
}

impl MigrationContext {
    pub fn new(today: impl Into<String>) -> Self {
        Self {
            today: today.into(),
        }
    }

    pub fn for_ms(now_ms: u64) -> Self {
        Self::new(crate::time::day_of(now_ms))
    }
}

pub type StepFn = fn(&mut AppSnapshot, &MigrationContext) -> Result<(), SnapshotError>;

#[derive(Clone, Copy)]
pub struct MigrationStep {
    pub from_version: f64,
    pub to_version: f64,
    pub description: &'static str,
    pub apply: StepFn,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MigrationError {
    StepFailed {
        index: usize,
        from_version: f64,
        to_version: f64,
        message: String,
    },
    BelowMinimum {
        version: f64,
        minimum: f64,
    },
    AheadOfLatest {
        version: f64,
        latest: f64,
    },
    InvalidRegistry(String),
}

impl MigrationError {
    pub fn code(&self) -> &'static str {
        "MIGRATION_FAILED"
    }
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StepFailed {
                index,
                from_version,
                to_version,
                message,
            } => write!(
                f,
                "migration step {index} ({from_version} -> {to_version}) failed: {message}"
            ),
            Self::BelowMinimum { version, minimum } => write!(
                f,
                "model version {version} is older than the oldest supported version {minimum}"
            ),
            Self::AheadOfLatest { version, latest } => write!(
                f,
                "model version {version} is newer than this client understands (latest={latest})"
            ),
            Self::InvalidRegistry(message) => write!(f, "invalid migration registry: {message}"),
        }
    }
}

impl std::error::Error for MigrationError {}

/// The ordered, immutable chain of model migrations.
#[derive(Clone, Debug)]
pub struct MigrationRegistry {
    steps: Vec<MigrationStep>,
}

impl MigrationRegistry {
    pub fn new(steps: Vec<MigrationStep>) -> Result<Self, MigrationError> {
        if steps.is_empty() {
            return Err(MigrationError::InvalidRegistry(
                "at least one step is required".to_string(),
            ));
        }
        for (index, step) in steps.iter().enumerate() {
            if step.description.trim().is_empty() {
                return Err(MigrationError::InvalidRegistry(format!(
                    "step {index} has no description"
                )));
            }
            if !step.from_version.is_finite()
                || !step.to_version.is_finite()
                || step.from_version < 0.0
                || step.from_version >= step.to_version
            {
                return Err(MigrationError::InvalidRegistry(format!(
                    "step {index} must go from a lower to a higher version"
                )));
            }
        }
        for (index, pair) in steps.windows(2).enumerate() {
            if pair[0].to_version != pair[1].from_version {
                return Err(MigrationError::InvalidRegistry(format!(
                    "step {} must start where step {index} ends ({})",
                    index + 1,
                    pair[0].to_version
                )));
            }
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn min_supported_version(&self) -> f64 {
        self.steps.first().map_or(0.0, |step| step.from_version)
    }

    pub fn latest_version(&self) -> f64 {
        self.steps.last().map_or(0.0, |step| step.to_version)
    }

    pub fn needs_migration(&self, version: f64) -> bool {
        version < self.latest_version()
    }

    /// Runs every step that ends above the snapshot's version, in order. A snapshot tagged
    /// between two steps' versions still gets the step it sits inside. The snapshot is
    /// consumed; on failure nothing partially migrated escapes.
    pub fn migrate(
        &self,
        mut snapshot: AppSnapshot,
        ctx: &MigrationContext,
    ) -> Result<AppSnapshot, MigrationError> {
        let version = snapshot.model_version;
        let minimum = self.min_supported_version();
        let latest = self.latest_version();
        if !version.is_finite() || version < minimum {
            return Err(MigrationError::BelowMinimum { version, minimum });
        }
        if version > latest {
            return Err(MigrationError::AheadOfLatest { version, latest });
        }

        for (index, step) in self.steps.iter().enumerate() {
            if step.to_version <= snapshot.model_version {
                continue;
            }
            (step.apply)(&mut snapshot, ctx).map_err(|err| MigrationError::StepFailed {
                index,
                from_version: step.from_version,
                to_version: step.to_version,
                message: err.to_string(),
            })?;
            snapshot.model_version = step.to_version;
            tracing::info!(
                index,
                from = step.from_version,
                to = step.to_version,
                description = step.description,
                "migration step applied"
            );
        }
        Ok(snapshot)
    }

    /// Accepts a snapshot produced elsewhere: migrates older data, passes equal or
    /// minor-ahead data through, and refuses data from a newer major model. Returns the
    /// version migrated from when a migration ran.
    pub fn bring_current(
        &self,
        snapshot: AppSnapshot,
        ctx: &MigrationContext,
    ) -> Result<(AppSnapshot, Option<f64>), MigrationError> {
        let latest = self.latest_version();
        let version = snapshot.model_version;
        match model_version::check(latest, version) {
            ModelVersionCheck::RemoteMajorAhead => {
                Err(MigrationError::AheadOfLatest { version, latest })
            }
            ModelVersionCheck::Equal | ModelVersionCheck::RemoteMinorAhead => Ok((snapshot, None)),
            ModelVersionCheck::MinorUpdate | ModelVersionCheck::MajorUpdate => {
                let migrated = self.migrate(snapshot, ctx)?;
                Ok((migrated, Some(version)))
            }
        }
    }
}

/// The built-in chain, `1 -> 2 -> 3`.
pub fn default_registry() -> MigrationRegistry {
    MigrationRegistry {
        steps: steps::builtin(),
    }
}

#[cfg(test)]
mod tests;
