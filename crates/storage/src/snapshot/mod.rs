#![forbid(unsafe_code)]

mod apply;
mod state;

pub use apply::ApplySummary;
pub(crate) use state::*;

use pf_core::batch::{Hierarchy, TaskNode};
use serde_json::{Map, Value};

pub const TASK_STATE: &str = "task";
pub const PROJECT_STATE: &str = "project";
pub const TAG_STATE: &str = "tag";
pub const PLANNER_STATE: &str = "planner";
pub const ARCHIVE_YOUNG_STATE: &str = "archiveYoung";
pub const ARCHIVE_OLD_STATE: &str = "archiveOld";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotError {
    NotAnObject,
    WrongType { path: String, expected: &'static str },
    MissingEntity { kind: &'static str, id: String },
}

impl SnapshotError {
    pub(crate) fn wrong_type(path: &str, expected: &'static str) -> Self {
        Self::WrongType {
            path: path.to_string(),
            expected,
        }
    }
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "snapshot must be a JSON object"),
            Self::WrongType { path, expected } => write!(f, "{path} must be {expected}"),
            Self::MissingEntity { kind, id } => write!(f, "{kind} '{id}' does not exist"),
        }
    }
}

impl std::error::Error for SnapshotError {}

/// The full application state as one JSON object, tagged with the model version it was
/// produced under.
#[derive(Clone, Debug, PartialEq)]
pub struct AppSnapshot {
    pub model_version: f64,
    state: Map<String, Value>,
}

impl AppSnapshot {
    /// Empty task, project and tag states.
    pub fn new(model_version: f64) -> Self {
        let mut state = Map::new();
        for key in [TASK_STATE, PROJECT_STATE, TAG_STATE] {
            EntityState::default().put(&mut state, key);
        }
        Self {
            model_version,
            state,
        }
    }

    pub fn from_value(model_version: f64, value: Value) -> Result<Self, SnapshotError> {
        match value {
            Value::Object(state) => Ok(Self {
                model_version,
                state,
            }),
            _ => Err(SnapshotError::NotAnObject),
        }
    }

    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.state
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.state)
    }

    pub fn task(&self, id: &str) -> Option<&Value> {
        self.state
            .get(TASK_STATE)
            .and_then(|tasks| tasks.get("entities"))
            .and_then(|entities| entities.get(id))
    }

    pub fn project(&self, id: &str) -> Option<&Value> {
        self.state
            .get(PROJECT_STATE)
            .and_then(|projects| projects.get("entities"))
            .and_then(|entities| entities.get(id))
    }

    /// The validator's view of the task forest: id, parent and project per task, plus every
    /// known project id.
    pub fn task_hierarchy(&self) -> Result<Hierarchy, SnapshotError> {
        let mut hierarchy = Hierarchy::new();
        if let Some(projects) = EntityState::read(&self.state, PROJECT_STATE, PROJECT_STATE)? {
            for id in projects.ordered_ids() {
                hierarchy.add_project(id);
            }
        }
        if let Some(tasks) = EntityState::read(&self.state, TASK_STATE, TASK_STATE)? {
            for (id, entity) in &tasks.entities {
                hierarchy.insert(TaskNode {
                    id: id.clone(),
                    parent_id: str_field(entity, "parentId").map(str::to_string),
                    project_id: str_field(entity, "projectId").map(str::to_string),
                });
            }
        }
        Ok(hierarchy)
    }
}

#[cfg(test)]
mod tests;
