#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOperation {
    Create {
        temp_id: String,
        fields: CreateFields,
    },
    Update {
        task_id: String,
        fields: UpdateFields,
    },
    Delete {
        task_id: String,
    },
    /// New order of the project's root tasks. Tasks left out keep their relative order after these.
    Reorder {
        task_ids: Vec<String>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateFields {
    pub title: String,
    pub notes: Option<String>,
    pub is_done: Option<bool>,
    pub time_estimate: Option<u64>,
    pub parent_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateFields {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub is_done: Option<bool>,
    pub time_estimate: Option<u64>,
    pub parent: Option<ParentChange>,
    /// Preferred order of the task's children.
    pub sub_task_ids: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParentChange {
    Root,
    Under(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub project_id: Option<String>,
}

/// Read-only view of the live task forest the validator checks a batch against.
#[derive(Clone, Debug, Default)]
pub struct Hierarchy {
    nodes: BTreeMap<String, TaskNode>,
    projects: BTreeSet<String>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.projects.insert(project_id.into());
        self
    }

    pub fn with_task(
        mut self,
        id: &str,
        parent_id: Option<&str>,
        project_id: Option<&str>,
    ) -> Self {
        self.insert(TaskNode {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            project_id: project_id.map(str::to_string),
        });
        self
    }

    pub fn add_project(&mut self, project_id: impl Into<String>) {
        self.projects.insert(project_id.into());
    }

    pub fn insert(&mut self, node: TaskNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn contains_task(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn contains_project(&self, project_id: &str) -> bool {
        self.projects.contains(project_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.values()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPolicy {
    pub enforce_project: bool,
    /// Deepest allowed nesting level; root tasks sit at depth 0. `None` disables the check.
    pub max_depth: Option<usize>,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            enforce_project: true,
            max_depth: None,
        }
    }
}

/// One operation of a validated batch with every temp id replaced by its minted id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlannedStep {
    Create {
        task_id: String,
        fields: CreateFields,
    },
    Update {
        task_id: String,
        fields: UpdateFields,
    },
    /// `removed` is the deleted task followed by every descendant it took with it.
    Delete {
        task_id: String,
        removed: Vec<String>,
    },
    Reorder {
        task_ids: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedPlan {
    pub project_id: String,
    pub steps: Vec<PlannedStep>,
    pub created_task_ids: BTreeMap<String, String>,
}

impl AppliedPlan {
    /// The last reorder in the batch wins.
    pub fn root_order(&self) -> Option<&[String]> {
        self.steps.iter().rev().find_map(|step| match step {
            PlannedStep::Reorder { task_ids } => Some(task_ids.as_slice()),
            _ => None,
        })
    }

    pub fn removed_task_ids(&self) -> BTreeSet<&str> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                PlannedStep::Delete { removed, .. } => Some(removed),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

pub trait TaskIdSource {
    fn next_id(&mut self) -> String;
}

impl<F> TaskIdSource for F
where
    F: FnMut() -> String,
{
    fn next_id(&mut self) -> String {
        self()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BatchErrorKind {
    ValidationError,
    CircularDependency,
    TaskNotFound,
    OutsideProject,
    DepthExceeded,
    Unknown,
}

impl BatchErrorKind {
    /// Wire type. The external type set is closed, so depth violations travel as validation errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError | Self::DepthExceeded => "VALIDATION_ERROR",
            Self::CircularDependency => "CIRCULAR_DEPENDENCY",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::OutsideProject => "OUTSIDE_PROJECT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchError {
    pub operation_index: Option<usize>,
    pub kind: BatchErrorKind,
    pub message: String,
}

impl BatchError {
    pub fn at(index: usize, kind: BatchErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation_index: Some(index),
            kind,
            message: message.into(),
        }
    }

    pub fn batch(kind: BatchErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation_index: None,
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.operation_index {
            Some(index) => write!(
                f,
                "{} at operation {index}: {}",
                self.kind.as_str(),
                self.message
            ),
            None => write!(f, "{}: {}", self.kind.as_str(), self.message),
        }
    }
}

impl std::error::Error for BatchError {}
