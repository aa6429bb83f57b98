#![forbid(unsafe_code)]

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use super::types::*;

const MAX_MINT_ATTEMPTS: usize = 16;

/// Validates a batch against the live hierarchy and, if every check passes, mints real ids for
/// the batch's temp ids and returns the plan to apply. Nothing is returned on failure except the
/// complete error list, sorted by operation index.
pub fn validate(
    project_id: &str,
    operations: &[BatchOperation],
    hierarchy: &Hierarchy,
    policy: &BatchPolicy,
    ids: &mut impl TaskIdSource,
) -> Result<AppliedPlan, Vec<BatchError>> {
    if !hierarchy.contains_project(project_id) {
        return Err(vec![BatchError::batch(
            BatchErrorKind::ValidationError,
            format!("project '{project_id}' does not exist"),
        )]);
    }

    let mut errors = Vec::new();
    let temp_ids = collect_temp_ids(operations, hierarchy, &mut errors);

    let mut sim = Simulation::new(project_id, policy, hierarchy, &temp_ids, errors);
    let mut steps = Vec::with_capacity(operations.len());
    for (index, op) in operations.iter().enumerate() {
        if let Some(step) = sim.apply(index, op) {
            steps.push(step);
        }
    }
    sim.check_cycles_and_depth();

    let mut errors = sim.errors;
    if !errors.is_empty() {
        errors.sort_by_key(|err| err.operation_index);
        return Err(errors);
    }

    let minted = mint_ids(operations, &temp_ids, hierarchy, ids)?;
    let real = |key: &str| minted.get(key).cloned().unwrap_or_else(|| key.to_string());
    let steps = steps
        .into_iter()
        .map(|step| translate_step(step, &real))
        .collect();

    Ok(AppliedPlan {
        project_id: project_id.to_string(),
        steps,
        created_task_ids: minted.into_iter().collect(),
    })
}

/// First pass: every usable temp id, mapped to the index of the create that introduces it.
fn collect_temp_ids(
    operations: &[BatchOperation],
    hierarchy: &Hierarchy,
    errors: &mut Vec<BatchError>,
) -> HashMap<String, usize> {
    let mut temp_ids = HashMap::new();
    for (index, op) in operations.iter().enumerate() {
        let BatchOperation::Create { temp_id, fields } = op else {
            continue;
        };
        if fields.title.trim().is_empty() {
            errors.push(BatchError::at(
                index,
                BatchErrorKind::ValidationError,
                "title must not be empty",
            ));
        }
        if temp_id.trim().is_empty() {
            errors.push(BatchError::at(
                index,
                BatchErrorKind::ValidationError,
                "tempId must not be empty",
            ));
            continue;
        }
        if hierarchy.contains_task(temp_id) {
            errors.push(BatchError::at(
                index,
                BatchErrorKind::ValidationError,
                format!("tempId '{temp_id}' collides with an existing task id"),
            ));
            continue;
        }
        match temp_ids.entry(temp_id.clone()) {
            Entry::Occupied(first) => errors.push(BatchError::at(
                index,
                BatchErrorKind::ValidationError,
                format!(
                    "tempId '{temp_id}' is already used by operation {}",
                    first.get()
                ),
            )),
            Entry::Vacant(slot) => {
                slot.insert(index);
            }
        }
    }
    temp_ids
}

#[derive(Clone, Debug)]
struct SimNode {
    parent: Option<String>,
    project: Option<String>,
    /// Index of the batch operation that set `parent`, if any.
    link_origin: Option<usize>,
}

/// The prospective task forest, keyed by existing id or temp id, advanced one operation at a time.
struct Simulation<'a> {
    project_id: &'a str,
    policy: &'a BatchPolicy,
    temp_ids: &'a HashMap<String, usize>,
    nodes: BTreeMap<String, SimNode>,
    created: HashSet<String>,
    removed: HashSet<String>,
    errors: Vec<BatchError>,
}

impl<'a> Simulation<'a> {
    fn new(
        project_id: &'a str,
        policy: &'a BatchPolicy,
        hierarchy: &Hierarchy,
        temp_ids: &'a HashMap<String, usize>,
        errors: Vec<BatchError>,
    ) -> Self {
        let nodes = hierarchy
            .nodes()
            .map(|node| {
                (
                    node.id.clone(),
                    SimNode {
                        parent: node.parent_id.clone(),
                        project: node.project_id.clone(),
                        link_origin: None,
                    },
                )
            })
            .collect();
        Self {
            project_id,
            policy,
            temp_ids,
            nodes,
            created: HashSet::new(),
            removed: HashSet::new(),
            errors,
        }
    }

    fn fail(&mut self, index: usize, kind: BatchErrorKind, message: String) {
        self.errors.push(BatchError::at(index, kind, message));
    }

    fn apply(&mut self, index: usize, op: &BatchOperation) -> Option<PlannedStep> {
        match op {
            BatchOperation::Create { temp_id, fields } => self.create(index, temp_id, fields),
            BatchOperation::Update { task_id, fields } => self.update(index, task_id, fields),
            BatchOperation::Delete { task_id } => self.delete(index, task_id),
            BatchOperation::Reorder { task_ids } => self.reorder(index, task_ids),
        }
    }

    /// Direct targets must already be alive at this point of the batch.
    fn resolve_target(&mut self, index: usize, raw: &str) -> Option<String> {
        if raw.is_empty() {
            self.fail(
                index,
                BatchErrorKind::ValidationError,
                "task id must not be empty".to_string(),
            );
            return None;
        }
        if self.nodes.contains_key(raw) {
            return Some(raw.to_string());
        }
        let message = if self.removed.contains(raw) {
            format!("task '{raw}' was deleted earlier in the batch")
        } else if self.temp_ids.contains_key(raw) {
            format!("tempId '{raw}' is used before the create that introduces it")
        } else {
            format!("task '{raw}' does not exist")
        };
        self.fail(index, BatchErrorKind::TaskNotFound, message);
        None
    }

    /// Parent links may also point forward at any temp id the batch introduces.
    fn resolve_parent(&mut self, index: usize, raw: &str) -> Option<String> {
        if self.nodes.contains_key(raw)
            || (self.temp_ids.contains_key(raw) && !self.removed.contains(raw))
        {
            return Some(raw.to_string());
        }
        let message = if self.removed.contains(raw) {
            format!("parent '{raw}' was deleted earlier in the batch")
        } else {
            format!("parent '{raw}' does not exist")
        };
        self.fail(index, BatchErrorKind::TaskNotFound, message);
        None
    }

    fn check_project(&mut self, index: usize, key: &str, role: &str) {
        if !self.policy.enforce_project {
            return;
        }
        // Forward temp ids are created inside the batch project.
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        if node.project.as_deref() != Some(self.project_id) {
            let message = format!(
                "{role} '{key}' does not belong to project '{}'",
                self.project_id
            );
            self.fail(index, BatchErrorKind::OutsideProject, message);
        }
    }

    fn create(
        &mut self,
        index: usize,
        temp_id: &str,
        fields: &CreateFields,
    ) -> Option<PlannedStep> {
        if self.temp_ids.get(temp_id) != Some(&index) {
            return None;
        }
        let parent = fields
            .parent_id
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| self.resolve_parent(index, raw));
        if let Some(key) = &parent {
            self.check_project(index, key, "parent");
        }

        self.nodes.insert(
            temp_id.to_string(),
            SimNode {
                parent: parent.clone(),
                project: Some(self.project_id.to_string()),
                link_origin: parent.as_ref().map(|_| index),
            },
        );
        self.created.insert(temp_id.to_string());

        Some(PlannedStep::Create {
            task_id: temp_id.to_string(),
            fields: CreateFields {
                parent_id: parent,
                ..fields.clone()
            },
        })
    }

    fn update(&mut self, index: usize, raw: &str, fields: &UpdateFields) -> Option<PlannedStep> {
        let key = self.resolve_target(index, raw)?;
        self.check_project(index, &key, "task");

        if fields
            .title
            .as_deref()
            .is_some_and(|title| title.trim().is_empty())
        {
            self.fail(
                index,
                BatchErrorKind::ValidationError,
                "title must not be empty".to_string(),
            );
        }

        let parent = match &fields.parent {
            None => None,
            Some(ParentChange::Under(raw_parent)) if !raw_parent.is_empty() => {
                let resolved = self.resolve_parent(index, raw_parent);
                if let Some(parent_key) = &resolved {
                    self.check_project(index, parent_key, "parent");
                    if let Some(node) = self.nodes.get_mut(&key) {
                        node.parent = Some(parent_key.clone());
                        node.link_origin = Some(index);
                    }
                }
                resolved.map(ParentChange::Under)
            }
            Some(_) => {
                if let Some(node) = self.nodes.get_mut(&key) {
                    node.parent = None;
                    node.link_origin = None;
                }
                Some(ParentChange::Root)
            }
        };

        let sub_task_ids = match &fields.sub_task_ids {
            Some(order) => Some(self.child_order(index, &key, order)),
            None => None,
        };

        Some(PlannedStep::Update {
            task_id: key,
            fields: UpdateFields {
                parent,
                sub_task_ids,
                ..fields.clone()
            },
        })
    }

    fn child_order(&mut self, index: usize, parent_key: &str, order: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut keys = Vec::with_capacity(order.len());
        for raw in order {
            if !seen.insert(raw.as_str()) {
                self.fail(
                    index,
                    BatchErrorKind::ValidationError,
                    format!("subTaskIds lists '{raw}' more than once"),
                );
                continue;
            }
            let Some(child) = self.resolve_target(index, raw) else {
                continue;
            };
            let is_child = self
                .nodes
                .get(&child)
                .is_some_and(|node| node.parent.as_deref() == Some(parent_key));
            if !is_child {
                self.fail(
                    index,
                    BatchErrorKind::ValidationError,
                    format!("'{child}' is not a subtask of '{parent_key}'"),
                );
                continue;
            }
            keys.push(child);
        }
        keys
    }

    fn delete(&mut self, index: usize, raw: &str) -> Option<PlannedStep> {
        let key = self.resolve_target(index, raw)?;
        self.check_project(index, &key, "task");

        let removed = self.subtree(&key);
        for id in &removed {
            self.nodes.remove(id);
            self.removed.insert(id.clone());
        }
        Some(PlannedStep::Delete {
            task_id: key,
            removed,
        })
    }

    /// `root` followed by all of its live descendants, breadth first.
    fn subtree(&self, root: &str) -> Vec<String> {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, node) in &self.nodes {
            if let Some(parent) = node.parent.as_deref() {
                children.entry(parent).or_default().push(id.as_str());
            }
        }

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id.to_string());
            if let Some(kids) = children.get(id) {
                queue.extend(kids.iter().copied());
            }
        }
        out
    }

    fn reorder(&mut self, index: usize, order: &[String]) -> Option<PlannedStep> {
        let mut seen = HashSet::new();
        let mut keys = Vec::with_capacity(order.len());
        for raw in order {
            if !seen.insert(raw.as_str()) {
                self.fail(
                    index,
                    BatchErrorKind::ValidationError,
                    format!("reorder lists '{raw}' more than once"),
                );
                continue;
            }
            if let Some(key) = self.resolve_target(index, raw) {
                self.check_project(index, &key, "task");
                keys.push(key);
            }
        }
        Some(PlannedStep::Reorder { task_ids: keys })
    }

    fn check_cycles_and_depth(&mut self) {
        let cycles = self.find_cycles();
        if !cycles.is_empty() {
            for cycle in cycles {
                let origin = cycle
                    .iter()
                    .filter_map(|id| self.nodes.get(id).and_then(|node| node.link_origin))
                    .min();
                let mut path = cycle.join(" -> ");
                if let Some(first) = cycle.first() {
                    path.push_str(" -> ");
                    path.push_str(first);
                }
                self.errors.push(BatchError {
                    operation_index: origin,
                    kind: BatchErrorKind::CircularDependency,
                    message: format!("tasks would form a cycle: {path}"),
                });
            }
            return;
        }

        if let Some(max_depth) = self.policy.max_depth {
            self.check_depth(max_depth);
        }
    }

    /// Each cycle in the parent-link graph, listed from a member towards its parents.
    fn find_cycles(&self) -> Vec<Vec<String>> {
        const ON_PATH: u8 = 1;
        const DONE: u8 = 2;

        let mut state: HashMap<&str, u8> = HashMap::new();
        let mut cycles = Vec::new();
        for start in self.nodes.keys() {
            let mut path: Vec<&str> = Vec::new();
            let mut current = Some(start.as_str());
            while let Some(id) = current {
                match state.get(id).copied() {
                    Some(ON_PATH) => {
                        if let Some(pos) = path.iter().position(|p| *p == id) {
                            cycles.push(path[pos..].iter().map(|p| p.to_string()).collect());
                        }
                        break;
                    }
                    Some(_) => break,
                    None => {}
                }
                state.insert(id, ON_PATH);
                path.push(id);
                current = self
                    .nodes
                    .get(id)
                    .and_then(|node| node.parent.as_deref())
                    .filter(|parent| self.nodes.contains_key(*parent));
            }
            for id in path {
                state.insert(id, DONE);
            }
        }
        cycles
    }

    /// Only violations introduced by this batch are reported, once per offending operation.
    fn check_depth(&mut self, max_depth: usize) {
        let mut offenders: BTreeMap<usize, (String, usize)> = BTreeMap::new();
        for (id, node) in &self.nodes {
            let mut depth = 0usize;
            let mut origin = node.link_origin;
            let mut current = node.parent.as_deref();
            while let Some(parent) = current {
                let Some(parent_node) = self.nodes.get(parent) else {
                    break;
                };
                depth += 1;
                if origin.is_none() {
                    origin = parent_node.link_origin;
                }
                current = parent_node.parent.as_deref();
            }
            if depth > max_depth
                && let Some(origin) = origin
            {
                offenders.entry(origin).or_insert((id.clone(), depth));
            }
        }

        for (index, (id, depth)) in offenders {
            self.fail(
                index,
                BatchErrorKind::DepthExceeded,
                format!("'{id}' would be nested {depth} levels deep (max {max_depth})"),
            );
        }
    }
}

fn mint_ids(
    operations: &[BatchOperation],
    temp_ids: &HashMap<String, usize>,
    hierarchy: &Hierarchy,
    ids: &mut impl TaskIdSource,
) -> Result<BTreeMap<String, String>, Vec<BatchError>> {
    let mut minted = BTreeMap::new();
    let mut used = HashSet::new();
    for (index, op) in operations.iter().enumerate() {
        let BatchOperation::Create { temp_id, .. } = op else {
            continue;
        };
        if temp_ids.get(temp_id) != Some(&index) {
            continue;
        }
        let real = (0..MAX_MINT_ATTEMPTS)
            .map(|_| ids.next_id())
            .find(|candidate| {
                !candidate.is_empty()
                    && !hierarchy.contains_task(candidate)
                    && used.insert(candidate.clone())
            })
            .ok_or_else(|| {
                vec![BatchError::at(
                    index,
                    BatchErrorKind::Unknown,
                    format!("could not mint a unique id for tempId '{temp_id}'"),
                )]
            })?;
        minted.insert(temp_id.clone(), real);
    }
    Ok(minted)
}

fn translate_step(step: PlannedStep, real: &impl Fn(&str) -> String) -> PlannedStep {
    match step {
        PlannedStep::Create { task_id, fields } => PlannedStep::Create {
            task_id: real(&task_id),
            fields: CreateFields {
                parent_id: fields.parent_id.as_deref().map(real),
                ..fields
            },
        },
        PlannedStep::Update { task_id, fields } => PlannedStep::Update {
            task_id: real(&task_id),
            fields: UpdateFields {
                parent: fields.parent.map(|change| match change {
                    ParentChange::Root => ParentChange::Root,
                    ParentChange::Under(parent) => ParentChange::Under(real(&parent)),
                }),
                sub_task_ids: fields
                    .sub_task_ids
                    .map(|order| order.iter().map(|id| real(id)).collect()),
                ..fields
            },
        },
        PlannedStep::Delete { task_id, removed } => PlannedStep::Delete {
            task_id: real(&task_id),
            removed: removed.iter().map(|id| real(id)).collect(),
        },
        PlannedStep::Reorder { task_ids } => PlannedStep::Reorder {
            task_ids: task_ids.iter().map(|id| real(id)).collect(),
        },
    }
}
