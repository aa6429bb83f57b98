#![forbid(unsafe_code)]

use super::*;
use pf_core::batch::{AppliedPlan, CreateFields, ParentChange, PlannedStep, UpdateFields};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl AppSnapshot {
    /// Applies a validated batch plan, then rebuilds the derived id lists so parents, the
    /// batch project and tags agree with the task entities. The snapshot is left untouched
    /// on error.
    pub fn apply_plan(
        &mut self,
        plan: &AppliedPlan,
        now_ms: u64,
    ) -> Result<ApplySummary, SnapshotError> {
        let mut state = self.state.clone();
        let mut tasks = EntityState::take(&mut state, TASK_STATE, TASK_STATE)?.unwrap_or_default();
        let mut projects =
            EntityState::take(&mut state, PROJECT_STATE, PROJECT_STATE)?.unwrap_or_default();
        if !projects.entities.contains_key(&plan.project_id) {
            return Err(SnapshotError::MissingEntity {
                kind: "project",
                id: plan.project_id.clone(),
            });
        }

        let mut summary = ApplySummary::default();
        for step in &plan.steps {
            match step {
                PlannedStep::Create { task_id, fields } => {
                    tasks.entities.insert(
                        task_id.clone(),
                        new_task(task_id, fields, &plan.project_id, now_ms),
                    );
                    tasks.push_id(task_id);
                    summary.created += 1;
                }
                PlannedStep::Update { task_id, fields } => {
                    apply_update(tasks.entity_mut(task_id, "task")?, fields);
                    summary.updated += 1;
                }
                PlannedStep::Delete { removed, .. } => {
                    let removed: HashSet<&str> = removed.iter().map(String::as_str).collect();
                    tasks.entities.retain(|id, _| !removed.contains(id.as_str()));
                    tasks.ids.retain(|id| !removed.contains(id.as_str()));
                    summary.deleted += removed.len();
                }
                PlannedStep::Reorder { .. } => {}
            }
        }

        let removed = plan.removed_task_ids();
        sync_sub_task_ids(&mut tasks);
        for entity in projects.entities.values_mut() {
            drop_removed(entity, "taskIds", &removed);
        }
        sync_project_roots(&mut projects, &tasks, plan)?;
        if let Some(mut tags) = EntityState::take(&mut state, TAG_STATE, TAG_STATE)? {
            for entity in tags.entities.values_mut() {
                drop_removed(entity, "taskIds", &removed);
            }
            tags.put(&mut state, TAG_STATE);
        }

        tasks.put(&mut state, TASK_STATE);
        projects.put(&mut state, PROJECT_STATE);
        self.state = state;

        tracing::info!(
            project_id = %plan.project_id,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            "batch applied"
        );
        Ok(summary)
    }
}

fn new_task(id: &str, fields: &CreateFields, project_id: &str, now_ms: u64) -> Value {
    json!({
        "id": id,
        "title": fields.title,
        "projectId": project_id,
        "parentId": fields.parent_id,
        "subTaskIds": [],
        "tagIds": [],
        "dueDay": null,
        "notes": fields.notes.clone().unwrap_or_default(),
        "isDone": fields.is_done.unwrap_or(false),
        "timeEstimate": fields.time_estimate.unwrap_or(0),
        "created": now_ms,
    })
}

fn apply_update(entity: &mut Map<String, Value>, fields: &UpdateFields) {
    if let Some(title) = &fields.title {
        entity.insert("title".to_string(), json!(title));
    }
    if let Some(notes) = &fields.notes {
        entity.insert("notes".to_string(), json!(notes));
    }
    if let Some(is_done) = fields.is_done {
        entity.insert("isDone".to_string(), json!(is_done));
    }
    if let Some(time_estimate) = fields.time_estimate {
        entity.insert("timeEstimate".to_string(), json!(time_estimate));
    }
    match &fields.parent {
        Some(ParentChange::Root) => {
            entity.insert("parentId".to_string(), Value::Null);
        }
        Some(ParentChange::Under(parent)) => {
            entity.insert("parentId".to_string(), json!(parent));
        }
        None => {}
    }
    if let Some(order) = &fields.sub_task_ids {
        set_string_list(entity, "subTaskIds", order.clone());
    }
}

fn drop_removed(entity: &mut Value, key: &str, removed: &BTreeSet<&str>) {
    if removed.is_empty() {
        return;
    }
    let Some(obj) = entity.as_object_mut() else {
        return;
    };
    if !obj.contains_key(key) {
        return;
    }
    let kept = string_list(obj, key)
        .into_iter()
        .filter(|id| !removed.contains(id.as_str()))
        .collect();
    set_string_list(obj, key, kept);
}

/// Every parent's `subTaskIds` becomes exactly its live children: listed order first, new
/// children appended in task order.
fn sync_sub_task_ids(tasks: &mut EntityState) {
    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    for id in tasks.ordered_ids() {
        let Some(parent) = tasks
            .entities
            .get(&id)
            .and_then(|entity| str_field(entity, "parentId"))
        else {
            continue;
        };
        if tasks.entities.contains_key(parent) {
            children.entry(parent.to_string()).or_default().push(id);
        }
    }

    for (id, entity) in tasks.entities.iter_mut() {
        let Some(obj) = entity.as_object_mut() else {
            continue;
        };
        let live = children.remove(id).unwrap_or_default();
        let next = merge_order(string_list(obj, "subTaskIds"), &live);
        set_string_list(obj, "subTaskIds", next);
    }
}

fn sync_project_roots(
    projects: &mut EntityState,
    tasks: &EntityState,
    plan: &AppliedPlan,
) -> Result<(), SnapshotError> {
    let roots: Vec<String> = tasks
        .ordered_ids()
        .into_iter()
        .filter(|id| {
            tasks.entities.get(id).is_some_and(|entity| {
                str_field(entity, "projectId") == Some(plan.project_id.as_str())
                    && str_field(entity, "parentId").is_none()
            })
        })
        .collect();

    let project = projects.entity_mut(&plan.project_id, "project")?;
    let mut next = merge_order(string_list(project, "taskIds"), &roots);
    if let Some(order) = plan.root_order() {
        next = merge_order(order.to_vec(), &next);
    }
    set_string_list(project, "taskIds", next);
    Ok(())
}

/// Members of `members` ordered by `preferred` first, the rest in their own order.
fn merge_order(preferred: Vec<String>, members: &[String]) -> Vec<String> {
    let member_set: HashSet<&str> = members.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(members.len());
    for id in preferred {
        if member_set.contains(id.as_str()) && seen.insert(id.clone()) {
            out.push(id);
        }
    }
    for id in members {
        if seen.insert(id.clone()) {
            out.push(id.clone());
        }
    }
    out
}
