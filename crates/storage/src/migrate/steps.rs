#![forbid(unsafe_code)]

use super::{CURRENT_MODEL_VERSION, MigrationContext, MigrationStep};
use crate::snapshot::{
    ARCHIVE_OLD_STATE, ARCHIVE_YOUNG_STATE, AppSnapshot, EntityState, PLANNER_STATE,
    PROJECT_STATE, SnapshotError, TASK_STATE, set_string_list, str_field, string_list,
};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

pub const INBOX_PROJECT: &str = "INBOX_PROJECT";
pub const TODAY_TAG: &str = "TODAY";

pub(super) fn builtin() -> Vec<MigrationStep> {
    vec![
        MigrationStep {
            from_version: 1.0,
            to_version: 2.0,
            description: "derive task dueDay from planner day buckets",
            apply: planner_day_buckets,
        },
        MigrationStep {
            from_version: 2.0,
            to_version: CURRENT_MODEL_VERSION,
            description: "add the inbox project and drop the TODAY tag",
            apply: inbox_replaces_today_tag,
        },
    ]
}

/// A fresh snapshot at the current model version, inbox included.
pub fn initial_snapshot() -> AppSnapshot {
    let mut snapshot = AppSnapshot::new(CURRENT_MODEL_VERSION);
    let state = snapshot.state_mut();
    let mut projects = EntityState::default();
    ensure_inbox(&mut projects);
    projects.put(state, PROJECT_STATE);
    snapshot
}

fn planner_day_buckets(
    snapshot: &mut AppSnapshot,
    ctx: &MigrationContext,
) -> Result<(), SnapshotError> {
    let state = snapshot.state_mut();
    let mut planner = match state.remove(PLANNER_STATE) {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Object(planner)) => planner,
        Some(_) => return Err(SnapshotError::wrong_type(PLANNER_STATE, "object")),
    };
    let days = match planner.remove("days") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(days)) => days,
        Some(_) => return Err(SnapshotError::wrong_type("planner.days", "object")),
    };

    // Day keys sort chronologically, so the first bucket naming a task is its earliest day.
    let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (day, ids) in days {
        let ids = match ids {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(id) => Ok(id),
                    _ => Err(SnapshotError::wrong_type(
                        &format!("planner.days.{day}"),
                        "array of strings",
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                return Err(SnapshotError::wrong_type(
                    &format!("planner.days.{day}"),
                    "array of strings",
                ));
            }
        };
        buckets.insert(day, ids);
    }

    let mut tasks = EntityState::take(state, TASK_STATE, TASK_STATE)?;
    if let Some(tasks) = tasks.as_mut() {
        for (day, ids) in &buckets {
            for id in ids {
                let Some(task) = tasks.entities.get_mut(id).and_then(Value::as_object_mut) else {
                    continue;
                };
                let scheduled = task
                    .get("dueDay")
                    .and_then(Value::as_str)
                    .is_some_and(|due| !due.is_empty());
                if !scheduled {
                    task.insert("dueDay".to_string(), json!(day));
                }
            }
        }
    }

    let mut kept_days = Map::new();
    for (day, ids) in buckets {
        let kept: Vec<String> = ids
            .into_iter()
            .filter(|id| {
                let Some(task) = tasks.as_ref().and_then(|tasks| tasks.entities.get(id)) else {
                    return false;
                };
                day == ctx.today || str_field(task, "dueDay") == Some(day.as_str())
            })
            .collect();
        if !kept.is_empty() {
            kept_days.insert(day, json!(kept));
        }
    }

    if let Some(tasks) = tasks {
        tasks.put(state, TASK_STATE);
    }
    planner.insert("days".to_string(), Value::Object(kept_days));
    state.insert(PLANNER_STATE.to_string(), Value::Object(planner));
    Ok(())
}

fn inbox_replaces_today_tag(
    snapshot: &mut AppSnapshot,
    _ctx: &MigrationContext,
) -> Result<(), SnapshotError> {
    let state = snapshot.state_mut();
    let mut projects = EntityState::take(state, PROJECT_STATE, PROJECT_STATE)?.unwrap_or_default();
    ensure_inbox(&mut projects);

    if let Some(mut tasks) = EntityState::take(state, TASK_STATE, TASK_STATE)? {
        let moved = drop_today_tag(&mut tasks);
        let roots: Vec<String> = moved
            .into_iter()
            .filter(|id| {
                tasks
                    .entities
                    .get(id)
                    .is_some_and(|task| str_field(task, "parentId").is_none())
            })
            .collect();
        let inbox = projects.entity_mut(INBOX_PROJECT, "project")?;
        let mut listed = string_list(inbox, "taskIds");
        for id in roots {
            if !listed.contains(&id) {
                listed.push(id);
            }
        }
        set_string_list(inbox, "taskIds", listed);
        tasks.put(state, TASK_STATE);
    }
    projects.put(state, PROJECT_STATE);

    for archive in [ARCHIVE_YOUNG_STATE, ARCHIVE_OLD_STATE] {
        let holder = match state.get_mut(archive) {
            None | Some(Value::Null) => continue,
            Some(Value::Object(holder)) => holder,
            Some(_) => return Err(SnapshotError::wrong_type(archive, "object")),
        };
        let path = format!("{archive}.{TASK_STATE}");
        if let Some(mut tasks) = EntityState::take(holder, TASK_STATE, &path)? {
            drop_today_tag(&mut tasks);
            tasks.put(holder, TASK_STATE);
        }
    }
    Ok(())
}

fn ensure_inbox(projects: &mut EntityState) {
    if !projects.entities.contains_key(INBOX_PROJECT) {
        projects.entities.insert(
            INBOX_PROJECT.to_string(),
            json!({"id": INBOX_PROJECT, "title": "Inbox", "taskIds": []}),
        );
    }
    if !projects.ids.iter().any(|id| id == INBOX_PROJECT) {
        projects.ids.insert(0, INBOX_PROJECT.to_string());
    }
}

/// Removes the legacy tag from every task. A task that carried the tag and has no project is
/// assigned to the inbox; the ids of those tasks are returned.
fn drop_today_tag(tasks: &mut EntityState) -> Vec<String> {
    let mut moved = Vec::new();
    for id in tasks.ordered_ids() {
        let Some(task) = tasks.entities.get_mut(&id).and_then(Value::as_object_mut) else {
            continue;
        };
        let mut tags = string_list(task, "tagIds");
        let had_today = tags.iter().any(|tag| tag == TODAY_TAG);
        if had_today {
            tags.retain(|tag| tag != TODAY_TAG);
            set_string_list(task, "tagIds", tags.clone());
        }

        let has_project = task
            .get("projectId")
            .and_then(Value::as_str)
            .is_some_and(|project| !project.is_empty());
        if had_today && !has_project {
            task.insert("projectId".to_string(), json!(INBOX_PROJECT));
            moved.push(id);
        }
    }
    moved
}
