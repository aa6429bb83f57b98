use super::*;
use pf_core::batch::{
    BatchOperation, BatchPolicy, CreateFields, ParentChange, UpdateFields, validate,
};
use serde_json::json;
use std::collections::BTreeMap;

fn fixture() -> AppSnapshot {
    AppSnapshot::from_value(
        3.0,
        json!({
            "task": {
                "ids": ["A", "A1", "B"],
                "entities": {
                    "A": {"id": "A", "title": "A", "projectId": "P1", "parentId": null, "subTaskIds": ["A1"], "tagIds": ["T"]},
                    "A1": {"id": "A1", "title": "A1", "projectId": "P1", "parentId": "A", "subTaskIds": [], "tagIds": []},
                    "B": {"id": "B", "title": "B", "projectId": "P1", "parentId": null, "subTaskIds": [], "tagIds": ["T"]}
                }
            },
            "project": {
                "ids": ["P1"],
                "entities": {"P1": {"id": "P1", "title": "Work", "taskIds": ["A", "B"]}}
            },
            "tag": {
                "ids": ["T"],
                "entities": {"T": {"id": "T", "title": "tag", "taskIds": ["A", "B"]}}
            },
            "globalConfig": {"theme": "dark"}
        }),
    )
    .unwrap()
}

fn apply(snapshot: &mut AppSnapshot, ops: Vec<BatchOperation>) -> BTreeMap<String, String> {
    let hierarchy = snapshot.task_hierarchy().unwrap();
    let mut next = 0;
    let mut ids = || {
        next += 1;
        format!("n{next}")
    };
    let plan = validate("P1", &ops, &hierarchy, &BatchPolicy::default(), &mut ids).unwrap();
    snapshot.apply_plan(&plan, 42).unwrap();
    plan.created_task_ids
}

fn ids_at(snapshot: &AppSnapshot, pointer: &str) -> Vec<String> {
    snapshot
        .clone()
        .into_value()
        .pointer(pointer)
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

#[test]
fn hierarchy_projects_tasks_and_projects() {
    let hierarchy = fixture().task_hierarchy().unwrap();
    assert!(hierarchy.contains_project("P1"));
    assert_eq!(hierarchy.nodes().count(), 3);
    let a1 = hierarchy.get("A1").unwrap();
    assert_eq!(a1.parent_id.as_deref(), Some("A"));
    assert_eq!(a1.project_id.as_deref(), Some("P1"));
    assert_eq!(hierarchy.get("A").unwrap().parent_id, None);
}

#[test]
fn wrong_typed_sub_state_is_reported() {
    let snapshot = AppSnapshot::from_value(3.0, json!({"task": {"ids": "nope"}})).unwrap();
    assert_eq!(
        snapshot.task_hierarchy().unwrap_err(),
        SnapshotError::WrongType {
            path: "task.ids".to_string(),
            expected: "array of strings"
        }
    );
    assert_eq!(
        AppSnapshot::from_value(3.0, json!([1, 2])).unwrap_err(),
        SnapshotError::NotAnObject
    );
}

#[test]
fn created_subtask_is_linked_into_parent() {
    let mut snapshot = fixture();
    let created = apply(
        &mut snapshot,
        vec![BatchOperation::Create {
            temp_id: "t1".to_string(),
            fields: CreateFields {
                title: "new child".to_string(),
                parent_id: Some("B".to_string()),
                time_estimate: Some(600),
                ..CreateFields::default()
            },
        }],
    );
    let id = created.get("t1").unwrap();

    let task = snapshot.task(id).unwrap();
    assert_eq!(task["title"], "new child");
    assert_eq!(task["parentId"], "B");
    assert_eq!(task["projectId"], "P1");
    assert_eq!(task["timeEstimate"], 600);
    assert_eq!(task["created"], 42);
    assert_eq!(ids_at(&snapshot, "/task/entities/B/subTaskIds"), vec![id.clone()]);
    assert_eq!(ids_at(&snapshot, "/project/entities/P1/taskIds"), vec!["A", "B"]);
    assert_eq!(snapshot.state()["globalConfig"], json!({"theme": "dark"}));
}

#[test]
fn delete_removes_subtree_everywhere() {
    let mut snapshot = fixture();
    apply(
        &mut snapshot,
        vec![BatchOperation::Delete {
            task_id: "A".to_string(),
        }],
    );
    assert!(snapshot.task("A").is_none());
    assert!(snapshot.task("A1").is_none());
    assert_eq!(ids_at(&snapshot, "/task/ids"), vec!["B"]);
    assert_eq!(ids_at(&snapshot, "/project/entities/P1/taskIds"), vec!["B"]);
    assert_eq!(ids_at(&snapshot, "/tag/entities/T/taskIds"), vec!["B"]);
}

#[test]
fn moves_and_reorder_rebuild_root_list() {
    let mut snapshot = fixture();
    let created = apply(
        &mut snapshot,
        vec![
            BatchOperation::Create {
                temp_id: "t1".to_string(),
                fields: CreateFields {
                    title: "first".to_string(),
                    ..CreateFields::default()
                },
            },
            BatchOperation::Update {
                task_id: "A1".to_string(),
                fields: UpdateFields {
                    parent: Some(ParentChange::Root),
                    ..UpdateFields::default()
                },
            },
            BatchOperation::Reorder {
                task_ids: vec!["t1".to_string(), "B".to_string()],
            },
        ],
    );
    let t1 = created.get("t1").cloned().unwrap();

    assert_eq!(
        ids_at(&snapshot, "/project/entities/P1/taskIds"),
        vec![t1, "B".to_string(), "A".to_string(), "A1".to_string()]
    );
    assert!(ids_at(&snapshot, "/task/entities/A/subTaskIds").is_empty());
    assert_eq!(snapshot.task("A1").unwrap()["parentId"], Value::Null);
}

#[test]
fn missing_project_leaves_snapshot_untouched() {
    let mut snapshot = fixture();
    let before = snapshot.clone();
    let plan = pf_core::batch::AppliedPlan {
        project_id: "ghost".to_string(),
        steps: Vec::new(),
        created_task_ids: BTreeMap::new(),
    };
    let err = snapshot.apply_plan(&plan, 1).unwrap_err();
    assert!(matches!(err, SnapshotError::MissingEntity { kind: "project", .. }));
    assert_eq!(snapshot, before);
}
