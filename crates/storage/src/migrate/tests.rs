use super::*;
use serde_json::{Value, json};

fn ctx() -> MigrationContext {
    MigrationContext::new("2024-03-10")
}

fn legacy_v1() -> AppSnapshot {
    AppSnapshot::from_value(
        1.0,
        json!({
            "task": {
                "ids": ["a", "b", "c", "d"],
                "entities": {
                    "a": {"id": "a", "title": "a", "projectId": "", "parentId": null, "tagIds": ["TODAY"]},
                    "b": {"id": "b", "title": "b", "projectId": "P1", "parentId": null, "tagIds": ["TODAY", "work"], "dueDay": "2024-03-12"},
                    "c": {"id": "c", "title": "c", "parentId": null, "tagIds": ["work"]},
                    "d": {"id": "d", "title": "d", "parentId": "a", "tagIds": []}
                }
            },
            "project": {
                "ids": ["P1"],
                "entities": {"P1": {"id": "P1", "title": "Work", "taskIds": ["b"]}}
            },
            "planner": {
                "days": {
                    "2024-03-10": ["b"],
                    "2024-03-11": ["a", "b", "ghost"],
                    "2024-03-12": ["c", "b"]
                }
            },
            "archiveYoung": {
                "task": {
                    "ids": ["z"],
                    "entities": {"z": {"id": "z", "title": "z", "projectId": "P1", "tagIds": ["TODAY"]}}
                }
            }
        }),
    )
    .unwrap()
}

fn failing_step(_: &mut AppSnapshot, _: &MigrationContext) -> Result<(), SnapshotError> {
    Err(SnapshotError::NotAnObject)
}

fn noop_step(_: &mut AppSnapshot, _: &MigrationContext) -> Result<(), SnapshotError> {
    Ok(())
}

fn step(from: f64, to: f64, apply: StepFn) -> MigrationStep {
    MigrationStep {
        from_version: from,
        to_version: to,
        description: "test step",
        apply,
    }
}

#[test]
fn builtin_registry_is_valid() {
    let registry = MigrationRegistry::new(steps::builtin()).unwrap();
    assert_eq!(registry.min_supported_version(), 1.0);
    assert_eq!(registry.latest_version(), CURRENT_MODEL_VERSION);
    assert_eq!(default_registry().steps().len(), 2);
    assert!(registry.needs_migration(2.0));
    assert!(!registry.needs_migration(3.0));
}

#[test]
fn registry_rejects_gaps_and_inverted_steps() {
    assert!(matches!(
        MigrationRegistry::new(Vec::new()),
        Err(MigrationError::InvalidRegistry(_))
    ));
    assert!(MigrationRegistry::new(vec![step(2.0, 1.0, noop_step)]).is_err());
    assert!(MigrationRegistry::new(vec![step(1.0, 2.0, noop_step), step(3.0, 4.0, noop_step)]).is_err());
    let mut unnamed = step(1.0, 2.0, noop_step);
    unnamed.description = " ";
    assert!(MigrationRegistry::new(vec![unnamed]).is_err());
}

#[test]
fn planner_buckets_backfill_and_prune() {
    let migrated = default_registry().migrate(legacy_v1(), &ctx()).unwrap();
    assert_eq!(migrated.model_version, 3.0);

    // earliest bucket wins, existing dueDay is kept
    assert_eq!(migrated.task("a").unwrap()["dueDay"], "2024-03-11");
    assert_eq!(migrated.task("b").unwrap()["dueDay"], "2024-03-12");
    assert_eq!(migrated.task("c").unwrap()["dueDay"], "2024-03-12");

    // today's bucket keeps b although b is due on the 12th; the 11th loses b and the ghost
    assert_eq!(
        migrated.state()["planner"]["days"],
        json!({
            "2024-03-10": ["b"],
            "2024-03-11": ["a"],
            "2024-03-12": ["c", "b"]
        })
    );
}

#[test]
fn today_tag_moves_unassigned_tasks_to_inbox() {
    let migrated = default_registry().migrate(legacy_v1(), &ctx()).unwrap();
    let state = Value::Object(migrated.state().clone());

    assert_eq!(state["project"]["ids"], json!(["INBOX_PROJECT", "P1"]));
    assert_eq!(
        state["project"]["entities"]["INBOX_PROJECT"]["taskIds"],
        json!(["a"])
    );
    assert_eq!(migrated.task("a").unwrap()["projectId"], INBOX_PROJECT);
    assert_eq!(migrated.task("a").unwrap()["tagIds"], json!([]));
    // b keeps its project, c keeps its other tag and stays unassigned
    assert_eq!(migrated.task("b").unwrap()["projectId"], "P1");
    assert_eq!(migrated.task("b").unwrap()["tagIds"], json!(["work"]));
    assert_eq!(migrated.task("c").unwrap().get("projectId"), None);
    // a projectless task that never carried the tag is left alone
    assert_eq!(migrated.task("d").unwrap().get("projectId"), None);
    assert_eq!(
        state["archiveYoung"]["task"]["entities"]["z"]["tagIds"],
        json!([])
    );
}

#[test]
fn migrating_twice_equals_migrating_once() {
    let registry = default_registry();
    let once = registry.migrate(legacy_v1(), &ctx()).unwrap();
    let twice = registry.migrate(once.clone(), &ctx()).unwrap();
    assert_eq!(once, twice);

    // the steps themselves are idempotent, not just skipped by version
    let mut rerun = once.clone();
    for step in registry.steps() {
        (step.apply)(&mut rerun, &ctx()).unwrap();
    }
    assert_eq!(rerun, once);
}

#[test]
fn partial_chain_starts_at_the_snapshot_version() {
    let mut v2 = legacy_v1();
    v2.model_version = 2.0;
    let migrated = default_registry().migrate(v2, &ctx()).unwrap();
    // the planner step did not run
    assert_eq!(migrated.task("a").unwrap().get("dueDay"), None);
    assert_eq!(migrated.model_version, 3.0);
}

#[test]
fn fractional_version_still_runs_the_step_it_sits_inside() {
    let mut between = legacy_v1();
    between.model_version = 1.5;
    let migrated = default_registry().migrate(between, &ctx()).unwrap();
    // 1.5 has not reached the 2.0 shape yet, so the planner step runs
    assert_eq!(migrated.task("a").unwrap()["dueDay"], "2024-03-11");
    assert_eq!(migrated.model_version, 3.0);

    let registry =
        MigrationRegistry::new(vec![step(1.0, 2.0, failing_step), step(2.0, 3.0, noop_step)])
            .unwrap();
    let mut between = legacy_v1();
    between.model_version = 1.5;
    assert!(matches!(
        registry.migrate(between, &ctx()),
        Err(MigrationError::StepFailed { index: 0, .. })
    ));
}

#[test]
fn versions_outside_the_chain_are_rejected() {
    let registry = default_registry();
    let mut old = legacy_v1();
    old.model_version = 0.5;
    assert_eq!(
        registry.migrate(old, &ctx()).unwrap_err(),
        MigrationError::BelowMinimum {
            version: 0.5,
            minimum: 1.0
        }
    );

    let mut newer = legacy_v1();
    newer.model_version = 4.0;
    assert!(matches!(
        registry.migrate(newer.clone(), &ctx()),
        Err(MigrationError::AheadOfLatest { .. })
    ));
    assert!(matches!(
        registry.bring_current(newer, &ctx()),
        Err(MigrationError::AheadOfLatest { .. })
    ));
}

#[test]
fn bring_current_passes_minor_ahead_through() {
    let registry = default_registry();
    let mut minor = initial_snapshot();
    minor.model_version = 3.4;
    let (same, migrated_from) = registry.bring_current(minor.clone(), &ctx()).unwrap();
    assert_eq!(same, minor);
    assert_eq!(migrated_from, None);

    let (current, migrated_from) = registry.bring_current(legacy_v1(), &ctx()).unwrap();
    assert_eq!(current.model_version, 3.0);
    assert_eq!(migrated_from, Some(1.0));
}

#[test]
fn failing_step_reports_index_and_versions() {
    let registry =
        MigrationRegistry::new(vec![step(1.0, 2.0, noop_step), step(2.0, 3.0, failing_step)])
            .unwrap();
    let original = legacy_v1();
    let err = registry.migrate(original.clone(), &ctx()).unwrap_err();
    assert_eq!(
        err,
        MigrationError::StepFailed {
            index: 1,
            from_version: 2.0,
            to_version: 3.0,
            message: "snapshot must be a JSON object".to_string(),
        }
    );
    assert_eq!(err.code(), "MIGRATION_FAILED");
    assert_eq!(original.model_version, 1.0);
}

#[test]
fn wrong_typed_planner_fails_the_step() {
    let snapshot = AppSnapshot::from_value(1.0, json!({"planner": {"days": []}})).unwrap();
    let err = default_registry().migrate(snapshot, &ctx()).unwrap_err();
    assert!(matches!(err, MigrationError::StepFailed { index: 0, .. }));
}

#[test]
fn initial_snapshot_carries_the_inbox() {
    let snapshot = initial_snapshot();
    assert_eq!(snapshot.model_version, CURRENT_MODEL_VERSION);
    assert!(snapshot.project(INBOX_PROJECT).is_some());
    assert!(!default_registry().needs_migration(snapshot.model_version));
}
