use super::*;
use crate::time::ts_ms_to_rfc3339;
use pf_core::clock::ClockTriple;

#[test]
fn guard_refuses_a_second_attempt() {
    let running = SyncState::Idle.begin(10).unwrap();
    assert_eq!(running, SyncState::InProgress { started_at_ms: 10 });
    let err = running.begin(11).unwrap_err();
    assert_eq!(err.code(), "SYNC_IN_PROGRESS");
    assert!(matches!(
        err,
        crate::StoreError::SyncAlreadyInProgress { started_at_ms: 10 }
    ));
    assert!(running.finish().is_idle());
}

#[test]
fn dismissed_prompt_means_cancel() {
    let view = ConflictView::new(ClockTriple::new(2_000, 3_000, 1_000));
    let mut dismissed = |_: &ConflictView| -> Option<ConflictResolution> { None };
    assert_eq!(
        present_conflict(&mut dismissed, &view),
        ConflictResolution::Cancel
    );

    let mut seen = None;
    let mut choose_remote = |view: &ConflictView| {
        seen = Some(view.clone());
        Some(ConflictResolution::UseRemote)
    };
    assert_eq!(
        present_conflict(&mut choose_remote, &view),
        ConflictResolution::UseRemote
    );
    assert_eq!(seen, Some(view));
}

#[test]
fn conflict_view_keeps_raw_values_and_renders_them() {
    let view = ConflictView::new(ClockTriple::new(1_700_000_000_000, 5, 0));
    assert_eq!(view.local, 1_700_000_000_000);
    assert_eq!(view.remote, 5);
    assert_eq!(view.last_sync, 0);
    assert_eq!(view.local_at, ts_ms_to_rfc3339(1_700_000_000_000));
    assert_eq!(view.last_sync_at, "1970-01-01T00:00:00Z");

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["lastSync"], 0);
    assert!(json["remoteAt"].as_str().unwrap().starts_with("1970-01-01T00:00:00"));
}

#[test]
fn resolution_names_round_trip() {
    for resolution in [
        ConflictResolution::UseLocal,
        ConflictResolution::UseRemote,
        ConflictResolution::Cancel,
    ] {
        assert_eq!(ConflictResolution::parse(resolution.as_str()), Some(resolution));
    }
    assert_eq!(ConflictResolution::parse("both"), None);
}

#[test]
fn remote_meta_uses_camel_case() {
    let meta = RemoteMeta {
        last_update_ms: 1200,
        model_version: 3.0,
    };
    let json = serde_json::to_value(meta).unwrap();
    assert_eq!(json, serde_json::json!({"lastUpdateMs": 1200, "modelVersion": 3.0}));
}
