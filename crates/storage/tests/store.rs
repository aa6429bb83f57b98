#![forbid(unsafe_code)]

use pf_storage::pipeline::{Codecs, Opened};
use pf_storage::snapshot::AppSnapshot;
use pf_storage::{SqliteStore, StoreError};
use rusqlite::Connection;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_storage_dir(label: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be monotonic enough for tests")
        .as_nanos();
    path.push(format!("pf-storage-{label}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&path).expect("temp storage dir must be creatable");
    path
}

#[test]
fn open_is_fail_closed_on_foreign_schema() {
    let dir = temp_storage_dir("reset-required");
    let conn = Connection::open(dir.join("pf_sync.db")).expect("db must open");
    conn.execute("CREATE TABLE legacy_tasks(id TEXT PRIMARY KEY)", [])
        .expect("legacy table should be created");
    drop(conn);

    let err = SqliteStore::open(&dir).expect_err("foreign storage must be rejected");
    assert_eq!(err.code(), "RESET_REQUIRED");
    assert!(matches!(
        err,
        StoreError::InvalidInput(message) if message.starts_with("RESET_REQUIRED")
    ));
}

#[test]
fn reopening_keeps_state_and_schema_is_idempotent() {
    let dir = temp_storage_dir("reopen");
    {
        let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
        let clock = store.clock().expect("clock row exists");
        assert_eq!((clock.local_ms, clock.last_sync_ms), (0, 0));
        assert_eq!(clock.model_version, 3.0);
        store.record_local_write(500).expect("write recorded");
    }
    let store = SqliteStore::open(&dir).expect("existing storage should reopen");
    assert_eq!(store.clock().expect("clock").local_ms, 500);
    assert_eq!(store.storage_dir(), dir.as_path());
}

#[test]
fn local_clock_only_moves_forward_on_writes() {
    let dir = temp_storage_dir("clock");
    let mut store = SqliteStore::open(&dir).expect("storage should open");

    assert_eq!(store.record_local_write(1_000).expect("write").local_ms, 1_000);
    // a write stamped in the past still advances the clock
    assert_eq!(store.record_local_write(900).expect("write").local_ms, 1_001);
    assert_eq!(store.record_local_write(1_001).expect("write").local_ms, 1_002);

    let synced = store.record_synced(1_200).expect("synced");
    assert_eq!((synced.local_ms, synced.last_sync_ms), (1_200, 1_200));

    let lowered = store.set_local_clock(1_100).expect("clock set");
    assert_eq!((lowered.local_ms, lowered.last_sync_ms), (1_100, 1_200));
}

#[test]
fn sealed_snapshot_round_trips_with_digest_check() {
    let dir = temp_storage_dir("sealed");
    let mut store = SqliteStore::open(&dir).expect("storage should open");
    assert!(store.load_sealed().expect("empty load").is_none());

    let codecs = Codecs::plain().compressed(true);
    let snapshot = AppSnapshot::from_value(2.5, json!({"task": {"ids": [], "entities": {}}}))
        .expect("object snapshot");
    let sealed = codecs
        .seal(snapshot.state(), snapshot.model_version)
        .expect("seal");
    let digest = store.save_sealed(&sealed, 77).expect("save");
    assert_eq!(digest.len(), 64);

    let stored = store.load_sealed().expect("load").expect("stored");
    assert_eq!(stored.sealed, sealed);
    assert_eq!(stored.digest, digest);
    assert_eq!(stored.model_version, 2.5);
    assert_eq!(stored.updated_at_ms, 77);
    assert_eq!(store.clock().expect("clock").model_version, 2.5);

    let opened: Opened<Value> = Codecs::plain().open(&stored.sealed).expect("open");
    let loaded = AppSnapshot::from_value(opened.model_version, opened.data).expect("object");
    assert_eq!(loaded, snapshot);
}

#[test]
fn save_rejects_text_without_an_envelope() {
    let dir = temp_storage_dir("no-envelope");
    let mut store = SqliteStore::open(&dir).expect("storage should open");
    let err = store.save_sealed("{\"task\":{}}", 1).expect_err("must be rejected");
    assert_eq!(err.code(), "INVALID_ENVELOPE");
}

#[test]
fn tampered_snapshot_is_detected() {
    let dir = temp_storage_dir("tamper");
    let mut store = SqliteStore::open(&dir).expect("storage should open");
    store.save_sealed("pf_3__{}", 1).expect("save");

    let conn = Connection::open(dir.join("pf_sync.db")).expect("db must open");
    conn.execute("UPDATE snapshots SET sealed='pf_3__{\"x\":1}'", [])
        .expect("tamper");
    drop(conn);

    let err = store.load_sealed().expect_err("digest must not match");
    assert!(matches!(err, StoreError::DigestMismatch { .. }));
    assert_eq!(err.code(), "STORE_ERROR");
}

#[test]
fn commits_save_and_move_clocks_together() {
    let dir = temp_storage_dir("commits");
    let mut store = SqliteStore::open(&dir).expect("storage should open");

    let clock = store.commit_local_change("pf_3__{}", 1_000).expect("commit");
    assert_eq!((clock.local_ms, clock.last_sync_ms), (1_000, 0));

    let clock = store
        .commit_pulled("pf_3__{\"a\":1}", 1_500, 2_000)
        .expect("pull commit");
    assert_eq!((clock.local_ms, clock.last_sync_ms), (1_500, 1_500));
    assert_eq!(
        store.load_sealed().expect("load").expect("stored").sealed,
        "pf_3__{\"a\":1}"
    );

    // a rejected save rolls the clock change back too
    store
        .commit_local_change("not sealed", 3_000)
        .expect_err("invalid envelope");
    assert_eq!(store.clock().expect("clock").local_ms, 1_500);
}

#[test]
fn sync_log_lists_newest_first() {
    let dir = temp_storage_dir("log");
    let store = SqliteStore::open(&dir).expect("storage should open");
    store.append_sync_log(10, "pushed", Some("local=10")).expect("append");
    store.append_sync_log(20, "in_sync", None).expect("append");
    store.append_sync_log(30, "error", Some("boom")).expect("append");

    let entries = store.sync_log(2).expect("log");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].disposition, "error");
    assert_eq!(entries[0].detail.as_deref(), Some("boom"));
    assert_eq!(entries[1].ts_ms, 20);
    assert_eq!(entries[1].detail, None);
    assert!(entries[0].seq > entries[1].seq);
}
