#![forbid(unsafe_code)]

use crate::{
    McpServer, ai_error, ai_error_with, ai_ok, args_object, optional_string, optional_usize,
};
use pf_storage::sync::{
    ConflictPrompt, ConflictResolution, ConflictView, LocalDirRemote, SyncOutcome,
};
use pf_storage::time::{now_ms, ts_ms_to_rfc3339};
use serde_json::{Value, json};

const DEFAULT_LOG_LIMIT: usize = 20;
const MAX_LOG_LIMIT: usize = 200;

/// Answers a divergence with whatever the caller passed up front.
struct PresetResolution(Option<ConflictResolution>);

impl ConflictPrompt for PresetResolution {
    fn present(&mut self, _view: &ConflictView) -> Option<ConflictResolution> {
        self.0
    }
}

fn configured_remote(remote: Option<&LocalDirRemote>) -> Result<&LocalDirRemote, Value> {
    remote.ok_or_else(|| {
        ai_error_with(
            "INVALID_INPUT",
            "no remote directory is configured",
            Some("Pass --remote-dir DIR, set PF_SYNC_REMOTE_DIR, or add remote_dir to pf_sync.yaml."),
        )
    })
}

pub(crate) fn handle_status(server: &mut McpServer, _args: Value) -> Value {
    let remote = match configured_remote(server.remote.as_ref()) {
        Ok(remote) => remote,
        Err(resp) => return resp,
    };
    match server.engine.status(&server.store, remote) {
        Ok(status) => ai_ok(
            "sync_status",
            json!({
                "local": status.local_ms,
                "remote": status.remote_ms,
                "lastSync": status.last_sync_ms,
                "remoteModelVersion": status.remote_model_version,
                "disposition": status.disposition.as_str(),
            }),
        ),
        Err(err) => crate::store_error(err),
    }
}

pub(crate) fn handle_run(server: &mut McpServer, args: Value) -> Value {
    let resolution = match parse_resolution(&args) {
        Ok(resolution) => resolution,
        Err(resp) => return resp,
    };
    let remote = match configured_remote(server.remote.as_ref()) {
        Ok(remote) => remote,
        Err(resp) => return resp,
    };
    let mut prompt = PresetResolution(resolution);
    match server
        .engine
        .run(&mut server.store, remote, &mut prompt, now_ms())
    {
        Ok(outcome) => ai_ok("sync_run", outcome_json(&outcome)),
        Err(err) => crate::store_error(err),
    }
}

fn parse_resolution(args: &Value) -> Result<Option<ConflictResolution>, Value> {
    let args = args_object(args)?;
    let Some(raw) = optional_string(args, "resolution")? else {
        return Ok(None);
    };
    ConflictResolution::parse(&raw).map(Some).ok_or_else(|| {
        ai_error(
            "INVALID_INPUT",
            "resolution must be one of: local|remote|cancel",
        )
    })
}

pub(crate) fn outcome_json(outcome: &SyncOutcome) -> Value {
    let mut out = match outcome {
        SyncOutcome::InSync => json!({}),
        SyncOutcome::Pushed { local_ms } => json!({ "local": local_ms }),
        SyncOutcome::Pulled {
            remote_ms,
            migrated_from,
        } => json!({ "remote": remote_ms, "migratedFrom": migrated_from }),
        SyncOutcome::BookkeepingRepaired { last_sync_ms } => json!({ "lastSync": last_sync_ms }),
        SyncOutcome::Cancelled { conflict } => json!({ "conflict": conflict }),
        SyncOutcome::RemoteNotUpToDate {
            local_ms,
            remote_ms,
        } => json!({
            "local": local_ms,
            "remote": remote_ms,
            "warning": "the remote never recorded the last push; check the remote directory before syncing again",
        }),
    };
    if let Some(obj) = out.as_object_mut() {
        obj.insert("outcome".to_string(), Value::String(outcome.as_str().to_string()));
    }
    out
}

pub(crate) fn handle_log(server: &mut McpServer, args: Value) -> Value {
    let limit = match args_object(&args).and_then(|args| optional_usize(args, "limit")) {
        Ok(limit) => limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT),
        Err(resp) => return resp,
    };
    match server.store.sync_log(limit) {
        Ok(entries) => {
            let entries = entries
                .into_iter()
                .map(|entry| {
                    json!({
                        "seq": entry.seq,
                        "ts": entry.ts_ms,
                        "at": ts_ms_to_rfc3339(entry.ts_ms),
                        "disposition": entry.disposition,
                        "detail": entry.detail,
                    })
                })
                .collect::<Vec<_>>();
            ai_ok("sync_log", json!({ "entries": entries }))
        }
        Err(err) => crate::store_error(err),
    }
}
