#![forbid(unsafe_code)]

use crate::McpServer;
use serde_json::Value;

use super::{batch, snapshot, sync};

pub(crate) fn dispatch_tool(server: &mut McpServer, name: &str, args: Value) -> Option<Value> {
    let resp = match name {
        "sync_status" => sync::handle_status(server, args),
        "sync_run" => sync::handle_run(server, args),
        "sync_log" => sync::handle_log(server, args),
        "batch_update" => batch::handle(server, args),
        "snapshot_export" => snapshot::handle_export(server, args),
        "snapshot_import" => snapshot::handle_import(server, args),
        _ => return None,
    };
    Some(resp)
}
