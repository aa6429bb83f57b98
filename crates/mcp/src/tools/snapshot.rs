#![forbid(unsafe_code)]

use crate::{McpServer, ai_ok, args_object, require_string};
use pf_storage::time::now_ms;
use serde_json::{Value, json};

pub(crate) fn handle_export(server: &mut McpServer, _args: Value) -> Value {
    match server.engine.export_sealed(&mut server.store, now_ms()) {
        Ok(sealed) => {
            let flags = server.engine.codecs().flags();
            ai_ok(
                "snapshot_export",
                json!({
                    "data": sealed,
                    "compressed": flags.compressed,
                    "encrypted": flags.encrypted,
                }),
            )
        }
        Err(err) => crate::store_error(err),
    }
}

pub(crate) fn handle_import(server: &mut McpServer, args: Value) -> Value {
    let data = match args_object(&args).and_then(|args| require_string(args, "data")) {
        Ok(data) => data,
        Err(resp) => return resp,
    };
    match server
        .engine
        .import_sealed(&mut server.store, &data, now_ms())
    {
        Ok(commit) => ai_ok(
            "snapshot_import",
            json!({
                "modelVersion": commit.model_version,
                "migratedFrom": commit.migrated_from,
                "local": commit.clock.local_ms,
            }),
        ),
        Err(err) => crate::store_error(err),
    }
}
