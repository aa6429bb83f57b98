#![forbid(unsafe_code)]

use serde_json::{Value, json};

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn batch_operation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": { "type": "string", "enum": ["create", "update", "delete", "reorder"] },
            "tempId": { "type": "string" },
            "taskId": { "type": "string" },
            "taskIds": { "type": "array", "items": { "type": "string" } },
            "data": {
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "notes": { "type": "string" },
                    "isDone": { "type": "boolean" },
                    "timeEstimate": { "type": "integer", "minimum": 0 },
                    "parentId": { "type": "string" }
                },
                "required": ["title"]
            },
            "updates": {
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "notes": { "type": "string" },
                    "isDone": { "type": "boolean" },
                    "timeEstimate": { "type": "integer", "minimum": 0 },
                    "parentId": { "type": ["string", "null"] },
                    "subTaskIds": { "type": "array", "items": { "type": "string" } }
                }
            }
        },
        "required": ["type"]
    })
}

pub(crate) fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "sync_status",
            "description": "Compare the local and remote clocks without moving any data.",
            "inputSchema": empty_schema(),
        }),
        json!({
            "name": "sync_run",
            "description": "Run one sync. A divergence without a resolution returns the conflict for the user to decide.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "resolution": { "type": "string", "enum": ["local", "remote", "cancel"] }
                }
            },
        }),
        json!({
            "name": "sync_log",
            "description": "Recent sync attempts, newest first.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "minimum": 1, "maximum": 200 }
                }
            },
        }),
        json!({
            "name": "batch_update",
            "description": "Validate and apply create/update/delete/reorder operations for one project, all or nothing.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "projectId": { "type": "string" },
                    "operations": { "type": "array", "items": batch_operation_schema() }
                },
                "required": ["projectId", "operations"]
            },
        }),
        json!({
            "name": "snapshot_export",
            "description": "The local snapshot as sealed envelope text.",
            "inputSchema": empty_schema(),
        }),
        json!({
            "name": "snapshot_import",
            "description": "Replace the local snapshot with sealed envelope text, migrating it first.",
            "inputSchema": {
                "type": "object",
                "properties": { "data": { "type": "string" } },
                "required": ["data"]
            },
        }),
    ]
}
