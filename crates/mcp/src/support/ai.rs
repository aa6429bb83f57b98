#![forbid(unsafe_code)]

use pf_storage::StoreError;
use serde_json::{Value, json};

pub(crate) fn ai_ok(intent: &str, result: Value) -> Value {
    json!({
        "success": true,
        "intent": intent,
        "result": result,
        "error": null
    })
}

pub(crate) fn ai_error(code: &str, message: &str) -> Value {
    ai_error_with(code, message, None)
}

pub(crate) fn ai_error_with(code: &str, message: &str, recovery: Option<&str>) -> Value {
    let mut error_obj = serde_json::Map::new();
    error_obj.insert("code".to_string(), Value::String(code.to_string()));
    error_obj.insert(
        "message".to_string(),
        Value::String(message.trim().to_string()),
    );
    if let Some(recovery) = recovery {
        error_obj.insert(
            "recovery".to_string(),
            Value::String(recovery.trim().to_string()),
        );
    }

    json!({
        "success": false,
        "intent": "error",
        "result": {},
        "error": Value::Object(error_obj)
    })
}

fn recovery_hint(err: &StoreError) -> Option<&'static str> {
    match err.code() {
        "SYNC_IN_PROGRESS" => Some("A sync is already running; retry once it finishes."),
        "DECRYPT_FAILED" => Some("Check that PF_SYNC_ENCRYPT_KEY matches the other devices."),
        "DECOMPRESS_FAILED" | "INVALID_ENVELOPE" | "DESERIALIZE_FAILED" => {
            Some("The stored or remote snapshot is unreadable; re-export it from a healthy device.")
        }
        "MIGRATION_FAILED" => {
            Some("Update this client; the snapshot was left untouched and the sync can be retried.")
        }
        "PRECONDITION" | "INCONCLUSIVE" => {
            Some("The local sync clock is inconsistent; sync is halted until it is repaired.")
        }
        "RESET_REQUIRED" => Some("Move the storage directory aside and start a fresh store."),
        _ => None,
    }
}

/// Renders a store failure as a tool payload. Fatal clock failures are also logged as errors.
pub(crate) fn store_error(err: StoreError) -> Value {
    if err.is_fatal() {
        tracing::error!(code = err.code(), error = %err, "fatal store error");
    }
    ai_error_with(err.code(), &err.to_string(), recovery_hint(&err))
}
