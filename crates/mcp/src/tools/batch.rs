#![forbid(unsafe_code)]

use crate::{McpServer, ai_error, args_object, require_string};
use pf_core::batch::{
    BatchError, BatchErrorKind, BatchOperation, CreateFields, ParentChange, UpdateFields,
};
use pf_storage::time::now_ms;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};

/// One operation as plugins send it.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireOperation {
    Create {
        #[serde(rename = "tempId")]
        temp_id: String,
        data: WireCreate,
    },
    Update {
        #[serde(rename = "taskId")]
        task_id: String,
        updates: WireUpdate,
    },
    Delete {
        #[serde(rename = "taskId")]
        task_id: String,
    },
    Reorder {
        #[serde(rename = "taskIds")]
        task_ids: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WireCreate {
    title: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    is_done: Option<bool>,
    #[serde(default)]
    time_estimate: Option<u64>,
    #[serde(default)]
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WireUpdate {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    is_done: Option<bool>,
    #[serde(default)]
    time_estimate: Option<u64>,
    /// Absent leaves the parent alone; `null` moves the task to the project root.
    #[serde(default, deserialize_with = "present_or_null")]
    parent_id: Option<Option<String>>,
    #[serde(default)]
    sub_task_ids: Option<Vec<String>>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl From<WireOperation> for BatchOperation {
    fn from(op: WireOperation) -> Self {
        match op {
            WireOperation::Create { temp_id, data } => Self::Create {
                temp_id,
                fields: CreateFields {
                    title: data.title,
                    notes: data.notes,
                    is_done: data.is_done,
                    time_estimate: data.time_estimate,
                    parent_id: data.parent_id,
                },
            },
            WireOperation::Update { task_id, updates } => Self::Update {
                task_id,
                fields: UpdateFields {
                    title: updates.title,
                    notes: updates.notes,
                    is_done: updates.is_done,
                    time_estimate: updates.time_estimate,
                    parent: updates.parent_id.map(|parent| match parent {
                        Some(id) => ParentChange::Under(id),
                        None => ParentChange::Root,
                    }),
                    sub_task_ids: updates.sub_task_ids,
                },
            },
            WireOperation::Delete { task_id } => Self::Delete { task_id },
            WireOperation::Reorder { task_ids } => Self::Reorder { task_ids },
        }
    }
}

/// Decodes every operation, collecting one error per malformed entry.
pub(crate) fn parse_operations(raw: &[Value]) -> Result<Vec<BatchOperation>, Vec<BatchError>> {
    let mut operations = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();
    for (index, value) in raw.iter().enumerate() {
        match WireOperation::deserialize(value) {
            Ok(op) => operations.push(op.into()),
            Err(err) => errors.push(BatchError::at(
                index,
                BatchErrorKind::ValidationError,
                format!("malformed operation: {err}"),
            )),
        }
    }
    if errors.is_empty() {
        Ok(operations)
    } else {
        Err(errors)
    }
}

pub(crate) fn rejected(errors: &[BatchError]) -> Value {
    let errors = errors
        .iter()
        .map(|err| {
            json!({
                "operationIndex": err.operation_index,
                "type": err.kind.as_str(),
                "message": err.message,
            })
        })
        .collect::<Vec<_>>();
    json!({
        "success": false,
        "createdTaskIds": {},
        "errors": errors,
    })
}

pub(crate) fn handle(server: &mut McpServer, args: Value) -> Value {
    let (project_id, raw_operations) = match parse_request(&args) {
        Ok(parsed) => parsed,
        Err(resp) => return resp,
    };
    let operations = match parse_operations(raw_operations) {
        Ok(operations) => operations,
        Err(errors) => return rejected(&errors),
    };

    let mut mint_id = || uuid::Uuid::new_v4().to_string();
    let committed = server.engine.apply_batch(
        &mut server.store,
        &project_id,
        &operations,
        &server.policy,
        &mut mint_id,
        now_ms(),
    );
    match committed {
        Ok(Ok(commit)) => {
            let created = commit
                .plan
                .created_task_ids
                .iter()
                .map(|(temp_id, id)| (temp_id.clone(), Value::String(id.clone())))
                .collect::<Map<_, _>>();
            json!({
                "success": true,
                "createdTaskIds": created,
                "applied": {
                    "created": commit.summary.created,
                    "updated": commit.summary.updated,
                    "deleted": commit.summary.deleted,
                },
                "local": commit.clock.local_ms,
            })
        }
        Ok(Err(errors)) => rejected(&errors),
        Err(err) => crate::store_error(err),
    }
}

fn parse_request(args: &Value) -> Result<(String, &[Value]), Value> {
    let obj = args_object(args)?;
    let project_id = require_string(obj, "projectId")?;
    let Some(operations) = obj.get("operations").and_then(|v| v.as_array()) else {
        return Err(ai_error("INVALID_INPUT", "operations must be an array"));
    };
    Ok((project_id, operations.as_slice()))
}
