#![forbid(unsafe_code)]

use super::SnapshotError;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// An `{ ids, entities }` sub-state lifted out of the snapshot map. Keys other than `ids` and
/// `entities` ride along untouched in `rest`.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct EntityState {
    pub ids: Vec<String>,
    pub entities: Map<String, Value>,
    rest: Map<String, Value>,
}

impl EntityState {
    /// Removes the sub-state at `key`; `Ok(None)` when absent or null.
    pub fn take(
        parent: &mut Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Result<Option<Self>, SnapshotError> {
        Self::parse(parent.remove(key), path)
    }

    pub fn read(
        parent: &Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Result<Option<Self>, SnapshotError> {
        Self::parse(parent.get(key).cloned(), path)
    }

    fn parse(value: Option<Value>, path: &str) -> Result<Option<Self>, SnapshotError> {
        let mut obj = match value {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(obj)) => obj,
            Some(_) => return Err(SnapshotError::wrong_type(path, "object")),
        };

        let ids = match obj.remove("ids") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(id) => Ok(id),
                    _ => Err(SnapshotError::wrong_type(
                        &format!("{path}.ids"),
                        "array of strings",
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(SnapshotError::wrong_type(
                    &format!("{path}.ids"),
                    "array of strings",
                ));
            }
        };

        let entities = match obj.remove("entities") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(entities)) => entities,
            Some(_) => {
                return Err(SnapshotError::wrong_type(
                    &format!("{path}.entities"),
                    "object",
                ));
            }
        };

        Ok(Some(Self {
            ids,
            entities,
            rest: obj,
        }))
    }

    pub fn put(self, parent: &mut Map<String, Value>, key: &str) {
        let mut obj = self.rest;
        obj.insert(
            "ids".to_string(),
            Value::Array(self.ids.into_iter().map(Value::String).collect()),
        );
        obj.insert("entities".to_string(), Value::Object(self.entities));
        parent.insert(key.to_string(), Value::Object(obj));
    }

    /// `ids` in order (skipping ids with no entity) followed by entities missing from `ids`.
    pub fn ordered_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.entities.len());
        for id in &self.ids {
            if self.entities.contains_key(id) && seen.insert(id.as_str()) {
                out.push(id.clone());
            }
        }
        for id in self.entities.keys() {
            if seen.insert(id.as_str()) {
                out.push(id.clone());
            }
        }
        out
    }

    pub fn push_id(&mut self, id: &str) {
        if !self.ids.iter().any(|existing| existing == id) {
            self.ids.push(id.to_string());
        }
    }

    pub fn entity_mut(
        &mut self,
        id: &str,
        kind: &'static str,
    ) -> Result<&mut Map<String, Value>, SnapshotError> {
        self.entities
            .get_mut(id)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| SnapshotError::MissingEntity {
                kind,
                id: id.to_string(),
            })
    }
}

/// A non-empty string field of an entity object.
pub(crate) fn str_field<'a>(entity: &'a Value, key: &str) -> Option<&'a str> {
    entity
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

/// String entries of a list field; absent or malformed lists read as empty.
pub(crate) fn string_list(entity: &Map<String, Value>, key: &str) -> Vec<String> {
    entity
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn set_string_list(entity: &mut Map<String, Value>, key: &str, list: Vec<String>) {
    entity.insert(
        key.to_string(),
        Value::Array(list.into_iter().map(Value::String).collect()),
    );
}
