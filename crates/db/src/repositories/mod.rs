//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async operations that
//! accept `&DataContext` as the first argument. Every mutation is scoped to
//! `id AND user_id = <current session>`, so a row that does not exist and a
//! row owned by someone else both surface as
//! [`CoreError::NotFoundOrForbidden`].

pub mod tag_repo;
pub mod task_repo;
pub mod todo_repo;

pub use tag_repo::TagRepo;
pub use task_repo::TaskRepo;
pub use todo_repo::TodoRepo;

use chrono::{SecondsFormat, Utc};
use kanban_core::error::CoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::query::{Condition, Row};

/// Columns no update payload may touch.
pub(crate) const PROTECTED_COLUMNS: [&str; 5] =
    ["id", "user_id", "created_at", "deleted_at", "is_deleted"];

pub(crate) fn decode<T: DeserializeOwned>(entity: &str, value: Value) -> Result<T, CoreError> {
    serde_json::from_value(value)
        .map_err(|e| CoreError::Repository(format!("malformed {entity} row: {e}")))
}

pub(crate) fn decode_all<T: DeserializeOwned>(
    entity: &str,
    values: Vec<Value>,
) -> Result<Vec<T>, CoreError> {
    values.into_iter().map(|v| decode(entity, v)).collect()
}

/// Serialize a DTO into a column map.
pub(crate) fn to_row<T: Serialize>(value: &T) -> Result<Row, CoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(CoreError::Repository(format!(
            "expected an object payload, got {other}"
        ))),
        Err(e) => Err(CoreError::Repository(e.to_string())),
    }
}

/// Remove protected columns and stamp `updated_at`.
pub(crate) fn prepare_changes(mut changes: Row) -> Row {
    for column in PROTECTED_COLUMNS {
        changes.remove(column);
    }
    changes.insert("updated_at".into(), now());
    changes
}

pub(crate) fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Reject ids that are not UUIDs before they reach the backend.
///
/// Such an id cannot name a stored row, so it reads as not found on every
/// backend instead of a type error from the REST service.
pub(crate) fn check_id(entity: &'static str, id: &str) -> Result<(), CoreError> {
    if uuid::Uuid::parse_str(id).is_ok() {
        Ok(())
    } else {
        Err(CoreError::NotFoundOrForbidden {
            entity,
            id: id.to_string(),
        })
    }
}

/// `id = <id> AND user_id = <user>`
pub(crate) fn owned_by(id: &str, user: &str) -> Vec<Condition> {
    vec![Condition::eq("id", id), Condition::eq("user_id", user)]
}

pub(crate) fn trim_title(title: &mut String) {
    let trimmed = title.trim();
    if trimmed.len() != title.len() {
        *title = trimmed.to_string();
    }
}
