//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `Deserialize` + `Serialize` entity struct matching the stored row
//! - A `Validate` create DTO for inserts
//! - An update DTO (all `Option` fields) for patches; nullable columns use
//!   `Option<Option<T>>` so `Some(None)` clears them

pub mod tag;
pub mod task;
pub mod todo;

use serde::{Deserialize, Deserializer};

/// Read a nullable boolean column, treating `NULL` as `true`.
pub(crate) fn null_as_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

/// Read a nullable array column, treating `NULL` as empty.
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Distinguish an absent field (`None`) from an explicit `null`
/// (`Some(None)`), so update DTOs can clear nullable columns.
pub(crate) fn explicit_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) fn default_true() -> bool {
    true
}
