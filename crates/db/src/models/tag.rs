//! Tag model and DTOs.

use kanban_core::tags::{is_hex_color, MAX_TAG_NAME_LEN, UNKNOWN_TAG_COLOR};
use kanban_core::types::{DbId, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

/// A row from the `todo_tags` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: DbId,
    /// Lowercase, globally unique.
    pub name: String,
    #[serde(default = "unknown_color", deserialize_with = "color_or_unknown")]
    pub color: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

fn unknown_color() -> String {
    UNKNOWN_TAG_COLOR.to_string()
}

fn color_or_unknown<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unknown_color))
}

/// DTO for explicit tag creation.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateTag {
    #[validate(length(min = 1, max = MAX_TAG_NAME_LEN, message = "tag name must be 1-50 characters"))]
    pub name: String,
    /// `#rrggbb`; a palette colour is picked when absent.
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
    pub icon: Option<String>,
}

impl CreateTag {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

fn validate_color(color: &str) -> Result<(), ValidationError> {
    if is_hex_color(color) {
        Ok(())
    } else {
        Err(ValidationError::new("color").with_message("color must be #rrggbb".into()))
    }
}
