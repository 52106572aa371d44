//! Todo model, DTOs and list filters.

use kanban_core::pagination::DEFAULT_PAGE_SIZE;
use kanban_core::types::{DbId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::null_as_empty;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `todos` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: DbId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// `None` when the schema has no visibility column.
    #[serde(default)]
    pub is_public: Option<bool>,
    /// Empty when the schema has no tags column.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Completion counts for the caller's own todos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TodoStats {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
}

// ---------------------------------------------------------------------------
// DTOs (request payloads)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateTodo {
    #[validate(length(min = 1, message = "title must not be blank"))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// Private unless set. Ignored without a visibility column.
    pub is_public: Option<bool>,
    /// Tag names; normalised and created on demand. Ignored without a tags
    /// column.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateTodo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateTodo {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "title must not be blank"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "super::explicit_null", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// List filters
// ---------------------------------------------------------------------------

/// Completion filter for the todo list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionFilter {
    #[default]
    Either,
    Completed,
    Pending,
}

impl CompletionFilter {
    /// The `completed` value to filter on, if any.
    pub fn as_completed(self) -> Option<bool> {
        match self {
            CompletionFilter::Either => None,
            CompletionFilter::Completed => Some(true),
            CompletionFilter::Pending => Some(false),
        }
    }
}

/// Query parameters for the todo list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TodoFilters {
    pub search: Option<String>,
    pub completed: CompletionFilter,
    pub page: u32,
    pub page_size: u32,
    pub only_mine: bool,
    pub tag_names: Vec<String>,
}

impl Default for TodoFilters {
    fn default() -> Self {
        Self {
            search: None,
            completed: CompletionFilter::Either,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            only_mine: false,
            tag_names: Vec::new(),
        }
    }
}

impl TodoFilters {
    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }
}
