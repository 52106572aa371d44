//! Runtime detection of optional schema columns.
//!
//! The remote schema may be mid-migration, so optional columns
//! (`tasks.deleted_at`, `tasks.is_public`, `todos.is_public`, `todos.tags`)
//! are detected by issuing a single-row select restricted to the column.
//! Any failure reads as "absent". Results are memoised per prober; a new
//! [`DataContext`](crate::context::DataContext) starts with an empty memo.

use std::collections::HashMap;
use std::sync::Mutex;

use kanban_core::error::CoreError;

use crate::backend::Backend;
use crate::query::Select;

pub const TASKS_TABLE: &str = "tasks";
pub const TODOS_TABLE: &str = "todos";
pub const TAGS_TABLE: &str = "todo_tags";

pub const DELETED_AT_COLUMN: &str = "deleted_at";
pub const IS_PUBLIC_COLUMN: &str = "is_public";
pub const TAGS_COLUMN: &str = "tags";

/// Optional task columns present in the current schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskCapabilities {
    pub soft_delete: bool,
    pub visibility: bool,
}

/// Optional todo columns present in the current schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TodoCapabilities {
    pub visibility: bool,
    pub tags: bool,
}

#[derive(Default)]
pub struct SchemaProber {
    memo: Mutex<HashMap<(String, String), bool>>,
}

impl SchemaProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `table.column` exists. Never fails.
    pub async fn has_column(&self, backend: &dyn Backend, table: &str, column: &str) -> bool {
        let key = (table.to_string(), column.to_string());
        if let Some(present) = self.cached(&key) {
            return present;
        }

        let probe = Select::from(table).columns([column]).limit(1);
        let present = match backend.select(&probe).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(table, column, error = %e, "Column probe failed, treating as absent");
                false
            }
        };
        self.remember(key, present);
        present
    }

    /// Whether `table` can be read at all. Not memoised.
    pub async fn table_exists(&self, backend: &dyn Backend, table: &str) -> bool {
        match backend.select(&Select::from(table).columns(["id"]).limit(1)).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(table, error = %e, "Table probe failed");
                false
            }
        }
    }

    pub async fn task_capabilities(&self, backend: &dyn Backend) -> TaskCapabilities {
        let (soft_delete, visibility) = tokio::join!(
            self.has_column(backend, TASKS_TABLE, DELETED_AT_COLUMN),
            self.has_column(backend, TASKS_TABLE, IS_PUBLIC_COLUMN),
        );
        TaskCapabilities {
            soft_delete,
            visibility,
        }
    }

    pub async fn todo_capabilities(&self, backend: &dyn Backend) -> TodoCapabilities {
        let (visibility, tags) = tokio::join!(
            self.has_column(backend, TODOS_TABLE, IS_PUBLIC_COLUMN),
            self.has_column(backend, TODOS_TABLE, TAGS_COLUMN),
        );
        TodoCapabilities { visibility, tags }
    }

    /// Seed the memo, e.g. from a schema version known at startup.
    pub fn prime(&self, table: &str, column: &str, present: bool) {
        self.remember((table.to_string(), column.to_string()), present);
    }

    /// Forget every memoised result so the next call re-probes.
    pub fn invalidate(&self) {
        self.lock().clear();
    }

    /// Assert that every listed column exists, for deployments that pin the
    /// schema instead of degrading at runtime.
    pub async fn require_columns(
        &self,
        backend: &dyn Backend,
        table: &str,
        columns: &[&str],
    ) -> Result<(), CoreError> {
        let mut missing = Vec::new();
        for column in columns {
            if !self.has_column(backend, table, column).await {
                missing.push(*column);
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Repository(format!(
                "{table} is missing required columns: {}",
                missing.join(", ")
            )))
        }
    }

    fn cached(&self, key: &(String, String)) -> Option<bool> {
        self.lock().get(key).copied()
    }

    fn remember(&self, key: (String, String), present: bool) {
        self.lock().insert(key, present);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), bool>> {
        self.memo
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
