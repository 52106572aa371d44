//! The contract the repositories rely on from the hosted database.
//!
//! Three implementations exist: [`RestBackend`] (the hosted REST API),
//! [`PgBackend`] (a direct Postgres connection) and [`MemoryBackend`]
//! (tests and demo mode). Repositories only ever see `dyn Backend`.
//!
//! [`RestBackend`]: crate::rest::RestBackend
//! [`PgBackend`]: crate::pg::PgBackend
//! [`MemoryBackend`]: crate::memory::MemoryBackend

use async_trait::async_trait;
use kanban_core::error::CoreError;
use serde_json::Value;

use crate::query::{Delete, Insert, Rows, Select, Update};

/// Errors surfaced by a backend.
///
/// A query that names a column the table does not have fails like any
/// other query; callers cannot tell the two apart.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-2xx status and an error body.
    #[error("Service error ({status}): {message}")]
    Service {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The response could not be interpreted.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// The statement was refused before reaching storage.
    #[error("{0}")]
    Rejected(String),
}

impl From<BackendError> for CoreError {
    fn from(err: BackendError) -> Self {
        CoreError::Repository(err.to_string())
    }
}

/// Row-level access to the hosted database.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run a select, returning matching rows (and the exact count if asked).
    async fn select(&self, query: &Select) -> Result<Rows, BackendError>;

    /// Insert one row, returning it as stored (server ids and defaults filled).
    async fn insert(&self, query: &Insert) -> Result<Value, BackendError>;

    /// Insert one row unless another row already holds the same value in
    /// the unique `conflict_column`. Returns `None` when the insert was
    /// skipped, so concurrent callers creating the same row both succeed.
    async fn insert_if_absent(
        &self,
        query: &Insert,
        conflict_column: &str,
    ) -> Result<Option<Value>, BackendError>;

    /// Update matching rows, returning them as stored.
    async fn update(&self, query: &Update) -> Result<Vec<Value>, BackendError>;

    /// Delete matching rows, returning how many were removed.
    async fn delete(&self, query: &Delete) -> Result<u64, BackendError>;
}
