//! The constructed dependency every repository operation receives.

use std::sync::Arc;

use kanban_core::error::CoreError;
use kanban_core::types::UserId;

use crate::auth::AuthClient;
use crate::backend::{Backend, BackendError};
use crate::capabilities::SchemaProber;
use crate::config::ServiceConfig;
use crate::memory::{KanbanSchema, MemoryBackend};
use crate::pg::PgBackend;
use crate::rest::RestBackend;
use crate::session::SessionProvider;

/// Backend, session and schema memo bundled together.
///
/// Cloning is cheap; clones share the backend and the capability memo.
#[derive(Clone)]
pub struct DataContext {
    backend: Arc<dyn Backend>,
    session: Arc<dyn SessionProvider>,
    schema: Arc<SchemaProber>,
}

impl DataContext {
    pub fn new(backend: Arc<dyn Backend>, session: Arc<dyn SessionProvider>) -> Self {
        Self {
            backend,
            session,
            schema: Arc::new(SchemaProber::new()),
        }
    }

    /// Same backend and capability memo, acting as a different session.
    pub fn with_session(&self, session: Arc<dyn SessionProvider>) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            session,
            schema: Arc::clone(&self.schema),
        }
    }

    /// Connect to the hosted service. The returned [`AuthClient`] shares its
    /// session with the backend, so signing in changes who the context acts
    /// as.
    pub fn connect_rest(config: &ServiceConfig) -> Result<(Self, AuthClient), BackendError> {
        let auth = AuthClient::new(config)?;
        let shared = auth.shared_session();
        let backend = RestBackend::new(config, shared.clone())?;
        tracing::info!(url = %config.url, "Connected data context to REST service");
        Ok((Self::new(Arc::new(backend), Arc::new(shared)), auth))
    }

    /// Connect straight to Postgres.
    pub async fn connect_postgres(
        database_url: &str,
        session: Arc<dyn SessionProvider>,
    ) -> Result<Self, BackendError> {
        let pool = crate::create_pool(database_url).await?;
        Ok(Self::new(Arc::new(PgBackend::new(pool)), session))
    }

    /// An in-memory context for demo mode.
    pub fn in_memory(schema: KanbanSchema, session: Arc<dyn SessionProvider>) -> Self {
        Self::new(Arc::new(MemoryBackend::with_schema(schema)), session)
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn schema(&self) -> &SchemaProber {
        &self.schema
    }

    pub async fn current_user(&self) -> Option<UserId> {
        self.session.current_user().await
    }

    /// The current user, or [`CoreError::AuthRequired`].
    pub async fn require_user(&self) -> Result<UserId, CoreError> {
        self.current_user().await.ok_or(CoreError::AuthRequired)
    }
}
