//! Shared fixtures for repository integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use kanban_db::backend::Backend;
use kanban_db::context::DataContext;
use kanban_db::memory::{KanbanSchema, MemoryBackend};
use kanban_db::session::StaticSession;

pub const ALICE: &str = "11111111-1111-1111-1111-111111111111";
pub const BOB: &str = "22222222-2222-2222-2222-222222222222";

/// A fresh in-memory database with every optional column present.
pub fn current_db() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::with_schema(KanbanSchema::current()))
}

/// A fresh in-memory database that predates every optional column.
pub fn legacy_db() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::with_schema(KanbanSchema::legacy()))
}

/// A context acting as `user`.
pub fn as_user(db: &Arc<MemoryBackend>, user: &str) -> DataContext {
    let backend: Arc<dyn Backend> = db.clone();
    DataContext::new(backend, Arc::new(StaticSession::signed_in(user)))
}

/// A context with no session.
pub fn anonymous(db: &Arc<MemoryBackend>) -> DataContext {
    let backend: Arc<dyn Backend> = db.clone();
    DataContext::new(backend, Arc::new(StaticSession::anonymous()))
}
