//! Session accessor: who is calling.
//!
//! Absence of a session is a normal state, not an error, so
//! [`SessionProvider::current_user`] returns an `Option` and never fails.

use async_trait::async_trait;
use kanban_core::types::UserId;

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The identity of the current session, if any.
    async fn current_user(&self) -> Option<UserId>;
}

/// A fixed identity, or none.
///
/// Used by tests and by server-side callers that authenticate elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSession {
    user: Option<UserId>,
}

impl StaticSession {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn signed_in(user: impl Into<UserId>) -> Self {
        Self {
            user: Some(user.into()),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_user(&self) -> Option<UserId> {
        self.user.clone()
    }
}
