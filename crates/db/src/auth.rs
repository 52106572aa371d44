//! Client for the hosted auth service (password sign-in, sign-up,
//! refresh, sign-out).
//!
//! The signed-in session is cached in a [`SharedSession`] handle. The REST
//! backend reads the access token from the same handle so that row-level
//! security on the service sees the caller, and [`SessionProvider`] reads
//! the cached identity without any network round trip.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use kanban_core::types::{Timestamp, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::BackendError;
use crate::config::ServiceConfig;
use crate::http::{ensure_success, json_body};
use crate::session::SessionProvider;

// ---------------------------------------------------------------------------
// Session data
// ---------------------------------------------------------------------------

/// The authenticated user attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in session as issued by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Absolute expiry, derived from `expires_at` or `expires_in`.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    pub user: AuthUser,
}

impl AuthSession {
    /// Parse a token response. Returns `None` when the body carries no
    /// access token (e.g. sign-up awaiting email confirmation).
    pub fn from_token_response(body: &Value) -> Result<Option<Self>, BackendError> {
        let Some(access_token) = body.get("access_token").and_then(Value::as_str) else {
            return Ok(None);
        };
        let user: AuthUser = serde_json::from_value(body.get("user").cloned().unwrap_or(Value::Null))
            .map_err(|e| BackendError::Decode(format!("auth user: {e}")))?;

        let expires_at = body
            .get("expires_at")
            .and_then(Value::as_i64)
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                body.get("expires_in")
                    .and_then(Value::as_i64)
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });

        Ok(Some(Self {
            access_token: access_token.to_string(),
            refresh_token: body
                .get("refresh_token")
                .and_then(Value::as_str)
                .map(str::to_string),
            expires_at,
            user,
        }))
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Cloneable handle to the cached session.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<Option<AuthSession>>>,
}

impl SharedSession {
    pub fn get(&self) -> Option<AuthSession> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, session: Option<AuthSession>) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    /// The cached session unless it has expired. An expired session is
    /// kept for [`AuthClient::refresh_session`] but acts as signed out.
    pub fn active(&self) -> Option<AuthSession> {
        self.get().filter(|s| !s.is_expired())
    }

    pub fn access_token(&self) -> Option<String> {
        self.active().map(|s| s.access_token)
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.active().map(|s| s.user.id)
    }
}

#[async_trait]
impl SessionProvider for SharedSession {
    async fn current_user(&self) -> Option<UserId> {
        self.user_id()
    }
}

// ---------------------------------------------------------------------------
// AuthClient
// ---------------------------------------------------------------------------

/// HTTP client for the auth endpoints of the hosted service.
pub struct AuthClient {
    client: reqwest::Client,
    auth_url: String,
    api_key: String,
    session: SharedSession,
}

impl AuthClient {
    /// Create an auth client from service configuration.
    pub fn new(config: &ServiceConfig) -> Result<Self, BackendError> {
        Ok(Self::with_client(
            config.http_client()?,
            config.auth_url(),
            config.anon_key.clone(),
        ))
    }

    /// Create an auth client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, auth_url: String, api_key: String) -> Self {
        Self {
            client,
            auth_url,
            api_key,
            session: SharedSession::default(),
        }
    }

    /// Handle to the cached session, for the REST backend and repositories.
    pub fn shared_session(&self) -> SharedSession {
        self.session.clone()
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.session.get()
    }

    /// Install a previously persisted session (e.g. from local storage).
    pub fn restore_session(&self, session: AuthSession) {
        tracing::debug!(user_id = %session.user.id, "Restored auth session");
        self.session.set(Some(session));
    }

    /// Sign in with email and password, caching the resulting session.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let body = self
            .post_token("password", &json!({ "email": email, "password": password }))
            .await?;
        let session = AuthSession::from_token_response(&body)?
            .ok_or_else(|| BackendError::Decode("token response without access_token".into()))?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        self.session.set(Some(session.clone()));
        Ok(session)
    }

    /// Register a new account.
    ///
    /// Returns `None` when the service requires email confirmation before
    /// issuing a session.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<AuthSession>, BackendError> {
        let response = self
            .client
            .post(format!("{}/signup", self.auth_url))
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body = json_body(ensure_success(response).await?).await?;

        let session = AuthSession::from_token_response(&body)?;
        match &session {
            Some(s) => {
                tracing::info!(user_id = %s.user.id, "Signed up");
                self.session.set(Some(s.clone()));
            }
            None => tracing::info!("Signed up, awaiting confirmation"),
        }
        Ok(session)
    }

    /// Exchange the cached refresh token for a new session.
    pub async fn refresh_session(&self) -> Result<AuthSession, BackendError> {
        let refresh_token = self
            .session
            .get()
            .and_then(|s| s.refresh_token)
            .ok_or_else(|| BackendError::Rejected("no refresh token available".into()))?;

        let body = self
            .post_token("refresh_token", &json!({ "refresh_token": refresh_token }))
            .await?;
        let session = AuthSession::from_token_response(&body)?
            .ok_or_else(|| BackendError::Decode("token response without access_token".into()))?;
        self.session.set(Some(session.clone()));
        Ok(session)
    }

    /// Revoke the session on the service and clear the local cache.
    ///
    /// The local session is cleared even if the revoke request fails.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(session) = self.session.get() else {
            return Ok(());
        };
        self.session.set(None);
        if session.is_expired() {
            tracing::debug!(user_id = %session.user.id, "Dropped expired session");
            return Ok(());
        }
        let token = session.access_token;

        let response = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::info!("Signed out");
        Ok(())
    }

    async fn post_token(&self, grant_type: &str, body: &Value) -> Result<Value, BackendError> {
        let response = self
            .client
            .post(format!("{}/token", self.auth_url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await?;
        json_body(ensure_success(response).await?).await
    }
}

#[async_trait]
impl SessionProvider for AuthClient {
    async fn current_user(&self) -> Option<UserId> {
        self.session.user_id()
    }
}
