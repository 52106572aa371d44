//! Service configuration loaded from environment variables.

use std::time::Duration;

/// Default HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors raised while reading configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in the environment")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Connection settings for the hosted database service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Base URL of the service, without a trailing slash.
    pub url: String,
    /// Public (anon) API key sent with every request.
    pub anon_key: String,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

impl ServiceConfig {
    /// Load configuration from the process environment, reading a `.env`
    /// file first if one exists.
    ///
    /// | Env Var                | Required | Default |
    /// |------------------------|----------|---------|
    /// | `SUPABASE_URL`         | **yes**  | --      |
    /// | `SUPABASE_ANON_KEY`    | **yes**  | --      |
    /// | `REQUEST_TIMEOUT_SECS` | no       | `30`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let url = required("SUPABASE_URL")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: "SUPABASE_URL",
                reason: format!("'{url}' is not an http(s) URL"),
            });
        }
        let anon_key = required("SUPABASE_ANON_KEY")?;

        let request_timeout_secs = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "REQUEST_TIMEOUT_SECS",
                reason: format!("'{raw}' is not a number of seconds"),
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
            request_timeout_secs,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Root of the REST (table) API.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }

    /// Root of the auth API.
    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.url)
    }

    /// Build the HTTP client shared by the REST backend and auth client.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .build()
    }
}

/// Read `DATABASE_URL` for the direct Postgres backend.
pub fn database_url_from_env() -> Result<String, ConfigError> {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing("DATABASE_URL"))
}
