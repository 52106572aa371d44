//! [`Backend`] over the hosted service's REST table API.
//!
//! Statements become `GET`/`POST`/`PATCH`/`DELETE` requests against
//! `{rest_url}/{table}` with filters encoded as query parameters
//! (`column=op.value`, `or=(...)`). Exact counts come back in the
//! `Content-Range` response header.

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::SharedSession;
use crate::backend::{Backend, BackendError};
use crate::config::ServiceConfig;
use crate::http::{ensure_success, json_body};
use crate::query::{Condition, Delete, Direction, Insert, Order, Rows, Select, Update};

/// Query parameter list for one request.
pub type Params = Vec<(String, String)>;

const IGNORE_DUPLICATES: &str = "return=representation,resolution=ignore-duplicates";

pub struct RestBackend {
    client: reqwest::Client,
    rest_url: String,
    api_key: String,
    session: SharedSession,
}

impl RestBackend {
    /// Create a backend from service configuration. `session` supplies the
    /// bearer token; without one the anon key is used.
    pub fn new(config: &ServiceConfig, session: SharedSession) -> Result<Self, BackendError> {
        Ok(Self::with_client(
            config.http_client()?,
            config.rest_url(),
            config.anon_key.clone(),
            session,
        ))
    }

    pub fn with_client(
        client: reqwest::Client,
        rest_url: String,
        api_key: String,
        session: SharedSession,
    ) -> Self {
        Self {
            client,
            rest_url,
            api_key,
            session,
        }
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        let token = self
            .session
            .access_token()
            .unwrap_or_else(|| self.api_key.clone());
        self.client
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn select(&self, query: &Select) -> Result<Rows, BackendError> {
        let Some(params) = select_params(query) else {
            return Ok(Rows {
                rows: Vec::new(),
                total: query.count.then_some(0),
            });
        };

        let mut request = self.request(reqwest::Method::GET, &query.table).query(&params);
        if query.count {
            request = request.header("Prefer", "count=exact");
        }
        let response = ensure_success(request.send().await?).await?;

        let total = if query.count {
            let header = response
                .headers()
                .get(reqwest::header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Some(parse_content_range(&header).ok_or_else(|| {
                BackendError::Decode(format!("unusable Content-Range '{header}'"))
            })?)
        } else {
            None
        };

        let rows = expect_array(json_body(response).await?)?;
        tracing::debug!(table = %query.table, rows = rows.len(), ?total, "REST select");
        Ok(Rows { rows, total })
    }

    async fn insert(&self, query: &Insert) -> Result<Value, BackendError> {
        let response = self
            .request(reqwest::Method::POST, &query.table)
            .header("Prefer", "return=representation")
            .json(&query.row)
            .send()
            .await?;
        let rows = expect_array(json_body(ensure_success(response).await?).await?)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("insert returned no row".into()))
    }

    async fn insert_if_absent(
        &self,
        query: &Insert,
        conflict_column: &str,
    ) -> Result<Option<Value>, BackendError> {
        let response = self
            .request(reqwest::Method::POST, &query.table)
            .query(&conflict_params(conflict_column))
            .header("Prefer", IGNORE_DUPLICATES)
            .json(&query.row)
            .send()
            .await?;
        // Skipped rows are simply absent from the representation.
        let rows = expect_array(json_body(ensure_success(response).await?).await?)?;
        Ok(rows.into_iter().next())
    }

    async fn update(&self, query: &Update) -> Result<Vec<Value>, BackendError> {
        if query.conditions.is_empty() {
            return Err(BackendError::Rejected(format!(
                "refusing unscoped update of {}",
                query.table
            )));
        }
        let Some(params) = filter_params(&query.conditions) else {
            return Ok(Vec::new());
        };
        let response = self
            .request(reqwest::Method::PATCH, &query.table)
            .query(&params)
            .header("Prefer", "return=representation")
            .json(&query.changes)
            .send()
            .await?;
        expect_array(json_body(ensure_success(response).await?).await?)
    }

    async fn delete(&self, query: &Delete) -> Result<u64, BackendError> {
        if query.conditions.is_empty() {
            return Err(BackendError::Rejected(format!(
                "refusing unscoped delete of {}",
                query.table
            )));
        }
        let Some(params) = filter_params(&query.conditions) else {
            return Ok(0);
        };
        let response = self
            .request(reqwest::Method::DELETE, &query.table)
            .query(&params)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows = expect_array(json_body(ensure_success(response).await?).await?)?;
        Ok(rows.len() as u64)
    }
}

fn expect_array(body: Value) -> Result<Vec<Value>, BackendError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        other => Err(BackendError::Decode(format!(
            "expected a JSON array, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Query rendering
// ---------------------------------------------------------------------------

/// Render a select into query parameters.
///
/// Returns `None` when the filters can never match, so the caller can
/// answer without a round trip.
pub fn select_params(query: &Select) -> Option<Params> {
    let select = match &query.columns {
        Some(columns) if !columns.is_empty() => columns.join(","),
        _ => "*".to_string(),
    };
    let mut params = vec![("select".to_string(), select)];
    params.extend(filter_params(&query.conditions)?);

    if !query.order.is_empty() {
        params.push(("order".to_string(), render_order(&query.order)));
    }
    if let Some(window) = query.window {
        params.push(("offset".to_string(), window.offset.to_string()));
        params.push(("limit".to_string(), window.limit.to_string()));
    }
    Some(params)
}

/// Render `AND`-ed conditions. `None` means they match nothing.
pub fn filter_params(conditions: &[Condition]) -> Option<Params> {
    let mut params = Params::new();
    let mut groups = Vec::new();

    for condition in conditions {
        match simplify(condition)? {
            Condition::Any(inner) => groups.push(render_group(&inner)),
            other => params.push(render_top_level(&other)),
        }
    }

    match groups.len() {
        0 => {}
        1 => {
            let group = groups.remove(0);
            params.push(("or".to_string(), group));
        }
        _ => {
            let nested: Vec<String> = groups.into_iter().map(|g| format!("or{g}")).collect();
            params.push(("and".to_string(), format!("({})", nested.join(","))));
        }
    }
    Some(params)
}

/// Drop empty `Any` groups. `None` means the condition is always false.
fn simplify(condition: &Condition) -> Option<Condition> {
    match condition {
        Condition::Any(inner) => {
            let kept: Vec<Condition> = inner.iter().filter_map(simplify).collect();
            if kept.is_empty() {
                None
            } else {
                Some(Condition::Any(kept))
            }
        }
        other => Some(other.clone()),
    }
}

fn render_top_level(condition: &Condition) -> (String, String) {
    match condition {
        Condition::Eq { column, .. }
        | Condition::In { column, .. }
        | Condition::IsNull { column }
        | Condition::IsNotNull { column }
        | Condition::ILike { column, .. }
        | Condition::Contains { column, .. }
        | Condition::Overlaps { column, .. } => (column.clone(), render_operator(condition)),
        Condition::Any(inner) => ("or".to_string(), render_group(inner)),
    }
}

/// `(a.eq.1,b.is.null)`
fn render_group(conditions: &[Condition]) -> String {
    let parts: Vec<String> = conditions
        .iter()
        .map(|c| match c {
            Condition::Any(inner) => format!("or{}", render_group(inner)),
            Condition::Eq { column, .. }
            | Condition::In { column, .. }
            | Condition::IsNull { column }
            | Condition::IsNotNull { column }
            | Condition::ILike { column, .. }
            | Condition::Contains { column, .. }
            | Condition::Overlaps { column, .. } => format!("{column}.{}", render_operator(c)),
        })
        .collect();
    format!("({})", parts.join(","))
}

/// The `op.value` half of a filter.
fn render_operator(condition: &Condition) -> String {
    match condition {
        Condition::Eq { value, .. } if value.is_null() => "is.null".to_string(),
        Condition::Eq { value, .. } => format!("eq.{}", render_value(value)),
        Condition::In { values, .. } => {
            let items: Vec<String> = values.iter().map(render_value).collect();
            format!("in.({})", items.join(","))
        }
        Condition::IsNull { .. } => "is.null".to_string(),
        Condition::IsNotNull { .. } => "not.is.null".to_string(),
        // `*` is the wildcard in `ilike` values and cannot be escaped there,
        // so terms containing one fall back to a case-insensitive regex.
        Condition::ILike { needle, .. } if needle.contains('*') => {
            format!("imatch.{}", quote_if_reserved(&regex::escape(needle)))
        }
        Condition::ILike { needle, .. } => {
            let pattern = kanban_core::search::escape_like(needle);
            format!("ilike.{}", quote_if_reserved(&format!("*{pattern}*")))
        }
        Condition::Contains { value, .. } => {
            format!("cs.{}", array_literal(std::slice::from_ref(value)))
        }
        Condition::Overlaps { values, .. } => format!("ov.{}", array_literal(values)),
        Condition::Any(inner) => format!("or{}", render_group(inner)),
    }
}

fn render_order(order: &[Order]) -> String {
    order
        .iter()
        .map(|o| {
            let dir = match o.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            format!("{}.{dir}", o.column)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_if_reserved(s),
        other => quote_if_reserved(&other.to_string()),
    }
}

/// Characters with meaning inside filter values.
const RESERVED: &[char] = &[',', '.', ':', '(', ')', '"', ' '];

fn quote_if_reserved(raw: &str) -> String {
    if raw.contains(RESERVED) {
        quote(raw)
    } else {
        raw.to_string()
    }
}

fn quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `{"a","b"}`
fn array_literal(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| quote(v)).collect();
    format!("{{{}}}", items.join(","))
}

/// `on_conflict=<column>` for an insert that skips duplicates.
pub fn conflict_params(conflict_column: &str) -> Params {
    vec![("on_conflict".to_string(), conflict_column.to_string())]
}

/// Total from a `Content-Range` header: `0-9/42` or `*/0`.
pub fn parse_content_range(header: &str) -> Option<u64> {
    let (_, total) = header.trim().rsplit_once('/')?;
    total.parse().ok()
}
