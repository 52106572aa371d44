//! [`Backend`] over a direct Postgres connection.
//!
//! Rows travel as `jsonb`: selects return `to_jsonb(t)`, and inserts and
//! updates feed the row object through `jsonb_populate_record` so every
//! column is cast to its declared type by the database.

use async_trait::async_trait;
use kanban_core::search::escape_like;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::backend::{Backend, BackendError};
use crate::query::{Condition, Delete, Direction, Insert, Rows, Select, Update};

pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn select(&self, query: &Select) -> Result<Rows, BackendError> {
        let rows: Vec<Value> = build_select(query)
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;

        let total = if query.count {
            let count: i64 = build_count(query)
                .build_query_scalar()
                .fetch_one(&self.pool)
                .await?;
            Some(count.max(0) as u64)
        } else {
            None
        };
        Ok(Rows { rows, total })
    }

    async fn insert(&self, query: &Insert) -> Result<Value, BackendError> {
        let row = build_insert(query)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_if_absent(
        &self,
        query: &Insert,
        conflict_column: &str,
    ) -> Result<Option<Value>, BackendError> {
        let row = build_insert_if_absent(query, conflict_column)
            .build_query_scalar()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update(&self, query: &Update) -> Result<Vec<Value>, BackendError> {
        let rows = build_update(query)?
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn delete(&self, query: &Delete) -> Result<u64, BackendError> {
        let result = build_delete(query)?.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// SQL construction
// ---------------------------------------------------------------------------

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn build_select(query: &Select) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    match &query.columns {
        Some(columns) if !columns.is_empty() => {
            let pairs: Vec<String> = columns
                .iter()
                .map(|c| format!("{}, t.{}", quote_literal(c), quote_ident(c)))
                .collect();
            qb.push(format!("jsonb_build_object({})", pairs.join(", ")));
        }
        _ => {
            qb.push("to_jsonb(t)");
        }
    }
    qb.push(format!(" FROM {} AS t", quote_ident(&query.table)));
    push_where(&mut qb, &query.conditions);

    if !query.order.is_empty() {
        let terms: Vec<String> = query
            .order
            .iter()
            .map(|o| {
                let dir = match o.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                format!("t.{} {dir}", quote_ident(&o.column))
            })
            .collect();
        qb.push(format!(" ORDER BY {}", terms.join(", ")));
    }
    if let Some(window) = query.window {
        qb.push(" LIMIT ");
        qb.push_bind(window.limit as i64);
        qb.push(" OFFSET ");
        qb.push_bind(window.offset as i64);
    }
    qb
}

pub fn build_count(query: &Select) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT COUNT(*) FROM {} AS t",
        quote_ident(&query.table)
    ));
    push_where(&mut qb, &query.conditions);
    qb
}

pub fn build_insert(query: &Insert) -> QueryBuilder<'static, Postgres> {
    build_insert_inner(query, None)
}

/// `INSERT .. ON CONFLICT (column) DO NOTHING`; returns no row when skipped.
pub fn build_insert_if_absent(
    query: &Insert,
    conflict_column: &str,
) -> QueryBuilder<'static, Postgres> {
    build_insert_inner(query, Some(conflict_column))
}

fn build_insert_inner(
    query: &Insert,
    conflict_column: Option<&str>,
) -> QueryBuilder<'static, Postgres> {
    let table = quote_ident(&query.table);
    let mut qb = QueryBuilder::new(format!("INSERT INTO {table} AS t"));
    if query.row.is_empty() {
        qb.push(" DEFAULT VALUES");
    } else {
        let columns: Vec<String> = query.row.keys().map(|c| quote_ident(c)).collect();
        let sources: Vec<String> = columns.iter().map(|c| format!("r.{c}")).collect();
        qb.push(format!(
            " ({}) SELECT {} FROM jsonb_populate_record(NULL::{table}, ",
            columns.join(", "),
            sources.join(", ")
        ));
        qb.push_bind(sqlx::types::Json(Value::Object(query.row.clone())));
        qb.push("::jsonb) AS r");
    }
    if let Some(column) = conflict_column {
        qb.push(format!(" ON CONFLICT ({}) DO NOTHING", quote_ident(column)));
    }
    qb.push(" RETURNING to_jsonb(t)");
    qb
}

pub fn build_update(query: &Update) -> Result<QueryBuilder<'static, Postgres>, BackendError> {
    if query.conditions.is_empty() {
        return Err(BackendError::Rejected(format!(
            "refusing unscoped update of {}",
            query.table
        )));
    }
    if query.changes.is_empty() {
        return Err(BackendError::Rejected(format!(
            "update of {} has no changes",
            query.table
        )));
    }

    let table = quote_ident(&query.table);
    let assignments: Vec<String> = query
        .changes
        .keys()
        .map(|c| {
            let c = quote_ident(c);
            format!("{c} = r.{c}")
        })
        .collect();

    let mut qb = QueryBuilder::new(format!(
        "UPDATE {table} AS t SET {} FROM jsonb_populate_record(NULL::{table}, ",
        assignments.join(", ")
    ));
    qb.push_bind(sqlx::types::Json(Value::Object(query.changes.clone())));
    qb.push("::jsonb) AS r");
    push_where(&mut qb, &query.conditions);
    qb.push(" RETURNING to_jsonb(t)");
    Ok(qb)
}

pub fn build_delete(query: &Delete) -> Result<QueryBuilder<'static, Postgres>, BackendError> {
    if query.conditions.is_empty() {
        return Err(BackendError::Rejected(format!(
            "refusing unscoped delete of {}",
            query.table
        )));
    }
    let mut qb = QueryBuilder::new(format!("DELETE FROM {} AS t", quote_ident(&query.table)));
    push_where(&mut qb, &query.conditions);
    Ok(qb)
}

fn push_where(qb: &mut QueryBuilder<'static, Postgres>, conditions: &[Condition]) {
    for (i, condition) in conditions.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        push_condition(qb, condition);
    }
}

fn push_condition(qb: &mut QueryBuilder<'static, Postgres>, condition: &Condition) {
    match condition {
        Condition::Eq { column, value } => {
            let col = format!("t.{}", quote_ident(column));
            match value {
                Value::Null => {
                    qb.push(format!("{col} IS NULL"));
                }
                Value::String(s) => {
                    qb.push(format!("{col}::text = "));
                    qb.push_bind(s.clone());
                }
                Value::Bool(b) => {
                    qb.push(format!("{col} = "));
                    qb.push_bind(*b);
                }
                Value::Number(n) => {
                    qb.push(format!("{col}::numeric = "));
                    qb.push_bind(n.to_string());
                    qb.push("::numeric");
                }
                other => {
                    qb.push(format!("to_jsonb({col}) = "));
                    qb.push_bind(sqlx::types::Json(other.clone()));
                    qb.push("::jsonb");
                }
            }
        }
        Condition::In { column, values } => {
            if values.is_empty() {
                qb.push("FALSE");
                return;
            }
            let texts: Vec<String> = values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            qb.push(format!("t.{}::text = ANY(", quote_ident(column)));
            qb.push_bind(texts);
            qb.push(")");
        }
        Condition::IsNull { column } => {
            qb.push(format!("t.{} IS NULL", quote_ident(column)));
        }
        Condition::IsNotNull { column } => {
            qb.push(format!("t.{} IS NOT NULL", quote_ident(column)));
        }
        Condition::ILike { column, needle } => {
            qb.push(format!("t.{} ILIKE ", quote_ident(column)));
            qb.push_bind(format!("%{}%", escape_like(needle)));
        }
        Condition::Contains { column, value } => {
            qb.push(format!("t.{} @> ARRAY[", quote_ident(column)));
            qb.push_bind(value.clone());
            qb.push("]::text[]");
        }
        Condition::Overlaps { column, values } => {
            qb.push(format!("t.{} && ", quote_ident(column)));
            qb.push_bind(values.clone());
            qb.push("::text[]");
        }
        Condition::Any(inner) => {
            if inner.is_empty() {
                qb.push("FALSE");
                return;
            }
            qb.push("(");
            for (i, c) in inner.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_condition(qb, c);
            }
            qb.push(")");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::query::Row;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn select_renders_filters_order_and_window() {
        let query = Select::from("tasks")
            .filter(Condition::eq("user_id", "u1"))
            .filter(Condition::is_null("deleted_at"))
            .order_by("status", Direction::Asc)
            .order_by("created_at", Direction::Desc)
            .range(10, 5);
        assert_eq!(
            build_select(&query).sql(),
            "SELECT to_jsonb(t) FROM \"tasks\" AS t \
             WHERE t.\"user_id\"::text = $1 AND t.\"deleted_at\" IS NULL \
             ORDER BY t.\"status\" ASC, t.\"created_at\" DESC LIMIT $2 OFFSET $3"
        );
    }

    #[test]
    fn column_subset_uses_jsonb_build_object() {
        let query = Select::from("todos").columns(["id", "tags"]).limit(1);
        assert_eq!(
            build_select(&query).sql(),
            "SELECT jsonb_build_object('id', t.\"id\", 'tags', t.\"tags\") \
             FROM \"todos\" AS t LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn count_ignores_order_and_window() {
        let query = Select::from("todos")
            .filter(Condition::eq("completed", true))
            .order_by("id", Direction::Asc)
            .range(0, 10)
            .with_count();
        assert_eq!(
            build_count(&query).sql(),
            "SELECT COUNT(*) FROM \"todos\" AS t WHERE t.\"completed\" = $1"
        );
    }

    #[test]
    fn search_group_renders_or_with_array_contains() {
        let query = Select::from("todos").filter(Condition::any(vec![
            Condition::ilike("title", "milk"),
            Condition::contains("tags", "milk"),
        ]));
        assert_eq!(
            build_select(&query).sql(),
            "SELECT to_jsonb(t) FROM \"todos\" AS t \
             WHERE (t.\"title\" ILIKE $1 OR t.\"tags\" @> ARRAY[$2]::text[])"
        );
    }

    #[test]
    fn empty_groups_match_nothing() {
        let query = Select::from("todos")
            .filter(Condition::any(vec![]))
            .filter(Condition::is_in("id", Vec::<Value>::new()));
        assert_eq!(
            build_select(&query).sql(),
            "SELECT to_jsonb(t) FROM \"todos\" AS t WHERE FALSE AND FALSE"
        );
    }

    #[test]
    fn numbers_and_arrays_bind_with_casts() {
        let query = Select::from("tasks")
            .filter(Condition::eq("position", 3))
            .filter(Condition::overlaps("tags", vec!["a".into()]))
            .filter(Condition::is_in("status", [json!("todo"), json!("done")]));
        assert_eq!(
            build_select(&query).sql(),
            "SELECT to_jsonb(t) FROM \"tasks\" AS t \
             WHERE t.\"position\"::numeric = $1::numeric \
             AND t.\"tags\" && $2::text[] \
             AND t.\"status\"::text = ANY($3)"
        );
    }

    #[test]
    fn insert_populates_from_jsonb() {
        let query = Insert::into_table("todo_tags", row(json!({ "color": "#fff", "name": "work" })));
        assert_eq!(
            build_insert(&query).sql(),
            "INSERT INTO \"todo_tags\" AS t (\"color\", \"name\") \
             SELECT r.\"color\", r.\"name\" \
             FROM jsonb_populate_record(NULL::\"todo_tags\", $1::jsonb) AS r \
             RETURNING to_jsonb(t)"
        );
    }

    #[test]
    fn insert_if_absent_does_nothing_on_conflict() {
        let query = Insert::into_table("todo_tags", row(json!({ "name": "work" })));
        assert_eq!(
            build_insert_if_absent(&query, "name").sql(),
            "INSERT INTO \"todo_tags\" AS t (\"name\") \
             SELECT r.\"name\" \
             FROM jsonb_populate_record(NULL::\"todo_tags\", $1::jsonb) AS r \
             ON CONFLICT (\"name\") DO NOTHING \
             RETURNING to_jsonb(t)"
        );
    }

    #[test]
    fn update_assigns_from_populated_record() {
        let query = Update::table("tasks", row(json!({ "status": "done" })))
            .filter(Condition::eq("id", "t1"));
        assert_eq!(
            build_update(&query).unwrap().sql(),
            "UPDATE \"tasks\" AS t SET \"status\" = r.\"status\" \
             FROM jsonb_populate_record(NULL::\"tasks\", $1::jsonb) AS r \
             WHERE t.\"id\"::text = $2 RETURNING to_jsonb(t)"
        );
    }

    #[test]
    fn unscoped_writes_are_refused() {
        let update = Update::table("tasks", row(json!({ "title": "x" })));
        assert!(matches!(build_update(&update), Err(BackendError::Rejected(_))));
        assert!(matches!(
            build_delete(&Delete::from("tasks")),
            Err(BackendError::Rejected(_))
        ));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }
}
