//! In-memory [`Backend`] used by tests and demo mode.
//!
//! Tables declare their columns up front. Any statement that mentions an
//! undeclared column fails with the same kind of message the hosted
//! service produces, which is what lets the schema prober detect missing
//! optional columns against this backend.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use kanban_core::search::contains_ignore_case;
use kanban_core::types::Timestamp;
use serde_json::{json, Value};

use crate::backend::{Backend, BackendError};
use crate::query::{Condition, Delete, Direction, Insert, Order, Row, Rows, Select, Update};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

/// Declaration of one in-memory table.
#[derive(Debug, Clone, Default)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<String>,
    /// Values used for columns an insert leaves out.
    pub defaults: Row,
    /// Columns that must be non-null on insert.
    pub required: Vec<String>,
    /// Columns whose values must be unique across rows.
    pub unique: Vec<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn default_value(mut self, column: &str, value: Value) -> Self {
        self.defaults.insert(column.to_string(), value);
        self
    }

    pub fn required(mut self, column: &str) -> Self {
        self.required.push(column.to_string());
        self
    }

    pub fn unique(mut self, column: &str) -> Self {
        self.unique.push(column.to_string());
        self
    }

    /// Add `column` unless `present` is false.
    fn optional_column(mut self, column: &str, present: bool, default: Value) -> Self {
        if present {
            self.columns.push(column.to_string());
            self.defaults.insert(column.to_string(), default);
        }
        self
    }
}

/// Which optional columns exist in the board schema.
///
/// Models a database caught part-way through its migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KanbanSchema {
    pub task_visibility: bool,
    pub task_soft_delete: bool,
    pub todo_visibility: bool,
    pub todo_tags: bool,
}

impl KanbanSchema {
    /// Every optional column present.
    pub fn current() -> Self {
        Self {
            task_visibility: true,
            task_soft_delete: true,
            todo_visibility: true,
            todo_tags: true,
        }
    }

    /// No optional column present.
    pub fn legacy() -> Self {
        Self {
            task_visibility: false,
            task_soft_delete: false,
            todo_visibility: false,
            todo_tags: false,
        }
    }

    /// Table definitions for `tasks`, `todos` and `todo_tags`.
    pub fn tables(&self) -> Vec<TableDef> {
        let tasks = TableDef::new(
            "tasks",
            &[
                "id",
                "user_id",
                "title",
                "description",
                "status",
                "priority",
                "due_date",
                "assignee",
                "position",
                "created_at",
                "updated_at",
            ],
        )
        .required("title")
        .default_value("status", json!("todo"))
        .default_value("priority", json!("medium"))
        .default_value("position", json!(0))
        .optional_column("is_public", self.task_visibility, json!(true))
        .optional_column("deleted_at", self.task_soft_delete, Value::Null);

        let todos = TableDef::new(
            "todos",
            &[
                "id",
                "user_id",
                "title",
                "description",
                "completed",
                "created_at",
                "updated_at",
            ],
        )
        .required("title")
        .default_value("completed", json!(false))
        .optional_column("is_public", self.todo_visibility, json!(false))
        .optional_column("tags", self.todo_tags, json!([]));

        let tags = TableDef::new("todo_tags", &["id", "name", "color", "icon", "created_at"])
            .required("name")
            .unique("name")
            .default_value("color", json!(kanban_core::tags::UNKNOWN_TAG_COLOR));

        vec![tasks, todos, tags]
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MemoryTable {
    def: TableDef,
    rows: Vec<Row>,
}

#[derive(Debug)]
struct State {
    tables: HashMap<String, MemoryTable>,
    failure: Option<String>,
    last_timestamp: Timestamp,
}

/// A process-local stand-in for the hosted database.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    /// An empty backend with no tables.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                tables: HashMap::new(),
                failure: None,
                last_timestamp: Utc::now(),
            }),
        }
    }

    /// A backend with the board tables in the given migration state.
    pub fn with_schema(schema: KanbanSchema) -> Self {
        let backend = Self::new();
        for def in schema.tables() {
            backend.create_table(def);
        }
        backend
    }

    /// Create (or replace) a table.
    pub fn create_table(&self, def: TableDef) {
        let mut state = self.lock();
        state.tables.insert(
            def.name.clone(),
            MemoryTable {
                def,
                rows: Vec::new(),
            },
        );
    }

    pub fn drop_table(&self, table: &str) {
        self.lock().tables.remove(table);
    }

    /// Add a column to an existing table, filling existing rows with `default`.
    pub fn add_column(&self, table: &str, column: &str, default: Value) {
        let mut state = self.lock();
        if let Some(t) = state.tables.get_mut(table) {
            if !t.def.columns.iter().any(|c| c == column) {
                t.def.columns.push(column.to_string());
            }
            t.def.defaults.insert(column.to_string(), default.clone());
            for row in &mut t.rows {
                row.entry(column.to_string()).or_insert_with(|| default.clone());
            }
        }
    }

    /// Remove a column and its values from a table.
    pub fn drop_column(&self, table: &str, column: &str) {
        let mut state = self.lock();
        if let Some(t) = state.tables.get_mut(table) {
            t.def.columns.retain(|c| c != column);
            t.def.defaults.remove(column);
            for row in &mut t.rows {
                row.remove(column);
            }
        }
    }

    /// Make every subsequent statement fail with `message` until [`recover`].
    ///
    /// [`recover`]: MemoryBackend::recover
    pub fn fail_with(&self, message: impl Into<String>) {
        self.lock().failure = Some(message.into());
    }

    pub fn recover(&self) {
        self.lock().failure = None;
    }

    /// Snapshot of every stored row in `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, query: &Select) -> Result<Rows, BackendError> {
        let state = self.lock();
        check_available(&state)?;
        let table = table(&state, &query.table)?;

        if let Some(columns) = &query.columns {
            check_columns(table, columns.iter().map(String::as_str))?;
        }
        check_conditions(table, &query.conditions)?;
        check_columns(table, query.order.iter().map(|o| o.column.as_str()))?;

        let mut matched: Vec<&Row> = table
            .rows
            .iter()
            .filter(|row| query.conditions.iter().all(|c| matches(row, c)))
            .collect();
        matched.sort_by(|a, b| compare_rows(a, b, &query.order));

        let total = query.count.then_some(matched.len() as u64);
        let window: Vec<&Row> = match query.window {
            Some(w) => matched
                .into_iter()
                .skip(usize::try_from(w.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(w.limit).unwrap_or(usize::MAX))
                .collect(),
            None => matched,
        };

        let rows = window
            .into_iter()
            .map(|row| Value::Object(project(row, query.columns.as_deref())))
            .collect();
        Ok(Rows { rows, total })
    }

    async fn insert(&self, query: &Insert) -> Result<Value, BackendError> {
        let mut state = self.lock();
        check_available(&state)?;
        insert_row(&mut state, query)
    }

    async fn insert_if_absent(
        &self,
        query: &Insert,
        conflict_column: &str,
    ) -> Result<Option<Value>, BackendError> {
        let mut state = self.lock();
        check_available(&state)?;
        let table = table(&state, &query.table)?;
        check_columns(table, [conflict_column])?;
        if let Some(value) = query.row.get(conflict_column).filter(|v| !v.is_null()) {
            if table.rows.iter().any(|row| row.get(conflict_column) == Some(value)) {
                return Ok(None);
            }
        }
        insert_row(&mut state, query).map(Some)
    }

    async fn update(&self, query: &Update) -> Result<Vec<Value>, BackendError> {
        let mut state = self.lock();
        check_available(&state)?;
        let table = table_mut(&mut state, &query.table)?;
        check_columns(table, query.changes.keys().map(String::as_str))?;
        check_conditions(table, &query.conditions)?;

        let targets: Vec<usize> = table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| query.conditions.iter().all(|c| matches(row, c)))
            .map(|(i, _)| i)
            .collect();

        for &i in &targets {
            let mut candidate = table.rows[i].clone();
            for (k, v) in &query.changes {
                candidate.insert(k.clone(), v.clone());
            }
            check_unique(table, &candidate, Some(i))?;
        }

        let mut updated = Vec::with_capacity(targets.len());
        for i in targets {
            let row = &mut table.rows[i];
            for (k, v) in &query.changes {
                row.insert(k.clone(), v.clone());
            }
            updated.push(Value::Object(row.clone()));
        }
        Ok(updated)
    }

    async fn delete(&self, query: &Delete) -> Result<u64, BackendError> {
        let mut state = self.lock();
        check_available(&state)?;
        let table = table_mut(&mut state, &query.table)?;
        check_conditions(table, &query.conditions)?;

        let before = table.rows.len();
        table
            .rows
            .retain(|row| !query.conditions.iter().all(|c| matches(row, c)));
        Ok((before - table.rows.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_available(state: &State) -> Result<(), BackendError> {
    match &state.failure {
        Some(message) => Err(BackendError::Rejected(message.clone())),
        None => Ok(()),
    }
}

fn missing_relation(name: &str) -> BackendError {
    BackendError::Rejected(format!("relation \"{name}\" does not exist"))
}

fn table<'a>(state: &'a State, name: &str) -> Result<&'a MemoryTable, BackendError> {
    state.tables.get(name).ok_or_else(|| missing_relation(name))
}

fn table_mut<'a>(state: &'a mut State, name: &str) -> Result<&'a mut MemoryTable, BackendError> {
    state.tables.get_mut(name).ok_or_else(|| missing_relation(name))
}

fn check_columns<'a>(
    table: &MemoryTable,
    columns: impl IntoIterator<Item = &'a str>,
) -> Result<(), BackendError> {
    for column in columns {
        if !table.def.columns.iter().any(|c| c == column) {
            return Err(BackendError::Rejected(format!(
                "column {}.{column} does not exist",
                table.def.name
            )));
        }
    }
    Ok(())
}

/// Insert under an already held lock.
fn insert_row(state: &mut State, query: &Insert) -> Result<Value, BackendError> {
    let now = next_timestamp(state);
    let table = table_mut(state, &query.table)?;
    check_columns(table, query.row.keys().map(String::as_str))?;

    let mut row = Row::new();
    for column in &table.def.columns {
        let value = match query.row.get(column) {
            Some(v) => v.clone(),
            None => match column.as_str() {
                "id" => json!(uuid::Uuid::new_v4().to_string()),
                "created_at" | "updated_at" => json!(now),
                _ => table.def.defaults.get(column).cloned().unwrap_or(Value::Null),
            },
        };
        row.insert(column.clone(), value);
    }

    for column in &table.def.required {
        if row.get(column).map_or(true, Value::is_null) {
            return Err(BackendError::Rejected(format!(
                "null value in column \"{column}\" of relation \"{}\" violates not-null constraint",
                table.def.name
            )));
        }
    }
    check_unique(table, &row, None)?;

    table.rows.push(row.clone());
    Ok(Value::Object(row))
}

fn check_conditions(table: &MemoryTable, conditions: &[Condition]) -> Result<(), BackendError> {
    check_columns(table, conditions.iter().flat_map(|c| c.columns()))
}

fn check_unique(table: &MemoryTable, row: &Row, skip: Option<usize>) -> Result<(), BackendError> {
    for column in &table.def.unique {
        let Some(value) = row.get(column).filter(|v| !v.is_null()) else {
            continue;
        };
        let clash = table
            .rows
            .iter()
            .enumerate()
            .any(|(i, other)| Some(i) != skip && other.get(column) == Some(value));
        if clash {
            return Err(BackendError::Rejected(format!(
                "duplicate key value violates unique constraint \"{}_{column}_key\"",
                table.def.name
            )));
        }
    }
    Ok(())
}

/// Monotonic clock so rows inserted back to back still order deterministically.
fn next_timestamp(state: &mut State) -> String {
    let mut now = Utc::now();
    if now <= state.last_timestamp {
        now = state.last_timestamp + Duration::microseconds(1);
    }
    state.last_timestamp = now;
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn project(row: &Row, columns: Option<&[String]>) -> Row {
    match columns {
        Some(cols) => cols
            .iter()
            .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
            .collect(),
        None => row.clone(),
    }
}

fn field<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

fn matches(row: &Row, condition: &Condition) -> bool {
    match condition {
        Condition::Eq { column, value } => {
            let actual = field(row, column);
            if value.is_null() {
                actual.is_null()
            } else {
                actual == value
            }
        }
        Condition::In { column, values } => values.contains(field(row, column)),
        Condition::IsNull { column } => field(row, column).is_null(),
        Condition::IsNotNull { column } => !field(row, column).is_null(),
        Condition::ILike { column, needle } => field(row, column)
            .as_str()
            .is_some_and(|s| contains_ignore_case(s, needle)),
        Condition::Contains { column, value } => field(row, column)
            .as_array()
            .is_some_and(|items| items.iter().any(|e| e.as_str() == Some(value.as_str()))),
        Condition::Overlaps { column, values } => {
            field(row, column).as_array().is_some_and(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|e| values.iter().any(|v| v == e))
            })
        }
        Condition::Any(inner) => inner.iter().any(|c| matches(row, c)),
    }
}

fn compare_rows(a: &Row, b: &Row, order: &[Order]) -> Ordering {
    for o in order {
        let ord = compare_values(field(a, &o.column), field(b, &o.column));
        let ord = match o.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Postgres-like ordering: nulls sort after every value when ascending.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
