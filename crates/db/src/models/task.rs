//! Kanban task model and DTOs.

use chrono::NaiveDate;
use kanban_core::types::{DbId, Timestamp, UserId};
use kanban_core::workflow::{TaskPriority, TaskStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{default_true, null_as_true};

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `tasks` table.
///
/// Optional columns missing from the schema deserialize to their defaults:
/// `is_public` reads as `true`, `deleted_at` as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: DbId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default = "default_true", deserialize_with = "null_as_true")]
    pub is_public: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
}

impl Task {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// One board column: every visible task with a given status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardColumn {
    pub status: TaskStatus,
    pub title: &'static str,
    pub tasks: Vec<Task>,
}

/// The three fixed columns, left to right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Board {
    pub columns: Vec<BoardColumn>,
}

impl Board {
    /// Group tasks into columns, keeping their relative order.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let mut columns: Vec<BoardColumn> = TaskStatus::ALL
            .iter()
            .map(|&status| BoardColumn {
                status,
                title: status.label(),
                tasks: Vec::new(),
            })
            .collect();
        for task in tasks {
            if let Some(column) = columns.iter_mut().find(|c| c.status == task.status) {
                column.tasks.push(task);
            }
        }
        Self { columns }
    }

    pub fn column(&self, status: TaskStatus) -> Option<&BoardColumn> {
        self.columns.iter().find(|c| c.status == status)
    }
}

// ---------------------------------------------------------------------------
// DTOs (request payloads)
// ---------------------------------------------------------------------------

/// DTO for creating a task. The owner comes from the session.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateTask {
    #[validate(length(min = 1, message = "title must not be blank"))]
    pub title: String,
    pub description: Option<String>,
    /// Column the task starts in.
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub assignee: Option<String>,
    /// Defaults to `0` (top of the column).
    pub position: Option<i32>,
}

impl CreateTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// DTO for editing a task. `None` fields are left unchanged; `Some(None)`
/// clears a nullable column.
///
/// Ownership, timestamps and the deletion marker are not part of this
/// payload; they only change through the dedicated operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "title must not be blank"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "super::explicit_null", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "super::explicit_null", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "super::explicit_null", skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    /// Ignored when the schema has no visibility column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row() -> serde_json::Value {
        json!({
            "id": "t1",
            "user_id": "alice",
            "title": "Write report",
            "status": "inprogress",
            "priority": "high",
            "position": 2,
            "created_at": "2026-03-01T10:00:00.000001Z",
            "updated_at": "2026-03-01T10:00:00.000001Z"
        })
    }

    #[test]
    fn legacy_row_defaults_optional_columns() {
        let task: Task = serde_json::from_value(row()).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, TaskPriority::High);
        assert!(task.is_public);
        assert!(!task.is_deleted());
    }

    #[test]
    fn null_visibility_reads_as_public() {
        let mut value = row();
        value["is_public"] = serde_json::Value::Null;
        let task: Task = serde_json::from_value(value).unwrap();
        assert!(task.is_public);
    }

    #[test]
    fn postgres_timestamps_and_dates_parse() {
        let mut value = row();
        value["due_date"] = json!("2026-04-01");
        value["deleted_at"] = json!("2026-03-02T08:30:00.123456+00:00");
        let task: Task = serde_json::from_value(value).unwrap();
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 4, 1));
        assert!(task.is_deleted());
    }

    #[test]
    fn update_serializes_only_set_fields() {
        let changes = UpdateTask {
            status: Some(TaskStatus::Done),
            position: Some(0),
            ..UpdateTask::default()
        };
        assert_eq!(
            serde_json::to_value(&changes).unwrap(),
            json!({ "status": "done", "position": 0 })
        );
    }

    #[test]
    fn explicit_null_clears_while_absent_keeps() {
        let changes: UpdateTask =
            serde_json::from_value(json!({ "description": null, "due_date": "2026-05-01" }))
                .unwrap();
        assert_eq!(changes.description, Some(None));
        assert_eq!(changes.due_date, Some(NaiveDate::from_ymd_opt(2026, 5, 1)));
        assert_eq!(changes.assignee, None);
        assert_eq!(
            serde_json::to_value(&changes).unwrap(),
            json!({ "description": null, "due_date": "2026-05-01" })
        );
    }

    #[test]
    fn board_groups_by_status_in_column_order() {
        let mut done: Task = serde_json::from_value(row()).unwrap();
        done.status = TaskStatus::Done;
        let mut todo = done.clone();
        todo.status = TaskStatus::Todo;

        let board = Board::from_tasks(vec![done, todo]);
        let titles: Vec<&str> = board.columns.iter().map(|c| c.title).collect();
        assert_eq!(titles, vec!["To Do", "In Progress", "Done"]);
        assert_eq!(board.column(TaskStatus::Todo).unwrap().tasks.len(), 1);
        assert!(board.column(TaskStatus::InProgress).unwrap().tasks.is_empty());
        assert_eq!(board.column(TaskStatus::Done).unwrap().tasks.len(), 1);
    }
}
