//! Repository for the `tasks` table.

use kanban_core::access::VisibilityMode;
use kanban_core::error::CoreError;
use kanban_core::workflow::TaskStatus;
use serde_json::{json, Value};
use validator::Validate;

use super::{check_id, decode, decode_all, now, owned_by, prepare_changes, to_row, trim_title};
use crate::capabilities::{TaskCapabilities, DELETED_AT_COLUMN, IS_PUBLIC_COLUMN, TASKS_TABLE};
use crate::context::DataContext;
use crate::models::task::{Board, CreateTask, Task, UpdateTask};
use crate::query::{Condition, Delete, Direction, Insert, Row, Select, Update};

const ENTITY: &str = "task";

/// Provides board operations for tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Every task the caller can see, ordered by status then position.
    ///
    /// Soft-deleted tasks are excluded when the schema has a `deleted_at`
    /// column. Without a visibility column every task is visible.
    pub async fn list(ctx: &DataContext) -> Result<Vec<Task>, CoreError> {
        let viewer = ctx.current_user().await;
        let caps = ctx.schema().task_capabilities(ctx.backend()).await;

        let query = Select::from(TASKS_TABLE)
            .filters(visible_to(caps, viewer.as_deref()))
            .order_by("status", Direction::Asc)
            .order_by("position", Direction::Asc)
            .order_by("created_at", Direction::Asc)
            .order_by("id", Direction::Asc);
        let rows = ctx.backend().select(&query).await?;
        decode_all(ENTITY, rows.rows)
    }

    /// A single visible, non-deleted task.
    pub async fn find(ctx: &DataContext, id: &str) -> Result<Task, CoreError> {
        check_id(ENTITY, id)?;
        let viewer = ctx.current_user().await;
        let caps = ctx.schema().task_capabilities(ctx.backend()).await;

        let query = Select::from(TASKS_TABLE)
            .filter(Condition::eq("id", id))
            .filters(visible_to(caps, viewer.as_deref()))
            .limit(1);
        let rows = ctx.backend().select(&query).await?;
        match rows.rows.into_iter().next() {
            Some(row) => decode(ENTITY, row),
            None => Err(not_found(id)),
        }
    }

    /// Visible tasks grouped into the three board columns.
    pub async fn board(ctx: &DataContext) -> Result<Board, CoreError> {
        Ok(Board::from_tasks(Self::list(ctx).await?))
    }

    /// Create a task owned by the current session. New tasks are private.
    pub async fn create(ctx: &DataContext, draft: &CreateTask) -> Result<Task, CoreError> {
        let user = ctx.require_user().await?;
        let mut draft = draft.clone();
        trim_title(&mut draft.title);
        draft.validate()?;

        let caps = ctx.schema().task_capabilities(ctx.backend()).await;
        let mut row = Row::new();
        row.insert("user_id".into(), json!(user));
        row.insert("title".into(), json!(draft.title));
        row.insert("description".into(), json!(draft.description));
        row.insert("status".into(), json!(draft.status));
        row.insert("priority".into(), json!(draft.priority));
        row.insert("due_date".into(), json!(draft.due_date));
        row.insert("assignee".into(), json!(draft.assignee));
        row.insert("position".into(), json!(draft.position.unwrap_or(0)));
        if caps.visibility {
            row.insert(IS_PUBLIC_COLUMN.into(), json!(false));
        }

        let stored = ctx
            .backend()
            .insert(&Insert::into_table(TASKS_TABLE, row))
            .await?;
        let task: Task = decode(ENTITY, stored)?;
        tracing::info!(task_id = %task.id, user_id = %user, status = %task.status, "Task created");
        Ok(task)
    }

    /// Apply `changes` to a task the caller owns.
    ///
    /// Soft-deleted tasks must be restored before they can be edited.
    pub async fn update(
        ctx: &DataContext,
        id: &str,
        changes: &UpdateTask,
    ) -> Result<Task, CoreError> {
        let user = ctx.require_user().await?;
        check_id(ENTITY, id)?;
        let mut changes = changes.clone();
        if let Some(title) = changes.title.as_mut() {
            trim_title(title);
        }
        changes.validate()?;

        let caps = ctx.schema().task_capabilities(ctx.backend()).await;
        let mut payload = to_row(&changes)?;
        if !caps.visibility {
            payload.remove(IS_PUBLIC_COLUMN);
        }

        let mut conditions = owned_by(id, &user);
        if caps.soft_delete {
            conditions.push(Condition::is_null(DELETED_AT_COLUMN));
        }
        let update = Update::table(TASKS_TABLE, prepare_changes(payload)).filters(conditions);
        let updated = ctx.backend().update(&update).await?;

        let Some(row) = updated.into_iter().next() else {
            tracing::debug!(task_id = %id, user_id = %user, "Task update matched no rows");
            return Err(not_found(id));
        };
        let task: Task = decode(ENTITY, row)?;
        tracing::info!(task_id = %task.id, user_id = %user, "Task updated");
        Ok(task)
    }

    /// Move a task to another column, optionally at a new position.
    pub async fn set_status(
        ctx: &DataContext,
        id: &str,
        status: TaskStatus,
        position: Option<i32>,
    ) -> Result<Task, CoreError> {
        let changes = UpdateTask {
            status: Some(status),
            position,
            ..UpdateTask::default()
        };
        Self::update(ctx, id, &changes).await
    }

    /// Mark a task deleted. Deleting an already-deleted task succeeds and
    /// keeps the original deletion time.
    pub async fn soft_delete(ctx: &DataContext, id: &str) -> Result<(), CoreError> {
        let user = ctx.require_user().await?;
        check_id(ENTITY, id)?;
        require_soft_delete(ctx).await?;

        let mut changes = Row::new();
        changes.insert(DELETED_AT_COLUMN.into(), now());
        changes.insert("updated_at".into(), now());
        let update = Update::table(TASKS_TABLE, changes)
            .filters(owned_by(id, &user))
            .filter(Condition::is_null(DELETED_AT_COLUMN));
        let updated = ctx.backend().update(&update).await?;

        if updated.is_empty() {
            let existing = Select::from(TASKS_TABLE)
                .columns(["id"])
                .filters(owned_by(id, &user))
                .limit(1);
            if ctx.backend().select(&existing).await?.rows.is_empty() {
                return Err(not_found(id));
            }
            tracing::debug!(task_id = %id, "Task already deleted");
            return Ok(());
        }
        tracing::info!(task_id = %id, user_id = %user, "Task soft-deleted");
        Ok(())
    }

    /// Clear a task's deletion marker. Restoring a live task is a no-op
    /// that still returns it.
    pub async fn restore(ctx: &DataContext, id: &str) -> Result<Task, CoreError> {
        let user = ctx.require_user().await?;
        check_id(ENTITY, id)?;
        require_soft_delete(ctx).await?;

        let mut changes = Row::new();
        changes.insert(DELETED_AT_COLUMN.into(), Value::Null);
        changes.insert("updated_at".into(), now());
        let update = Update::table(TASKS_TABLE, changes).filters(owned_by(id, &user));
        let updated = ctx.backend().update(&update).await?;

        let Some(row) = updated.into_iter().next() else {
            return Err(not_found(id));
        };
        tracing::info!(task_id = %id, user_id = %user, "Task restored");
        decode(ENTITY, row)
    }

    /// Remove a task row for good.
    pub async fn permanently_delete(ctx: &DataContext, id: &str) -> Result<(), CoreError> {
        let user = ctx.require_user().await?;
        check_id(ENTITY, id)?;
        let delete = Delete::from(TASKS_TABLE).filters(owned_by(id, &user));
        let removed = ctx.backend().delete(&delete).await?;
        if removed == 0 {
            return Err(not_found(id));
        }
        tracing::info!(task_id = %id, user_id = %user, "Task permanently deleted");
        Ok(())
    }

    /// The caller's soft-deleted tasks, most recently deleted first.
    ///
    /// Empty when the schema has no `deleted_at` column.
    pub async fn list_deleted(ctx: &DataContext) -> Result<Vec<Task>, CoreError> {
        let user = ctx.require_user().await?;
        let caps = ctx.schema().task_capabilities(ctx.backend()).await;
        if !caps.soft_delete {
            return Ok(Vec::new());
        }

        let query = Select::from(TASKS_TABLE)
            .filter(Condition::eq("user_id", user))
            .filter(Condition::is_not_null(DELETED_AT_COLUMN))
            .order_by(DELETED_AT_COLUMN, Direction::Desc)
            .order_by("id", Direction::Asc);
        let rows = ctx.backend().select(&query).await?;
        decode_all(ENTITY, rows.rows)
    }
}

/// Conditions restricting a select to what `viewer` may see.
fn visible_to(caps: TaskCapabilities, viewer: Option<&str>) -> Vec<Condition> {
    let mut conditions = Vec::new();
    if caps.soft_delete {
        conditions.push(Condition::is_null(DELETED_AT_COLUMN));
    }
    if VisibilityMode::from_capability(caps.visibility) == VisibilityMode::Flagged {
        // A NULL flag reads as public.
        let mut visible = vec![
            Condition::eq(IS_PUBLIC_COLUMN, true),
            Condition::is_null(IS_PUBLIC_COLUMN),
        ];
        if let Some(user) = viewer {
            visible.push(Condition::eq("user_id", user));
        }
        conditions.push(Condition::any(visible));
    }
    conditions
}

async fn require_soft_delete(ctx: &DataContext) -> Result<(), CoreError> {
    if ctx
        .schema()
        .has_column(ctx.backend(), TASKS_TABLE, DELETED_AT_COLUMN)
        .await
    {
        Ok(())
    } else {
        Err(CoreError::Repository(
            "tasks.deleted_at does not exist; soft delete is unavailable".into(),
        ))
    }
}

fn not_found(id: &str) -> CoreError {
    CoreError::NotFoundOrForbidden {
        entity: ENTITY,
        id: id.to_string(),
    }
}
