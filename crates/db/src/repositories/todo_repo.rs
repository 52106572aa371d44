//! Repository for the `todos` table.

use kanban_core::access::{self, VisibilityMode};
use kanban_core::error::CoreError;
use kanban_core::pagination::{Page, PageRequest};
use kanban_core::search::normalize_search;
use kanban_core::tags::{normalize_tag_name, normalize_tag_names};
use kanban_core::types::UserId;
use serde_json::{json, Value};
use validator::Validate;

use super::{check_id, decode, decode_all, owned_by, prepare_changes, to_row, trim_title};
use crate::capabilities::{TodoCapabilities, IS_PUBLIC_COLUMN, TAGS_COLUMN, TODOS_TABLE};
use crate::context::DataContext;
use crate::models::todo::{CreateTodo, Todo, TodoFilters, TodoStats, UpdateTodo};
use crate::query::{Condition, Delete, Direction, Insert, Row, Select, Update};
use crate::repositories::TagRepo;

const ENTITY: &str = "todo";

/// Provides CRUD, filtering and pagination for todos.
pub struct TodoRepo;

impl TodoRepo {
    /// One page of the todos the caller can see, newest first.
    ///
    /// Visibility is applied before the search, completion and tag filters.
    /// In legacy mode (no visibility column) anonymous viewers see nothing.
    pub async fn list(ctx: &DataContext, filters: &TodoFilters) -> Result<Page<Todo>, CoreError> {
        let request = PageRequest::new(filters.page, filters.page_size)?;
        let viewer = ctx.current_user().await;
        let caps = ctx.schema().todo_capabilities(ctx.backend()).await;

        let Some(conditions) = list_conditions(caps, viewer.as_deref(), filters) else {
            return Ok(Page::empty(request));
        };

        let query = Select::from(TODOS_TABLE)
            .filters(conditions)
            .order_by("created_at", Direction::Desc)
            .order_by("id", Direction::Asc)
            .range(request.offset(), request.limit())
            .with_count();
        let rows = ctx.backend().select(&query).await?;

        let total = rows.total.unwrap_or(rows.rows.len() as u64);
        let items: Vec<Todo> = decode_all(ENTITY, rows.rows)?;
        tracing::debug!(page = request.page(), items = items.len(), total, "Listed todos");
        Ok(Page::new(items, total, request))
    }

    /// Create a todo owned by the current session.
    ///
    /// Unknown tag names are created first so the todo never references a
    /// tag that does not exist.
    pub async fn create(ctx: &DataContext, draft: &CreateTodo) -> Result<Todo, CoreError> {
        let user = ctx.require_user().await?;
        let mut draft = draft.clone();
        trim_title(&mut draft.title);
        draft.validate()?;

        let caps = ctx.schema().todo_capabilities(ctx.backend()).await;
        let mut row = Row::new();
        row.insert("user_id".into(), json!(user));
        row.insert("title".into(), json!(draft.title));
        row.insert("description".into(), json!(draft.description));
        row.insert("completed".into(), json!(draft.completed));
        if caps.visibility {
            row.insert(IS_PUBLIC_COLUMN.into(), json!(draft.is_public.unwrap_or(false)));
        }
        if caps.tags {
            let tags = normalize_tag_names(&draft.tags);
            TagRepo::create_if_missing(ctx, &tags).await?;
            row.insert(TAGS_COLUMN.into(), json!(tags));
        }

        let stored = ctx
            .backend()
            .insert(&Insert::into_table(TODOS_TABLE, row))
            .await?;
        let todo: Todo = decode(ENTITY, stored)?;
        tracing::info!(todo_id = %todo.id, user_id = %user, "Todo created");
        Ok(todo)
    }

    /// Apply `changes` to a todo the caller owns.
    pub async fn update(
        ctx: &DataContext,
        id: &str,
        changes: &UpdateTodo,
    ) -> Result<Todo, CoreError> {
        let user = ctx.require_user().await?;
        check_id(ENTITY, id)?;
        let mut changes = changes.clone();
        if let Some(title) = changes.title.as_mut() {
            trim_title(title);
        }
        changes.validate()?;

        let caps = ctx.schema().todo_capabilities(ctx.backend()).await;
        let mut payload = to_row(&changes)?;
        if !caps.visibility {
            payload.remove(IS_PUBLIC_COLUMN);
        }
        payload.remove(TAGS_COLUMN);
        if let (true, Some(tags)) = (caps.tags, changes.tags.as_ref()) {
            let tags = normalize_tag_names(tags);
            TagRepo::create_if_missing(ctx, &tags).await?;
            payload.insert(TAGS_COLUMN.into(), json!(tags));
        }

        let update = Update::table(TODOS_TABLE, prepare_changes(payload)).filters(owned_by(id, &user));
        let updated = ctx.backend().update(&update).await?;
        let Some(row) = updated.into_iter().next() else {
            return Err(not_found(id));
        };
        let todo: Todo = decode(ENTITY, row)?;
        tracing::info!(todo_id = %todo.id, user_id = %user, "Todo updated");
        Ok(todo)
    }

    pub async fn toggle_completed(
        ctx: &DataContext,
        id: &str,
        completed: bool,
    ) -> Result<Todo, CoreError> {
        let changes = UpdateTodo {
            completed: Some(completed),
            ..UpdateTodo::default()
        };
        Self::update(ctx, id, &changes).await
    }

    /// Hard-delete a todo the caller owns.
    pub async fn delete(ctx: &DataContext, id: &str) -> Result<(), CoreError> {
        let user = ctx.require_user().await?;
        check_id(ENTITY, id)?;
        let removed = ctx
            .backend()
            .delete(&Delete::from(TODOS_TABLE).filters(owned_by(id, &user)))
            .await?;
        if removed == 0 {
            return Err(not_found(id));
        }
        tracing::info!(todo_id = %id, user_id = %user, "Todo deleted");
        Ok(())
    }

    /// Whether the current session owns the todo. Any failure reads as
    /// `false`.
    pub async fn can_modify(ctx: &DataContext, id: &str) -> bool {
        let Some(viewer) = ctx.current_user().await else {
            return false;
        };
        if check_id(ENTITY, id).is_err() {
            return false;
        }
        let query = Select::from(TODOS_TABLE)
            .columns(["user_id"])
            .filter(Condition::eq("id", id))
            .limit(1);
        match ctx.backend().select(&query).await {
            Ok(rows) => {
                let owner = rows
                    .rows
                    .first()
                    .and_then(|row| row.get("user_id"))
                    .and_then(Value::as_str);
                access::can_modify(owner, Some(viewer.as_str()))
            }
            Err(e) => {
                tracing::warn!(todo_id = %id, error = %e, "Ownership lookup failed");
                false
            }
        }
    }

    /// Total, completed and pending counts for the caller's own todos.
    pub async fn stats(ctx: &DataContext) -> Result<TodoStats, CoreError> {
        let user = ctx.require_user().await?;
        let total = count_owned(ctx, &user, None).await?;
        let completed = count_owned(ctx, &user, Some(true)).await?;
        Ok(TodoStats {
            total,
            completed,
            pending: total.saturating_sub(completed),
        })
    }
}

/// Filters for a list request. `None` means the viewer can see nothing.
fn list_conditions(
    caps: TodoCapabilities,
    viewer: Option<&str>,
    filters: &TodoFilters,
) -> Option<Vec<Condition>> {
    let mut conditions = Vec::new();

    match (VisibilityMode::from_capability(caps.visibility), viewer) {
        (VisibilityMode::Flagged, Some(user)) => conditions.push(Condition::any(vec![
            Condition::eq("user_id", user),
            Condition::eq(IS_PUBLIC_COLUMN, true),
        ])),
        (VisibilityMode::Flagged, None) => conditions.push(Condition::eq(IS_PUBLIC_COLUMN, true)),
        (VisibilityMode::Legacy, Some(_)) => {}
        (VisibilityMode::Legacy, None) => return None,
    }

    if filters.only_mine {
        conditions.push(Condition::eq("user_id", viewer?));
    }
    if let Some(completed) = filters.completed.as_completed() {
        conditions.push(Condition::eq("completed", completed));
    }
    if let Some(term) = normalize_search(filters.search.as_deref()) {
        let mut any = vec![
            Condition::ilike("title", term.clone()),
            Condition::ilike("description", term.clone()),
        ];
        if caps.tags {
            any.push(Condition::contains(TAGS_COLUMN, normalize_tag_name(&term)));
        }
        conditions.push(Condition::any(any));
    }
    if caps.tags {
        let tags = normalize_tag_names(&filters.tag_names);
        if !tags.is_empty() {
            conditions.push(Condition::overlaps(TAGS_COLUMN, tags));
        }
    }
    Some(conditions)
}

async fn count_owned(
    ctx: &DataContext,
    user: &UserId,
    completed: Option<bool>,
) -> Result<u64, CoreError> {
    let mut query = Select::from(TODOS_TABLE)
        .columns(["id"])
        .filter(Condition::eq("user_id", user.as_str()))
        .limit(0)
        .with_count();
    if let Some(completed) = completed {
        query = query.filter(Condition::eq("completed", completed));
    }
    let rows = ctx.backend().select(&query).await?;
    rows.total
        .ok_or_else(|| CoreError::Repository("count was not returned".into()))
}

fn not_found(id: &str) -> CoreError {
    CoreError::NotFoundOrForbidden {
        entity: ENTITY,
        id: id.to_string(),
    }
}
