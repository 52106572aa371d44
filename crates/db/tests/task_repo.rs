//! Integration tests for the task repository against the in-memory backend.
//!
//! Covers:
//! - Ownership and visibility of listings, including anonymous viewers
//! - Soft-delete, restore, idempotency and the trash listing
//! - Owner scoping of every mutation
//! - Degraded behaviour on a schema without the optional columns

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::{anonymous, as_user, current_db, legacy_db, ALICE, BOB};
use kanban_core::error::CoreError;
use kanban_core::workflow::{TaskPriority, TaskStatus};
use kanban_db::auth::{AuthSession, AuthUser, SharedSession};
use kanban_db::backend::Backend;
use kanban_db::context::DataContext;
use kanban_db::models::task::{CreateTask, UpdateTask};
use kanban_db::query::Insert;
use kanban_db::repositories::TaskRepo;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_report() -> CreateTask {
    CreateTask {
        title: "Write report".to_string(),
        status: TaskStatus::Todo,
        priority: TaskPriority::High,
        ..CreateTask::default()
    }
}

fn make_public() -> UpdateTask {
    UpdateTask {
        is_public: Some(true),
        ..UpdateTask::default()
    }
}

fn ids(tasks: &[kanban_db::models::task::Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.id.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_sets_owner_and_private_visibility() {
    let db = current_db();
    let alice = as_user(&db, ALICE);

    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();

    assert_eq!(task.title, "Write report");
    assert_eq!(task.status, TaskStatus::Todo);
    assert_eq!(task.priority, TaskPriority::High);
    assert_eq!(task.user_id.as_deref(), Some(ALICE));
    assert!(!task.is_public);
    assert!(!task.is_deleted());
    assert!(!task.id.is_empty());
}

#[tokio::test]
async fn anonymous_create_requires_auth() {
    let db = current_db();
    let result = TaskRepo::create(&anonymous(&db), &write_report()).await;

    assert_matches!(result, Err(CoreError::AuthRequired));
    assert!(db.rows("tasks").is_empty());
}

#[tokio::test]
async fn blank_title_is_a_validation_error() {
    let db = current_db();
    let result = TaskRepo::create(&as_user(&db, ALICE), &CreateTask::new("   ")).await;
    assert_matches!(result, Err(CoreError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Listing and visibility
// ---------------------------------------------------------------------------

#[tokio::test]
async fn private_tasks_are_visible_only_to_their_owner() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let bob = as_user(&db, BOB);

    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();

    assert_eq!(ids(&TaskRepo::list(&alice).await.unwrap()), vec![task.id.as_str()]);
    assert!(TaskRepo::list(&bob).await.unwrap().is_empty());
    assert!(TaskRepo::list(&anonymous(&db)).await.unwrap().is_empty());
    assert_matches!(
        TaskRepo::find(&bob, &task.id).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );

    TaskRepo::update(&alice, &task.id, &make_public()).await.unwrap();

    assert_eq!(TaskRepo::list(&bob).await.unwrap().len(), 1);
    assert_eq!(TaskRepo::list(&anonymous(&db)).await.unwrap().len(), 1);
    assert_eq!(TaskRepo::find(&bob, &task.id).await.unwrap().id, task.id);
}

#[tokio::test]
async fn moved_task_appears_under_done() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let viewer = anonymous(&db);

    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();
    let moved = TaskRepo::set_status(&alice, &task.id, TaskStatus::Done, Some(0))
        .await
        .unwrap();
    assert_eq!(moved.status, TaskStatus::Done);

    let board = TaskRepo::board(&alice).await.unwrap();
    assert_eq!(board.column(TaskStatus::Done).unwrap().tasks.len(), 1);
    assert!(board.column(TaskStatus::Todo).unwrap().tasks.is_empty());

    // Private: anonymous viewers see nothing.
    let board = TaskRepo::board(&viewer).await.unwrap();
    assert!(board.columns.iter().all(|c| c.tasks.is_empty()));

    TaskRepo::update(&alice, &task.id, &make_public()).await.unwrap();
    let board = TaskRepo::board(&viewer).await.unwrap();
    assert_eq!(board.column(TaskStatus::Done).unwrap().tasks[0].id, task.id);
}

#[tokio::test]
async fn status_moves_are_unrestricted() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();

    for status in [
        TaskStatus::Done,
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Done,
        TaskStatus::InProgress,
        TaskStatus::Todo,
    ] {
        let moved = TaskRepo::set_status(&alice, &task.id, status, None).await.unwrap();
        assert_eq!(moved.status, status);
    }
}

#[tokio::test]
async fn list_orders_by_status_then_position() {
    let db = current_db();
    let alice = as_user(&db, ALICE);

    let mut created = Vec::new();
    for (title, status, position) in [
        ("c", TaskStatus::Todo, 2),
        ("a", TaskStatus::Todo, 0),
        ("d", TaskStatus::Done, 0),
        ("b", TaskStatus::Todo, 1),
    ] {
        let draft = CreateTask {
            status,
            position: Some(position),
            ..CreateTask::new(title)
        };
        created.push(TaskRepo::create(&alice, &draft).await.unwrap());
    }

    let titles: Vec<String> = TaskRepo::list(&alice)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, vec!["d", "a", "b", "c"]);
}

// ---------------------------------------------------------------------------
// Ownership scoping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_owner_update_leaves_title_unchanged() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let bob = as_user(&db, BOB);

    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();
    TaskRepo::update(&alice, &task.id, &make_public()).await.unwrap();

    let changes = UpdateTask {
        title: Some("Hijacked".to_string()),
        ..UpdateTask::default()
    };
    let result = TaskRepo::update(&bob, &task.id, &changes).await;

    assert_matches!(
        result,
        Err(CoreError::NotFoundOrForbidden { entity: "task", ref id }) if *id == task.id
    );
    assert_eq!(TaskRepo::find(&alice, &task.id).await.unwrap().title, "Write report");
}

#[tokio::test]
async fn explicit_null_clears_optional_fields() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let draft = CreateTask {
        description: Some("old".to_string()),
        assignee: Some("Jane".to_string()),
        due_date: chrono::NaiveDate::from_ymd_opt(2026, 5, 1),
        ..write_report()
    };
    let task = TaskRepo::create(&alice, &draft).await.unwrap();

    let changes: UpdateTask =
        serde_json::from_value(json!({ "description": null, "assignee": null })).unwrap();
    let updated = TaskRepo::update(&alice, &task.id, &changes).await.unwrap();

    assert_eq!(updated.description, None);
    assert_eq!(updated.assignee, None);
    assert_eq!(updated.due_date, task.due_date, "absent fields are left alone");

    let cleared = UpdateTask {
        due_date: Some(None),
        ..UpdateTask::default()
    };
    let updated = TaskRepo::update(&alice, &task.id, &cleared).await.unwrap();
    assert_eq!(updated.due_date, None);
    assert_eq!(updated.title, "Write report");
}

#[tokio::test]
async fn non_owner_cannot_delete_or_move() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let bob = as_user(&db, BOB);
    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();

    assert_matches!(
        TaskRepo::set_status(&bob, &task.id, TaskStatus::Done, None).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
    assert_matches!(
        TaskRepo::soft_delete(&bob, &task.id).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
    assert_matches!(
        TaskRepo::permanently_delete(&bob, &task.id).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
    assert_eq!(TaskRepo::list(&alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    assert_matches!(
        TaskRepo::update(&alice, "missing", &UpdateTask::default()).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
    assert_matches!(
        TaskRepo::restore(&alice, "missing").await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
}

#[tokio::test]
async fn placeholder_ids_are_not_found_without_touching_the_backend() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    TaskRepo::create(&alice, &write_report()).await.unwrap();

    // A failing backend proves the id is rejected before any request.
    db.fail_with("invalid input syntax for type uuid");
    assert_matches!(
        TaskRepo::find(&alice, "temp-1").await,
        Err(CoreError::NotFoundOrForbidden { entity: "task", ref id }) if id == "temp-1"
    );
    assert_matches!(
        TaskRepo::set_status(&alice, "temp-1", TaskStatus::Done, None).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
    assert_matches!(
        TaskRepo::soft_delete(&alice, "temp-1").await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
    assert_matches!(
        TaskRepo::permanently_delete(&alice, "temp-1").await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
}

#[tokio::test]
async fn unowned_legacy_rows_are_read_only() {
    let db = current_db();
    let row = json!({ "title": "From before sign-in", "user_id": null, "is_public": true });
    let stored = db
        .insert(&Insert::into_table("tasks", row.as_object().cloned().unwrap()))
        .await
        .unwrap();
    let id = stored["id"].as_str().unwrap().to_string();
    let alice = as_user(&db, ALICE);

    assert_eq!(TaskRepo::list(&alice).await.unwrap().len(), 1);
    assert_matches!(
        TaskRepo::set_status(&alice, &id, TaskStatus::Done, None).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
    assert_matches!(
        TaskRepo::soft_delete(&alice, &id).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
}

#[tokio::test]
async fn mutations_without_session_require_auth() {
    let db = current_db();
    let viewer = anonymous(&db);
    assert_matches!(
        TaskRepo::update(&viewer, "x", &UpdateTask::default()).await,
        Err(CoreError::AuthRequired)
    );
    assert_matches!(TaskRepo::soft_delete(&viewer, "x").await, Err(CoreError::AuthRequired));
    assert_matches!(TaskRepo::restore(&viewer, "x").await, Err(CoreError::AuthRequired));
    assert_matches!(
        TaskRepo::permanently_delete(&viewer, "x").await,
        Err(CoreError::AuthRequired)
    );
}

#[tokio::test]
async fn expired_session_requires_auth() {
    let db = current_db();
    let session = SharedSession::default();
    session.set(Some(AuthSession {
        access_token: "stale".into(),
        refresh_token: None,
        expires_at: chrono::DateTime::from_timestamp(1, 0),
        user: AuthUser {
            id: ALICE.into(),
            email: None,
        },
    }));
    let backend: Arc<dyn Backend> = db.clone();
    let ctx = DataContext::new(backend, Arc::new(session));

    assert_matches!(
        TaskRepo::create(&ctx, &write_report()).await,
        Err(CoreError::AuthRequired)
    );
    assert!(db.rows("tasks").is_empty());
}

// ---------------------------------------------------------------------------
// Soft delete / restore
// ---------------------------------------------------------------------------

#[tokio::test]
async fn soft_delete_hides_and_restore_returns() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();

    TaskRepo::soft_delete(&alice, &task.id).await.unwrap();
    assert!(TaskRepo::list(&alice).await.unwrap().is_empty());
    assert_eq!(ids(&TaskRepo::list_deleted(&alice).await.unwrap()), vec![task.id.as_str()]);

    let restored = TaskRepo::restore(&alice, &task.id).await.unwrap();
    assert!(!restored.is_deleted());
    assert_eq!(ids(&TaskRepo::list(&alice).await.unwrap()), vec![task.id.as_str()]);
    assert!(TaskRepo::list_deleted(&alice).await.unwrap().is_empty());
}

#[tokio::test]
async fn soft_delete_is_idempotent_and_keeps_first_timestamp() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();

    TaskRepo::soft_delete(&alice, &task.id).await.unwrap();
    let first = db.rows("tasks")[0]["deleted_at"].clone();
    assert!(!first.is_null());

    TaskRepo::soft_delete(&alice, &task.id).await.unwrap();
    assert_eq!(db.rows("tasks")[0]["deleted_at"], first);
}

#[tokio::test]
async fn restore_is_idempotent() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();

    TaskRepo::restore(&alice, &task.id).await.unwrap();
    TaskRepo::soft_delete(&alice, &task.id).await.unwrap();
    TaskRepo::restore(&alice, &task.id).await.unwrap();
    let again = TaskRepo::restore(&alice, &task.id).await.unwrap();
    assert!(!again.is_deleted());
}

#[tokio::test]
async fn deleted_tasks_cannot_be_edited() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();
    TaskRepo::soft_delete(&alice, &task.id).await.unwrap();

    assert_matches!(
        TaskRepo::set_status(&alice, &task.id, TaskStatus::Done, None).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
    assert_matches!(
        TaskRepo::find(&alice, &task.id).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
}

#[tokio::test]
async fn trash_lists_most_recently_deleted_first() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let first = TaskRepo::create(&alice, &CreateTask::new("first")).await.unwrap();
    let second = TaskRepo::create(&alice, &CreateTask::new("second")).await.unwrap();

    TaskRepo::soft_delete(&alice, &first.id).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    TaskRepo::soft_delete(&alice, &second.id).await.unwrap();

    let trash = TaskRepo::list_deleted(&alice).await.unwrap();
    assert_eq!(ids(&trash), vec![second.id.as_str(), first.id.as_str()]);
    assert!(TaskRepo::list_deleted(&as_user(&db, BOB)).await.unwrap().is_empty());
}

#[tokio::test]
async fn permanent_delete_removes_the_row() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();
    TaskRepo::soft_delete(&alice, &task.id).await.unwrap();

    TaskRepo::permanently_delete(&alice, &task.id).await.unwrap();
    assert!(db.rows("tasks").is_empty());
    assert_matches!(
        TaskRepo::permanently_delete(&alice, &task.id).await,
        Err(CoreError::NotFoundOrForbidden { .. })
    );
}

#[tokio::test]
async fn update_cannot_touch_protected_columns() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();

    let changes = UpdateTask {
        title: Some("Renamed".into()),
        ..UpdateTask::default()
    };
    let updated = TaskRepo::update(&alice, &task.id, &changes).await.unwrap();
    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.user_id.as_deref(), Some(ALICE));
    assert_eq!(updated.created_at, task.created_at);
    assert!(updated.updated_at >= task.updated_at);
    assert!(updated.deleted_at.is_none());
}

// ---------------------------------------------------------------------------
// Degraded schema
// ---------------------------------------------------------------------------

#[tokio::test]
async fn legacy_schema_shows_every_task_to_everyone() {
    let db = legacy_db();
    let alice = as_user(&db, ALICE);
    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();
    assert!(task.is_public);

    assert_eq!(TaskRepo::list(&as_user(&db, BOB)).await.unwrap().len(), 1);
    assert_eq!(TaskRepo::list(&anonymous(&db)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn legacy_schema_cannot_soft_delete() {
    let db = legacy_db();
    let alice = as_user(&db, ALICE);
    let task = TaskRepo::create(&alice, &write_report()).await.unwrap();

    assert_matches!(
        TaskRepo::soft_delete(&alice, &task.id).await,
        Err(CoreError::Repository(_))
    );
    assert!(TaskRepo::list_deleted(&alice).await.unwrap().is_empty());
    // Visibility edits are dropped rather than failing.
    TaskRepo::update(&alice, &task.id, &make_public()).await.unwrap();
    TaskRepo::permanently_delete(&alice, &task.id).await.unwrap();
}

#[tokio::test]
async fn backend_failures_surface_as_repository_errors() {
    let db = current_db();
    let alice = as_user(&db, ALICE);
    TaskRepo::create(&alice, &write_report()).await.unwrap();
    // Prime the capability memo so the failure hits the listing itself.
    TaskRepo::list(&alice).await.unwrap();

    db.fail_with("connection reset");
    assert_matches!(
        TaskRepo::list(&alice).await,
        Err(CoreError::Repository(msg)) if msg.contains("connection reset")
    );
    db.recover();
    assert_eq!(TaskRepo::list(&alice).await.unwrap().len(), 1);
}
