//! Repository for the shared `todo_tags` vocabulary.

use kanban_core::error::CoreError;
use kanban_core::tags::{normalize_tag_name, normalize_tag_names, random_tag_color, DEFAULT_TAG_ICON};
use serde_json::{json, Value};
use validator::Validate;

use super::{decode, decode_all};
use crate::capabilities::TAGS_TABLE;
use crate::context::DataContext;
use crate::models::tag::{CreateTag, Tag};
use crate::query::{Condition, Direction, Insert, Row, Select};

const ENTITY: &str = "tag";

/// Provides lookup and lazy creation of tags.
pub struct TagRepo;

impl TagRepo {
    /// Every known tag, ordered by name.
    pub async fn list_all(ctx: &DataContext) -> Result<Vec<Tag>, CoreError> {
        let query = Select::from(TAGS_TABLE).order_by("name", Direction::Asc);
        let rows = ctx.backend().select(&query).await?;
        decode_all(ENTITY, rows.rows)
    }

    /// Create the tags in `names` that do not exist yet.
    ///
    /// Names are case-folded and de-duplicated first. Inserts skip names
    /// that appear concurrently, so racing callers both succeed. Returns only
    /// the tags this call created.
    pub async fn create_if_missing<S: AsRef<str>>(
        ctx: &DataContext,
        names: &[S],
    ) -> Result<Vec<Tag>, CoreError> {
        let names = normalize_tag_names(names);
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let lookup = Select::from(TAGS_TABLE)
            .columns(["name"])
            .filter(Condition::is_in("name", names.iter().cloned()));
        let existing: Vec<String> = ctx
            .backend()
            .select(&lookup)
            .await?
            .rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str).map(str::to_string))
            .collect();

        let mut created = Vec::new();
        for name in names.iter().filter(|n| !existing.contains(n)) {
            let mut row = Row::new();
            row.insert("name".into(), json!(name));
            row.insert("color".into(), json!(random_tag_color()));
            row.insert("icon".into(), json!(DEFAULT_TAG_ICON));
            let stored = ctx
                .backend()
                .insert_if_absent(&Insert::into_table(TAGS_TABLE, row), "name")
                .await?;
            // `None`: another session created the tag since the lookup.
            if let Some(stored) = stored {
                created.push(decode::<Tag>(ENTITY, stored)?);
            }
        }

        if !created.is_empty() {
            tracing::info!(count = created.len(), "Created missing tags");
        }
        Ok(created)
    }

    /// Explicitly create one tag. Requires a session.
    pub async fn create(ctx: &DataContext, input: &CreateTag) -> Result<Tag, CoreError> {
        let user = ctx.require_user().await?;
        let mut input = input.clone();
        input.name = normalize_tag_name(&input.name);
        input.validate()?;

        let color = match input.color.as_deref() {
            Some(color) => color,
            None => random_tag_color(),
        };

        let mut row = Row::new();
        row.insert("name".into(), json!(input.name));
        row.insert("color".into(), json!(color));
        row.insert(
            "icon".into(),
            json!(input.icon.as_deref().unwrap_or(DEFAULT_TAG_ICON)),
        );

        let stored = ctx
            .backend()
            .insert(&Insert::into_table(TAGS_TABLE, row))
            .await?;
        let tag: Tag = decode(ENTITY, stored)?;
        tracing::info!(tag_id = %tag.id, name = %tag.name, user_id = %user, "Tag created");
        Ok(tag)
    }
}
