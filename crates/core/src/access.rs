//! Visibility and ownership rules.
//!
//! These are the in-process form of the filters the repositories push
//! down to the database. Rows without an owner (created before sign-in
//! existed) can be read but never modified through this layer.

/// How visibility is decided for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityMode {
    /// The table has a visibility column: owners see their rows, everyone
    /// sees public rows.
    Flagged,
    /// The visibility column does not exist yet: any authenticated session
    /// sees every row.
    Legacy,
}

impl VisibilityMode {
    pub fn from_capability(has_visibility_column: bool) -> Self {
        if has_visibility_column {
            VisibilityMode::Flagged
        } else {
            VisibilityMode::Legacy
        }
    }
}

/// Whether `viewer` owns a row owned by `owner`.
pub fn is_owner(owner: Option<&str>, viewer: Option<&str>) -> bool {
    matches!((owner, viewer), (Some(o), Some(v)) if o == v)
}

/// Whether `viewer` may modify a row owned by `owner`.
///
/// Requires a session that matches a non-null owner.
pub fn can_modify(owner: Option<&str>, viewer: Option<&str>) -> bool {
    is_owner(owner, viewer)
}

/// Whether `viewer` may see a todo.
pub fn can_view_todo(
    mode: VisibilityMode,
    owner: Option<&str>,
    is_public: Option<bool>,
    viewer: Option<&str>,
) -> bool {
    if is_owner(owner, viewer) {
        return true;
    }
    match mode {
        VisibilityMode::Flagged => is_public == Some(true),
        VisibilityMode::Legacy => viewer.is_some(),
    }
}

/// Whether `viewer` may see a task.
///
/// Differs from todos in legacy mode: the board predates sign-in, so every
/// viewer (including anonymous ones) sees every task.
pub fn can_view_task(
    mode: VisibilityMode,
    owner: Option<&str>,
    is_public: bool,
    viewer: Option<&str>,
) -> bool {
    match mode {
        VisibilityMode::Flagged => is_public || is_owner(owner, viewer),
        VisibilityMode::Legacy => true,
    }
}
