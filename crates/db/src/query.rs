//! Backend-neutral description of the queries the repositories issue.
//!
//! The hosted service exposes row-filtered select/insert/update/delete with
//! equality, range, substring and array predicates plus exact counts. The
//! types here describe exactly that surface; each [`Backend`] translates
//! them into its own wire form.
//!
//! [`Backend`]: crate::backend::Backend

use serde_json::Value;

/// A single row as a JSON object keyed by column name.
pub type Row = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// A `WHERE` predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`. A `Null` value means `column IS NULL`.
    Eq { column: String, value: Value },
    /// `column IN (values...)`.
    In { column: String, values: Vec<Value> },
    IsNull { column: String },
    IsNotNull { column: String },
    /// Case-insensitive substring match. `needle` is the raw user text;
    /// backends escape pattern metacharacters themselves.
    ILike { column: String, needle: String },
    /// Array column contains `value`.
    Contains { column: String, value: String },
    /// Array column shares at least one element with `values`.
    Overlaps { column: String, values: Vec<String> },
    /// Any of the nested conditions holds. An empty group matches nothing.
    Any(Vec<Condition>),
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Condition::IsNull {
            column: column.into(),
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Condition::IsNotNull {
            column: column.into(),
        }
    }

    pub fn ilike(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Condition::ILike {
            column: column.into(),
            needle: needle.into(),
        }
    }

    pub fn contains(column: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Contains {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn overlaps(column: impl Into<String>, values: Vec<String>) -> Self {
        Condition::Overlaps {
            column: column.into(),
            values,
        }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Any(conditions)
    }

    /// Every column this condition references, nested groups included.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Condition::Eq { column, .. }
            | Condition::In { column, .. }
            | Condition::IsNull { column }
            | Condition::IsNotNull { column }
            | Condition::ILike { column, .. }
            | Condition::Contains { column, .. }
            | Condition::Overlaps { column, .. } => vec![column.as_str()],
            Condition::Any(inner) => inner.iter().flat_map(|c| c.columns()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// Offset/limit window over the ordered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// `SELECT` over one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    /// `None` selects every column.
    pub columns: Option<Vec<String>>,
    pub conditions: Vec<Condition>,
    pub order: Vec<Order>,
    pub window: Option<Window>,
    /// Request the exact number of matching rows, ignoring the window.
    pub count: bool,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: None,
            conditions: Vec::new(),
            order: Vec::new(),
            window: None,
            count: false,
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn filters(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push(Order {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn range(mut self, offset: u64, limit: u64) -> Self {
        self.window = Some(Window { offset, limit });
        self
    }

    pub fn limit(self, limit: u64) -> Self {
        self.range(0, limit)
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }
}

/// `INSERT` of a single row, returning the stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub row: Row,
}

impl Insert {
    pub fn into_table(table: impl Into<String>, row: Row) -> Self {
        Self {
            table: table.into(),
            row,
        }
    }
}

/// `UPDATE` of every row matching `conditions`, returning the updated rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub changes: Row,
    pub conditions: Vec<Condition>,
}

impl Update {
    pub fn table(table: impl Into<String>, changes: Row) -> Self {
        Self {
            table: table.into(),
            changes,
            conditions: Vec::new(),
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn filters(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }
}

/// `DELETE` of every row matching `conditions`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub conditions: Vec<Condition>,
}

impl Delete {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
        }
    }

    pub fn filters(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }
}

/// Result of a [`Select`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub rows: Vec<Value>,
    /// Exact match count, present when the select asked for it.
    pub total: Option<u64>,
}
