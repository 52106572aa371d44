//! Tag name normalisation and the shared colour palette.
//!
//! Tag names are global: `"Work"`, `" work "` and `"WORK"` all refer to the
//! single tag `"work"`.

use rand::Rng;

/// Colours assigned to lazily created tags.
pub const TAG_PALETTE: [&str; 8] = [
    "#3b82f6", "#ef4444", "#10b981", "#f59e0b", "#8b5cf6", "#6b7280", "#ec4899", "#06b6d4",
];

/// Icon given to tags created without one.
pub const DEFAULT_TAG_ICON: &str = "🏷️";

/// Colour used to render a tag name that has no stored tag row.
pub const UNKNOWN_TAG_COLOR: &str = "#6b7280";

/// Maximum length of a normalised tag name.
pub const MAX_TAG_NAME_LEN: u64 = 50;

/// A built-in tag definition, used when the tag table cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinTag {
    pub name: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
}

/// Fixed palette a caller may display when listing tags fails.
pub const FALLBACK_TAGS: [BuiltinTag; 8] = [
    BuiltinTag { name: "youtube", color: "#ff0000", icon: "📺" },
    BuiltinTag { name: "facebook", color: "#1877f2", icon: "📘" },
    BuiltinTag { name: "book", color: "#8b5cf6", icon: "📚" },
    BuiltinTag { name: "anime", color: "#f59e0b", icon: "🎌" },
    BuiltinTag { name: "read", color: "#10b981", icon: "📖" },
    BuiltinTag { name: "watch", color: "#ef4444", icon: "👀" },
    BuiltinTag { name: "learn", color: "#3b82f6", icon: "🎓" },
    BuiltinTag { name: "work", color: "#6b7280", icon: "💼" },
];

/// Normalise a single tag name: trim surrounding whitespace and lowercase.
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalise a list of tag names.
///
/// Names are case-folded, blanks are dropped and duplicates removed while
/// keeping first-seen order.
pub fn normalize_tag_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let normalized = normalize_tag_name(name.as_ref());
        if !normalized.is_empty() && !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

/// Pick a pseudo-random colour from [`TAG_PALETTE`].
pub fn random_tag_color() -> &'static str {
    let idx = rand::rng().random_range(0..TAG_PALETTE.len());
    TAG_PALETTE[idx]
}

/// Whether `color` is a `#rrggbb` hex colour.
pub fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}
