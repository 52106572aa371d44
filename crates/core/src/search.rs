//! Search-term helpers for the todo list.

/// Maximum length of a search term; longer input is truncated.
pub const MAX_SEARCH_LEN: usize = 200;

/// Trim a user-supplied search term.
///
/// Returns `None` when nothing remains, so callers skip the filter
/// entirely instead of matching everything.
pub fn normalize_search(term: Option<&str>) -> Option<String> {
    let trimmed = term?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_SEARCH_LEN).collect())
}

/// Escape `LIKE` metacharacters so the term matches literally.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Case-insensitive substring match, the in-process twin of `ILIKE '%term%'`.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
