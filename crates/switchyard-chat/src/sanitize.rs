//! Input normalization for queries and thread ids.

use uuid::Uuid;

use crate::error::ValidationError;

/// Collapse whitespace and cap the length. Empty input is rejected.
pub fn sanitize_query(raw: &str, max_chars: usize) -> Result<String, ValidationError> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    Ok(match collapsed.char_indices().nth(max_chars) {
        Some((idx, _)) => collapsed[..idx].trim_end().to_string(),
        None => collapsed,
    })
}

/// Keep `[A-Za-z0-9_-]` up to `max_chars`; generate a fresh id when nothing
/// usable remains.
pub fn sanitize_thread_id(raw: Option<&str>, max_chars: usize) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(max_chars)
        .collect();
    if cleaned.is_empty() {
        new_thread_id()
    } else {
        cleaned
    }
}

pub fn new_thread_id() -> String {
    format!("thread_{}", Uuid::new_v4().simple())
}
