use serde_json::Value;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Pull the first human-readable message out of a server `error` payload.
///
/// The API reports validation problems as `{"field": ["message", ...]}`, but
/// older endpoints send a bare string or `{"field": "message"}`.
pub fn first_error_message(error: &Value) -> Option<String> {
    match error {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_error_message),
        Value::Object(fields) => fields.values().find_map(first_error_message),
        _ => None,
    }
}

/// Like `first_error_message`, but prefer the message for `field` when present.
pub fn field_error_message(error: &Value, field: &str) -> Option<String> {
    error
        .get(field)
        .and_then(first_error_message)
        .or_else(|| first_error_message(error))
}
