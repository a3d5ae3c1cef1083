use serde_json::Value;

/// Turn a JSON object of filter parameters into query pairs.
///
/// Blank values, the literal string `"undefined"` and nulls (JSON `null` or
/// the string `"null"`) are dropped, so a filter form can pass its whole
/// state without clearing unused fields. Arrays are joined with commas.
/// Anything other than an object yields no pairs.
pub fn clean_query(params: &Value) -> Vec<(String, String)> {
    let Some(map) = params.as_object() else {
        return Vec::new();
    };

    map.iter()
        .filter_map(|(key, value)| {
            let rendered = render(value)?;
            let trimmed = rendered.trim();
            if trimmed.is_empty() || trimmed == "undefined" || trimmed == "null" {
                return None;
            }
            Some((key.clone(), rendered))
        })
        .collect()
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Object(_) => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(render)
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}
