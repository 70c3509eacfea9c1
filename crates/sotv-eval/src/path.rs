/// Navigate a dotted field path (`a.b.0.c`) through a parsed document.
/// Numeric segments index into sequences.
pub fn lookup_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(arr) => {
                let idx: usize = segment.parse().ok()?;
                arr.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Numeric view of a field value. Accepts JSON numbers and numeric strings
/// (with an optional trailing `%`), since percentage fields appear both ways
/// in the wild.
pub fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigates_nested_objects_and_arrays() {
        let doc = serde_json::json!({"a": {"b": [{"c": 42}]}});
        assert_eq!(lookup_path(&doc, "a.b.0.c"), Some(&serde_json::json!(42)));
        assert_eq!(lookup_path(&doc, "a.b.1.c"), None);
        assert_eq!(lookup_path(&doc, "a.missing"), None);
        assert_eq!(lookup_path(&doc, "a.b.x"), None);
    }

    #[test]
    fn numeric_views() {
        assert_eq!(as_number(&serde_json::json!(40)), Some(40.0));
        assert_eq!(as_number(&serde_json::json!("25.5")), Some(25.5));
        assert_eq!(as_number(&serde_json::json!("15%")), Some(15.0));
        assert_eq!(as_number(&serde_json::json!(true)), None);
    }
}
