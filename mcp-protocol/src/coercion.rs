//! Parameter coercion, the first step of C6 (§4.6, §9 "coercion as a
//! boundary concern"). Every component below the dispatcher sees already-typed
//! values — this is the only place that accepts "true"/1/"yes" as a bool.

use serde_json::{Map, Value};

/// Accepts a native bool, or a string/number form of
/// `{true/false, 1/0, yes/no, on/off}` (case-insensitive).
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => {
            if n.as_i64() == Some(1) {
                Some(true)
            } else if n.as_i64() == Some(0) {
                Some(false)
            } else {
                None
            }
        }
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Accepts a native array, a JSON-encoded array string, a comma-separated
/// string, or a single scalar (becomes a one-element list).
pub fn coerce_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => {
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(s) {
                return items;
            }
            if s.contains(',') {
                return s.split(',').map(|part| Value::String(part.trim().to_string())).collect();
            }
            if s.trim().is_empty() {
                return Vec::new();
            }
            vec![Value::String(s.clone())]
        }
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Accepts a native map, or a JSON-encoded object string.
pub fn coerce_json_object(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// Reads `params[field]` as a string list via [`coerce_list`], dropping any
/// non-string elements.
pub fn coerce_string_list(params: &Map<String, Value>, field: &str) -> Vec<String> {
    match params.get(field) {
        Some(v) => coerce_list(v)
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                other => other.as_str().map(str::to_string),
            })
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bool_accepts_native_and_string_forms() {
        assert_eq!(coerce_bool(&json!(true)), Some(true));
        assert_eq!(coerce_bool(&json!("YES")), Some(true));
        assert_eq!(coerce_bool(&json!("off")), Some(false));
        assert_eq!(coerce_bool(&json!(1)), Some(true));
        assert_eq!(coerce_bool(&json!(0)), Some(false));
        assert_eq!(coerce_bool(&json!("maybe")), None);
    }

    #[test]
    fn list_accepts_every_shape() {
        assert_eq!(coerce_list(&json!(["a", "b"])), vec![json!("a"), json!("b")]);
        assert_eq!(coerce_list(&json!("[\"a\",\"b\"]")), vec![json!("a"), json!("b")]);
        assert_eq!(coerce_list(&json!("a,b, c")), vec![json!("a"), json!("b"), json!("c")]);
        assert_eq!(coerce_list(&json!("solo")), vec![json!("solo")]);
        assert_eq!(coerce_list(&Value::Null), Vec::<Value>::new());
    }

    #[test]
    fn json_object_accepts_native_map_and_string() {
        let native = json!({"a": 1});
        assert_eq!(coerce_json_object(&native), native.as_object().cloned());
        let encoded = json!("{\"a\":1}");
        assert_eq!(coerce_json_object(&encoded), native.as_object().cloned());
        assert_eq!(coerce_json_object(&json!("not json")), None);
    }

    #[test]
    fn string_list_drops_non_strings() {
        let mut params = Map::new();
        params.insert("assignee_ids".to_string(), json!("a,b"));
        assert_eq!(coerce_string_list(&params, "assignee_ids"), vec!["a".to_string(), "b".to_string()]);
        assert!(coerce_string_list(&params, "missing").is_empty());
    }
}
