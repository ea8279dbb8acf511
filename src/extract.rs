//! Field extraction over loosely-shaped JSON responses.
//!
//! The upstream API has accumulated several response shapes over the years
//! (legacy flat fields, GraphQL nesting, camelCase vs snake_case). Callers
//! hand `pick` an ordered list of dot-separated candidate paths; the first
//! path that resolves to a present, non-null value wins. Traversal through a
//! missing intermediate node yields `None`, never an error.

use serde_json::Value;

/// Resolve `path` ("a.b.c") against `value`. `None` if any segment is absent
/// or the final node is JSON null.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = value;
    for segment in path.split('.') {
        node = node.get(segment)?;
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

/// Try each candidate path in order; first present value wins.
pub fn pick<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|p| get_path(value, p))
}

pub fn pick_str(value: &Value, paths: &[&str]) -> Option<String> {
    pick(value, paths).and_then(Value::as_str).map(str::to_string)
}

/// Numeric fields sometimes arrive as JSON strings; accept both.
pub fn pick_i64(value: &Value, paths: &[&str]) -> Option<i64> {
    let node = pick(value, paths)?;
    node.as_i64()
        .or_else(|| node.as_str().and_then(|s| s.parse().ok()))
}

pub fn pick_i64_or(value: &Value, paths: &[&str], default: i64) -> i64 {
    pick_i64(value, paths).unwrap_or(default)
}

pub fn pick_bool(value: &Value, paths: &[&str]) -> Option<bool> {
    pick(value, paths).and_then(Value::as_bool)
}

pub fn pick_array<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Vec<Value>> {
    pick(value, paths).and_then(Value::as_array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "raw": {
                "result": {
                    "legacy": { "idStr": "123", "favoriteCount": 7, "gone": null }
                }
            },
            "favorite_count": "42",
            "flag": true,
            "items": [1, 2]
        })
    }

    #[test]
    fn first_present_path_wins() {
        let v = sample();
        let picked = pick(&v, &["missing.deep", "raw.result.legacy.idStr"]).unwrap();
        assert_eq!(picked, "123");
    }

    #[test]
    fn missing_intermediate_is_absent_not_error() {
        let v = sample();
        assert!(get_path(&v, "raw.result.nope.idStr").is_none());
        assert!(pick(&v, &["a.b.c", "x.y"]).is_none());
    }

    #[test]
    fn null_counts_as_absent() {
        let v = sample();
        assert!(get_path(&v, "raw.result.legacy.gone").is_none());
    }

    #[test]
    fn numeric_string_parses() {
        let v = sample();
        assert_eq!(pick_i64(&v, &["favorite_count"]), Some(42));
        assert_eq!(pick_i64(&v, &["raw.result.legacy.favoriteCount"]), Some(7));
        assert_eq!(pick_i64_or(&v, &["nope"], 0), 0);
    }

    #[test]
    fn typed_helpers() {
        let v = sample();
        assert_eq!(pick_bool(&v, &["flag"]), Some(true));
        assert_eq!(pick_array(&v, &["items"]).unwrap().len(), 2);
        assert!(pick_str(&v, &["flag"]).is_none());
    }
}
