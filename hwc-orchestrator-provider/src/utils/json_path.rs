//! Dotted-path helpers over `serde_json::Value`.
//!
//! Paths are `.`-separated keys; a segment that parses as an integer indexes
//! into an array (`sources.0.ip_or_domain`).

use serde_json::{Map, Value};

/// Look up `path` inside `value`. An empty path returns `value` itself.
pub fn search<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Look up a path inside an object map.
pub fn search_map<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let first = map.get(head)?;
    match rest {
        Some(rest) => search(first, rest),
        None => Some(first),
    }
}

/// Insert `leaf` at a dotted path, creating intermediate objects.
///
/// Existing non-object values on the way are replaced.
pub fn insert(root: &mut Map<String, Value>, path: &str, leaf: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = root;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), leaf);
            return;
        }
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
}

/// Render an identifier or status value as a string.
///
/// Strings are returned as-is (empty strings are treated as absent), integers
/// print without a fractional part even when encoded as floats (`7.0` → `"7"`).
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < 9.0e15 {
                        #[allow(clippy::cast_possible_truncation)]
                        let whole = f as i64;
                        whole.to_string()
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `search` followed by [`scalar_to_string`].
pub fn search_string(value: &Value, path: &str) -> Option<String> {
    search(value, path).and_then(scalar_to_string)
}
