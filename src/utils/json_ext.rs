//! JSON manipulation helpers backing the JSON processor node: deep merge
//! and dotted-path access.
//!
//! Paths address into a value with `.`-separated segments; a segment that
//! parses as an index addresses into an array (`items.0.name`). A leading
//! `$.` prefix is tolerated for authoring tools that emit JSONPath-style
//! roots.

use serde_json::{Map, Value};

/// Recursive object union. Objects merge key-by-key; on any other shape
/// conflict the right side wins.
pub fn deep_merge(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Object(left_obj), Value::Object(right_obj)) => {
            let mut result: Map<String, Value> = left_obj.clone();
            for (key, right_value) in right_obj {
                let merged = match left_obj.get(key) {
                    Some(left_value) => deep_merge(left_value, right_value),
                    None => right_value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Value::Object(result)
        }
        (_, replacement) => replacement.clone(),
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.strip_prefix("$.").unwrap_or(path);
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    trimmed.split('.').filter(|segment| !segment.is_empty())
}

/// Read the value at a dotted path. `None` when any segment is missing or
/// addresses into a non-container.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments(path) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Replace the value at a dotted path in place. Errors name the failing
/// segment so processor nodes can surface them verbatim.
pub fn set_path(value: &mut Value, path: &str, replacement: Value) -> Result<(), String> {
    let parts: Vec<&str> = segments(path).collect();
    if parts.is_empty() {
        return Err("empty path".to_string());
    }
    let mut current = value;
    for (position, segment) in parts.iter().enumerate() {
        let last = position == parts.len() - 1;
        match current {
            Value::Object(map) => {
                if last {
                    map.insert((*segment).to_string(), replacement);
                    return Ok(());
                }
                current = map
                    .get_mut(*segment)
                    .ok_or_else(|| format!("path segment not found: {segment}"))?;
            }
            Value::Array(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| format!("array segment must be an index: {segment}"))?;
                let slot = items
                    .get_mut(index)
                    .ok_or_else(|| format!("array index out of range: {index}"))?;
                if last {
                    *slot = replacement;
                    return Ok(());
                }
                current = slot;
            }
            _ => return Err(format!("cannot descend into scalar at segment: {segment}")),
        }
    }
    unreachable!("loop returns on the last segment");
}
