// ============================================================================
// spark-store - Nested Value Access
// Keypath reads and auto-vivifying writes over serde_json::Value
// ============================================================================

use serde_json::{Map, Value};

use super::keypath::{RAW_LENGTH, SEPARATOR};

/// Read a nested value by keypath.
///
/// Objects resolve name segments, arrays resolve numeric segments, and the
/// `length` pseudo-segment reads the element count of arrays and the character
/// count of strings. Returns `None` when any segment is absent.
pub fn get(source: &Value, keypath: &str) -> Option<Value> {
    let mut current = source;
    let mut segments = keypath.split(SEPARATOR).peekable();

    while let Some(segment) = segments.next() {
        match current {
            Value::Object(map) => {
                current = map.get(segment)?;
            }
            Value::Array(items) => {
                if segment == RAW_LENGTH {
                    // length is terminal, it has no children of its own
                    return if segments.peek().is_none() {
                        Some(Value::from(items.len()))
                    } else {
                        None
                    };
                }
                let index: usize = segment.parse().ok()?;
                current = items.get(index)?;
            }
            Value::String(text) => {
                return if segment == RAW_LENGTH && segments.peek().is_none() {
                    Some(Value::from(text.chars().count()))
                } else {
                    None
                };
            }
            _ => return None,
        }
    }

    Some(current.clone())
}

/// Write a nested value by keypath, auto-vivifying intermediate containers.
///
/// A missing intermediate becomes an array when the next segment is numeric,
/// an object otherwise. A scalar standing in the way is replaced. Array writes
/// pad with `Null` up to the target index; non-numeric segments against an
/// array are dropped silently.
pub fn set(target: &mut Value, keypath: &str, value: Value) {
    let segments: Vec<&str> = keypath.split(SEPARATOR).collect();
    let mut current = target;

    for (position, segment) in segments.iter().enumerate() {
        let last = position == segments.len() - 1;

        // Scalars in the path give way to a fresh container
        if !current.is_object() && !current.is_array() {
            *current = empty_container(segment);
        }

        match current {
            Value::Object(map) => {
                if last {
                    map.insert((*segment).to_string(), value);
                    return;
                }
                let next = segments[position + 1];
                current = map
                    .entry((*segment).to_string())
                    .or_insert_with(|| empty_container(next));
            }
            Value::Array(items) => {
                let Ok(index) = segment.parse::<usize>() else {
                    return;
                };
                if items.len() <= index {
                    items.resize(index + 1, Value::Null);
                }
                if last {
                    items[index] = value;
                    return;
                }
                current = &mut items[index];
            }
            _ => unreachable!("path element was just vivified"),
        }
    }
}

fn empty_container(segment: &str) -> Value {
    if segment.parse::<usize>().is_ok() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

/// Suffix read used by the differ: an empty keypath yields the value itself,
/// a missing path yields `Null`.
pub fn read_value(source: &Value, keypath: &str) -> Value {
    if source.is_null() {
        return Value::Null;
    }
    if keypath.is_empty() {
        return source.clone();
    }
    get(source, keypath).unwrap_or(Value::Null)
}

/// Loose numeric coercion for the convenience mutators: numbers pass through,
/// numeric strings parse, everything else falls back to `default`.
pub fn to_number(value: &Value, default: f64) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(default),
        Value::String(text) => text.trim().parse().unwrap_or(default),
        Value::Bool(flag) => {
            if *flag {
                1.0
            } else {
                0.0
            }
        }
        _ => default,
    }
}

/// Pack a float back into a `Value`, preferring an integer representation
/// when the value is whole so `1 + 1` reads back as `2`, not `2.0`.
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// JS-style truthiness, used by `toggle`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// =============================================================================
// TESTS
// =============================================================================
