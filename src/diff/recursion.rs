// ============================================================================
// spark-store - Structural Recursion
// Decomposes a changed value pair into children for wildcard matching
// ============================================================================
//
// Replacing a container wholesale must still notify patterns that address
// its interior: setting `list` has to reach a `list.*.selected` watcher.
// The recursion walks old and new values side by side, one segment per
// level, testing every differing child keypath against the pending
// wildcard patterns.
// ============================================================================

use serde_json::Value;

use crate::core::keypath::{self, RAW_LENGTH};

use super::pattern;

static NULL: Value = Value::Null;

/// Callback signature shared by the differ:
/// `(watch_keypath, changed_keypath, new_value, old_value)`.
pub type DiffCallback<'a> = dyn FnMut(&str, &str, &Value, &Value) + 'a;

/// Recursively diff `new_value` against `old_value` under `keypath`, firing
/// `callback` for every wildcard pattern matched by a differing child.
///
/// Strings contribute a `length` pseudo-child; arrays contribute `length`
/// plus one child per index up to the longer length; objects contribute the
/// union of old and new keys. Descent is strictly one segment per call.
pub fn diff_recursion(
    keypath: &str,
    new_value: &Value,
    old_value: &Value,
    fuzzy_patterns: &[String],
    callback: &mut DiffCallback<'_>,
) {
    each_child(new_value, old_value, &mut |sub_keypath, sub_new, sub_old| {
        if sub_new == sub_old {
            return;
        }
        let child_keypath = keypath::join(keypath, sub_keypath);
        for fuzzy_keypath in fuzzy_patterns {
            if pattern::matches(&child_keypath, fuzzy_keypath) {
                callback(fuzzy_keypath, &child_keypath, sub_new, sub_old);
            }
        }
        diff_recursion(&child_keypath, sub_new, sub_old, fuzzy_patterns, callback);
    });
}

/// Enumerate the structural children of a value pair. Scalar pairs have no
/// children and end the recursion.
fn each_child(new_value: &Value, old_value: &Value, f: &mut dyn FnMut(&str, &Value, &Value)) {
    let new_is_string = new_value.is_string();
    let old_is_string = old_value.is_string();
    if new_is_string || old_is_string {
        let new_length = string_length(new_value);
        let old_length = string_length(old_value);
        f(RAW_LENGTH, &new_length, &old_length);
        return;
    }

    let new_items = new_value.as_array();
    let old_items = old_value.as_array();
    if new_items.is_some() || old_items.is_some() {
        let new_length = array_length(new_items);
        let old_length = array_length(old_items);
        f(RAW_LENGTH, &new_length, &old_length);

        let limit = new_items
            .map_or(0, Vec::len)
            .max(old_items.map_or(0, Vec::len));
        for index in 0..limit {
            let sub_new = new_items.and_then(|items| items.get(index)).unwrap_or(&NULL);
            let sub_old = old_items.and_then(|items| items.get(index)).unwrap_or(&NULL);
            f(&index.to_string(), sub_new, sub_old);
        }
        return;
    }

    let new_map = new_value.as_object();
    let old_map = old_value.as_object();
    if new_map.is_some() || old_map.is_some() {
        let mut keys: Vec<&String> = Vec::new();
        if let Some(map) = old_map {
            keys.extend(map.keys());
        }
        if let Some(map) = new_map {
            keys.extend(map.keys().filter(|key| {
                old_map.is_none_or(|old| !old.contains_key(key.as_str()))
            }));
        }
        for key in keys {
            let sub_new = new_map.and_then(|map| map.get(key)).unwrap_or(&NULL);
            let sub_old = old_map.and_then(|map| map.get(key)).unwrap_or(&NULL);
            f(key, sub_new, sub_old);
        }
    }
}

fn string_length(value: &Value) -> Value {
    match value.as_str() {
        Some(text) => Value::from(text.chars().count()),
        None => Value::Null,
    }
}

fn array_length(items: Option<&Vec<Value>>) -> Value {
    match items {
        Some(items) => Value::from(items.len()),
        None => Value::Null,
    }
}

// =============================================================================
// TESTS
// =============================================================================
