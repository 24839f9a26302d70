// ============================================================================
// spark-store - Change Differ
// Maps one changed keypath onto every registered watch pattern it affects
// ============================================================================

use serde_json::Value;

use crate::core::{keypath, value};

use super::pattern;
use super::recursion::{diff_recursion, DiffCallback};

/// Diff one change against a set of registered patterns.
///
/// Wildcard patterns that match the changed keypath directly fire with the
/// full new/old values. Wildcard patterns that do not match are queued for
/// structural recursion, unless the keypath starts with `$` — the convention
/// for opaque values (held external handles) that must not be walked.
/// Literal patterns fire when the changed keypath addresses the pattern
/// itself or an ancestor of it, comparing the values at the remaining suffix.
pub fn diff_watcher(
    keypath_changed: &str,
    new_value: &Value,
    old_value: &Value,
    patterns: &[String],
    is_recursive: bool,
    callback: &mut DiffCallback<'_>,
) {
    let mut fuzzy_patterns: Vec<String> = Vec::new();

    for watch_keypath in patterns {
        if keypath::is_fuzzy(watch_keypath) {
            if pattern::matches(keypath_changed, watch_keypath) {
                callback(watch_keypath, keypath_changed, new_value, old_value);
            } else if is_recursive {
                fuzzy_patterns.push(watch_keypath.clone());
            }
        } else if let Some(cut) = keypath::match_prefix(watch_keypath, keypath_changed) {
            // e.g. watching `users.0.name` while `users.0` was set: read the
            // sub-values and fire only if they actually differ
            let sub_keypath = &watch_keypath[cut..];
            let sub_new = value::read_value(new_value, sub_keypath);
            let sub_old = value::read_value(old_value, sub_keypath);
            if sub_new != sub_old {
                callback(watch_keypath, watch_keypath, &sub_new, &sub_old);
            }
        }
    }

    if !fuzzy_patterns.is_empty() {
        diff_recursion(
            keypath_changed,
            new_value,
            old_value,
            &fuzzy_patterns,
            callback,
        );
    }
}

/// Whether structural recursion applies to a keypath. `$`-prefixed keypaths
/// hold opaque values and are compared wholesale only.
pub fn is_recursive(keypath: &str) -> bool {
    !keypath.starts_with('$')
}

// =============================================================================
// TESTS
// =============================================================================
