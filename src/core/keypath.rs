// ============================================================================
// spark-store - Keypath Utilities
// Dot-segmented paths addressing locations in the store tree
// ============================================================================

/// Segment separator within a keypath.
pub const SEPARATOR: char = '.';

/// Pseudo-segment exposing the length of arrays and strings.
pub const RAW_LENGTH: &str = "length";

/// Join a keypath and a sub-keypath, tolerating an empty side.
pub fn join(keypath: &str, sub_keypath: &str) -> String {
    if keypath.is_empty() {
        sub_keypath.to_string()
    } else if sub_keypath.is_empty() {
        keypath.to_string()
    } else {
        let mut joined = String::with_capacity(keypath.len() + sub_keypath.len() + 1);
        joined.push_str(keypath);
        joined.push(SEPARATOR);
        joined.push_str(sub_keypath);
        joined
    }
}

/// Segment-boundary prefix match.
///
/// Returns the offset at which the remaining suffix of `keypath` starts when
/// `prefix` equals `keypath` or addresses an ancestor of it, `None` otherwise.
/// The offset for the equal case is `keypath.len()`, yielding an empty suffix.
pub fn match_prefix(keypath: &str, prefix: &str) -> Option<usize> {
    if keypath == prefix {
        return Some(prefix.len());
    }
    let rest = keypath.strip_prefix(prefix)?;
    if rest.starts_with(SEPARATOR) {
        Some(prefix.len() + 1)
    } else {
        None
    }
}

/// Whether a keypath is a wildcard pattern (`*` matches one segment,
/// `**` one or more). Patterns are only meaningful in watch registrations.
pub fn is_fuzzy(keypath: &str) -> bool {
    keypath.contains('*')
}

// =============================================================================
// TESTS
// =============================================================================
