// ============================================================================
// spark-store - Wildcard Patterns
// Compiles watch patterns to anchored regexes, memoized process-wide
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;

// One compiled regex per pattern string, shared by every observer. Regex
// clones share the compiled program, so handing copies out is cheap.
static PATTERN_CACHE: Lazy<Mutex<HashMap<String, Regex>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Whether `keypath` matches the wildcard `pattern`.
///
/// `*` matches exactly one segment, `**` one or more segments. The match is
/// anchored at both ends: `user.*` matches `user.name` but not `user` or
/// `user.name.first`.
pub fn matches(keypath: &str, pattern: &str) -> bool {
    let regex = compiled(pattern);
    regex.is_match(keypath)
}

fn compiled(pattern: &str) -> Regex {
    let mut cache = PATTERN_CACHE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(regex) = cache.get(pattern) {
        return regex.clone();
    }
    let regex = Regex::new(&translate(pattern)).expect("translated pattern is a valid regex");
    cache.insert(pattern.to_string(), regex.clone());
    regex
}

/// Translate a wildcard pattern into regex source: literal characters are
/// escaped, `**` becomes `([.\w]+?)`, `*` becomes `(\w+)`.
fn translate(pattern: &str) -> String {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                source.push_str(r"([.\w]+?)");
            } else {
                source.push_str(r"(\w+)");
            }
        } else if ch.is_ascii_punctuation() {
            source.push('\\');
            source.push(ch);
        } else {
            source.push(ch);
        }
    }

    source.push('$');
    source
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_star_matches_exactly_one_segment() {
        assert!(matches("user.name", "user.*"));
        assert!(matches("user.age", "user.*"));
        assert!(!matches("user", "user.*"));
        assert!(!matches("user.name.first", "user.*"));
        assert!(!matches("other.name", "user.*"));
    }

    #[test]
    fn double_star_matches_one_or_more_segments() {
        assert!(matches("user.name", "user.**"));
        assert!(matches("user.name.first", "user.**"));
        assert!(!matches("user", "user.**"));
    }

    #[test]
    fn stars_mid_pattern() {
        assert!(matches("list.0.selected", "list.*.selected"));
        assert!(matches("list.12.selected", "list.*.selected"));
        assert!(!matches("list.0.name", "list.*.selected"));
        assert!(!matches("list.0", "list.*.selected"));
    }

    #[test]
    fn literal_dots_do_not_match_any_character() {
        assert!(!matches("userXname", "user.*"));
    }

    #[test]
    fn non_word_literals_are_escaped() {
        assert!(matches("$el.style", "$el.*"));
        assert!(!matches("xel.style", "$el.*"));
    }

    #[test]
    fn compiled_patterns_are_cached() {
        assert!(matches("a.b", "a.*"));
        let cached = PATTERN_CACHE.lock().unwrap().contains_key("a.*");
        assert!(cached);
    }
}
