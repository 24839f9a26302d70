// ============================================================================
// spark-store - Diff Module
// Wildcard matching and structural change diffing
// ============================================================================

pub mod pattern;
pub mod recursion;
pub mod watcher;

pub use pattern::matches;
pub use recursion::{diff_recursion, DiffCallback};
pub use watcher::{diff_watcher, is_recursive};
