// ============================================================================
// spark-store - Emitter
// Exact-string-keyed listener multimap backing the watch registry
// ============================================================================
//
// The emitter stores pattern strings verbatim; the differ is the only place
// that interprets `*`/`**`. An observer carries two of these: one for sync
// listeners fired inline with the triggering write, one for async listeners
// delivered at flush.
// ============================================================================

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

/// Watcher callback: `(new_value, old_value, keypath)`. The old value is
/// `Null` for an `immediate` fire at registration time.
pub type WatcherFn = Rc<dyn Fn(&Value, &Value, &str)>;

/// Identifies one watcher registration for targeted removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

thread_local! {
    static NEXT_WATCHER_ID: Cell<u64> = const { Cell::new(1) };
}

pub(crate) fn next_watcher_id() -> WatcherId {
    NEXT_WATCHER_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        WatcherId(id)
    })
}

/// One registered listener.
pub(crate) struct WatcherEntry {
    pub id: WatcherId,
    pub func: WatcherFn,
    pub once: bool,
}

impl WatcherEntry {
    pub fn new(func: WatcherFn, once: bool) -> Rc<Self> {
        Rc::new(Self {
            id: next_watcher_id(),
            func,
            once,
        })
    }
}

/// A dumb multimap from literal pattern string to listener entries.
#[derive(Default)]
pub(crate) struct Emitter {
    listeners: HashMap<String, Vec<Rc<WatcherEntry>>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, pattern: &str, entry: Rc<WatcherEntry>) {
        self.listeners
            .entry(pattern.to_string())
            .or_default()
            .push(entry);
    }

    /// Remove every listener registered under `pattern`.
    pub fn off(&mut self, pattern: &str) {
        self.listeners.remove(pattern);
    }

    /// Remove one listener by id.
    pub fn off_watcher(&mut self, pattern: &str, id: WatcherId) {
        if let Some(entries) = self.listeners.get_mut(pattern) {
            entries.retain(|entry| entry.id != id);
            if entries.is_empty() {
                self.listeners.remove(pattern);
            }
        }
    }

    /// Remove everything; used by `destroy`.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// The registered pattern strings. Snapshotted before diffing so
    /// listeners registered or removed by callbacks mid-diff are unaffected.
    pub fn patterns(&self) -> Vec<String> {
        self.listeners.keys().cloned().collect()
    }

    /// Snapshot the entries under one pattern. Firing iterates the snapshot,
    /// never the live table, so callbacks may freely rebind watchers.
    pub fn snapshot(&self, pattern: &str) -> Vec<Rc<WatcherEntry>> {
        self.listeners.get(pattern).cloned().unwrap_or_default()
    }

    pub fn watcher_ids(&self, pattern: &str) -> Vec<WatcherId> {
        self.listeners
            .get(pattern)
            .map(|entries| entries.iter().map(|entry| entry.id).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn len(&self, pattern: &str) -> usize {
        self.listeners.get(pattern).map_or(0, Vec::len)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> WatcherFn {
        Rc::new(|_, _, _| {})
    }

    #[test]
    fn on_accumulates_entries_per_pattern() {
        let mut emitter = Emitter::new();
        emitter.on("a", WatcherEntry::new(noop(), false));
        emitter.on("a", WatcherEntry::new(noop(), false));
        emitter.on("b", WatcherEntry::new(noop(), false));
        assert_eq!(emitter.len("a"), 2);
        assert_eq!(emitter.len("b"), 1);
        assert_eq!(emitter.patterns().len(), 2);
    }

    #[test]
    fn off_watcher_removes_only_the_target() {
        let mut emitter = Emitter::new();
        let first = WatcherEntry::new(noop(), false);
        let second = WatcherEntry::new(noop(), false);
        let first_id = first.id;
        emitter.on("a", first);
        emitter.on("a", second);

        emitter.off_watcher("a", first_id);
        assert_eq!(emitter.len("a"), 1);

        // removing the last entry drops the pattern key
        let remaining = emitter.watcher_ids("a")[0];
        emitter.off_watcher("a", remaining);
        assert!(emitter.patterns().is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_the_table() {
        let mut emitter = Emitter::new();
        emitter.on("a", WatcherEntry::new(noop(), false));
        let snapshot = emitter.snapshot("a");
        emitter.off("a");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(emitter.len("a"), 0);
    }
}
