// ============================================================================
// spark-store - Observer
// The keypath-addressed reactive store
// ============================================================================
//
// One observer owns a JSON data tree, a table of computed properties, and two
// listener registries. Writes diff synchronously: sync listeners (including
// computed dependency watchers) fire inline, so every transitively dependent
// computed settles before the write returns. Async listeners are only marked
// dirty and recorded; they fire when the host drains the batch via
// `next_run`, comparing against the value each keypath held before the batch
// so writes undone within a batch coalesce to silence.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::core::error::StoreError;
use crate::core::{context, keypath, value};
use crate::diff::{diff_watcher, is_recursive};
use crate::reactivity::{Emitter, TaskQueue, WatcherEntry, WatcherFn, WatcherId};

use super::computed::{Computed, ComputedOptions};

/// Registration options for `watch_with`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Fire inline with the triggering write instead of at the next flush.
    pub sync: bool,
    /// Remove the watcher after its first delivery.
    pub once: bool,
    /// Invoke immediately at registration with `(current, Null, keypath)`.
    pub immediate: bool,
}

impl WatchOptions {
    pub const SYNC: Self = Self {
        sync: true,
        once: false,
        immediate: false,
    };

    pub const ONCE: Self = Self {
        sync: false,
        once: true,
        immediate: false,
    };

    pub const IMMEDIATE: Self = Self {
        sync: false,
        once: false,
        immediate: true,
    };
}

/// A change recorded for the next flush: the keypath written, the value it
/// held before the batch touched it, and the patterns it matched.
struct PendingChange {
    keypath: String,
    old_value: Value,
    patterns: Vec<String>,
}

pub(crate) struct ObserverInner {
    id: u64,
    data: RefCell<Value>,
    computed: RefCell<HashMap<String, Rc<Computed>>>,
    /// Computed keypaths sorted longest-first, so prefix resolution for a
    /// write like `fullname.first` finds the most specific shadowing computed.
    computed_keys: RefCell<Vec<String>>,
    sync_emitter: RefCell<Emitter>,
    async_emitter: RefCell<Emitter>,
    pending: RefCell<Vec<PendingChange>>,
    /// Per-batch delivery credits: how many times each async watcher may
    /// still fire this batch. Taken whole at flush start, so one change
    /// reached through several structural paths still delivers at most once
    /// and stale credits never leak into the next batch.
    dirty: RefCell<HashMap<WatcherId, u32>>,
    ticking: Cell<bool>,
    destroyed: Cell<bool>,
    scheduler: TaskQueue,
}

/// Cheap clonable handle to the reactive store.
pub struct Observer {
    pub(crate) inner: Rc<ObserverInner>,
}

impl Clone for Observer {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl Observer {
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                id: context::next_observer_id(),
                data: RefCell::new(data.into()),
                computed: RefCell::new(HashMap::new()),
                computed_keys: RefCell::new(Vec::new()),
                sync_emitter: RefCell::new(Emitter::new()),
                async_emitter: RefCell::new(Emitter::new()),
                pending: RefCell::new(Vec::new()),
                dirty: RefCell::new(HashMap::new()),
                ticking: Cell::new(false),
                destroyed: Cell::new(false),
                scheduler: TaskQueue::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<ObserverInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Read the value at a keypath, `Null` when absent. The empty keypath
    /// returns the whole data tree. Reads inside a running computed getter
    /// are recorded as dependencies.
    pub fn get(&self, keypath: &str) -> Value {
        self.get_with(keypath, None, true)
    }

    /// Like `get`, with a fallback for absent keypaths.
    pub fn get_or(&self, keypath: &str, default: Value) -> Value {
        self.get_with(keypath, Some(default), true)
    }

    /// Read without dependency tracking.
    pub fn peek(&self, keypath: &str) -> Value {
        self.get_with(keypath, None, false)
    }

    fn get_with(&self, keypath_str: &str, default: Option<Value>, track: bool) -> Value {
        if keypath_str.is_empty() {
            return self.inner.data.borrow().clone();
        }
        if keypath::is_fuzzy(keypath_str) {
            return default.unwrap_or(Value::Null);
        }
        if track {
            context::track_read(self.inner.id, keypath_str);
        }

        // clone the Rc out before calling into it: the getter may re-enter
        let exact = self.inner.computed.borrow().get(keypath_str).cloned();
        if let Some(computed) = exact {
            return computed.get(false);
        }

        if let Some((name, sub_keypath)) = self.match_best(keypath_str) {
            let shadowing = self.inner.computed.borrow().get(&name).cloned();
            if let Some(shadowing) = shadowing {
                let resolved = shadowing.get(false);
                if !resolved.is_null() {
                    if let Some(found) = value::get(&resolved, &sub_keypath) {
                        return found;
                    }
                }
            }
        }

        match value::get(&self.inner.data.borrow(), keypath_str) {
            Some(found) => found,
            None => default.unwrap_or(Value::Null),
        }
    }

    /// Longest computed keypath that is a strict prefix of `keypath_str`.
    fn match_best(&self, keypath_str: &str) -> Option<(String, String)> {
        let keys = self.inner.computed_keys.borrow();
        for name in keys.iter() {
            if let Some(cut) = keypath::match_prefix(keypath_str, name) {
                let sub_keypath = &keypath_str[cut..];
                if !sub_keypath.is_empty() {
                    return Some((name.clone(), sub_keypath.to_string()));
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Write a value at a keypath. Missing intermediate containers are
    /// created; equal values are a complete no-op. Wildcard keypaths and
    /// writes on a destroyed observer are ignored.
    pub fn set(&self, keypath: &str, new_value: impl Into<Value>) {
        self.set_value(keypath, new_value.into());
    }

    /// Apply several writes in order. Each entry diffs individually.
    pub fn set_many<'a, I, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Into<Value>,
    {
        for (keypath, new_value) in entries {
            self.set_value(keypath, new_value.into());
        }
    }

    fn set_value(&self, keypath_str: &str, new_value: Value) {
        if self.inner.destroyed.get()
            || keypath_str.is_empty()
            || keypath::is_fuzzy(keypath_str)
        {
            return;
        }

        let old_value = self.peek(keypath_str);
        if new_value == old_value {
            return;
        }

        trace!(keypath = keypath_str, "set");

        let exact = self.inner.computed.borrow().get(keypath_str).cloned();
        let wrote = if let Some(computed) = exact {
            computed.set(self, new_value.clone())
        } else if let Some((name, sub_keypath)) = self.match_best(keypath_str) {
            let shadowing = self.inner.computed.borrow().get(&name).cloned();
            match shadowing {
                Some(shadowing) => {
                    // make sure the memoized value exists before writing into it
                    shadowing.get(false);
                    shadowing.write_at(&sub_keypath, new_value.clone())
                }
                None => false,
            }
        } else {
            value::set(&mut self.inner.data.borrow_mut(), keypath_str, new_value.clone());
            true
        };

        if wrote {
            self.diff_sync(keypath_str, &new_value, &old_value);
        }
    }

    // ------------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------------

    /// Propagate one change. Sync listeners fire inline; async listeners are
    /// credited in the dirty table and recorded for the next flush.
    pub(crate) fn diff_sync(&self, keypath_changed: &str, new_value: &Value, old_value: &Value) {
        let recursive = is_recursive(keypath_changed);

        let sync_patterns = self.inner.sync_emitter.borrow().patterns();
        if !sync_patterns.is_empty() {
            diff_watcher(
                keypath_changed,
                new_value,
                old_value,
                &sync_patterns,
                recursive,
                &mut |watch_keypath, changed_keypath, sub_new, sub_old| {
                    self.fire_sync(watch_keypath, changed_keypath, sub_new, sub_old);
                },
            );
        }

        let async_patterns = self.inner.async_emitter.borrow().patterns();
        if !async_patterns.is_empty() {
            // one diff may reach the same pattern through several structural
            // paths; credit its listeners only once per originating change
            let mut credited: Vec<String> = Vec::new();
            diff_watcher(
                keypath_changed,
                new_value,
                old_value,
                &async_patterns,
                recursive,
                &mut |watch_keypath, changed_keypath, _sub_new, sub_old| {
                    if !credited.iter().any(|pattern| pattern == watch_keypath) {
                        credited.push(watch_keypath.to_string());
                        let ids = self.inner.async_emitter.borrow().watcher_ids(watch_keypath);
                        let mut dirty = self.inner.dirty.borrow_mut();
                        for id in ids {
                            *dirty.entry(id).or_insert(0) += 1;
                        }
                    }
                    self.mark_pending(watch_keypath, changed_keypath, sub_old);
                },
            );
        }
    }

    fn fire_sync(&self, watch_keypath: &str, changed_keypath: &str, sub_new: &Value, sub_old: &Value) {
        let entries = self.inner.sync_emitter.borrow().snapshot(watch_keypath);
        let mut finished: Vec<WatcherId> = Vec::new();
        for entry in entries {
            (entry.func)(sub_new, sub_old, changed_keypath);
            if entry.once {
                finished.push(entry.id);
            }
        }
        if !finished.is_empty() {
            let mut emitter = self.inner.sync_emitter.borrow_mut();
            for id in finished {
                emitter.off_watcher(watch_keypath, id);
            }
        }
    }

    /// Record one (pattern, changed keypath) pair for the next flush. The
    /// first record for a keypath pins its pre-batch value; later writes to
    /// the same keypath within the batch only accumulate patterns.
    fn mark_pending(&self, watch_keypath: &str, changed_keypath: &str, sub_old: &Value) {
        {
            let mut pending = self.inner.pending.borrow_mut();
            match pending
                .iter_mut()
                .find(|change| change.keypath == changed_keypath)
            {
                Some(change) => {
                    if !change.patterns.iter().any(|pattern| pattern == watch_keypath) {
                        change.patterns.push(watch_keypath.to_string());
                    }
                }
                None => pending.push(PendingChange {
                    keypath: changed_keypath.to_string(),
                    old_value: sub_old.clone(),
                    patterns: vec![watch_keypath.to_string()],
                }),
            }
        }
        self.schedule_flush();
    }

    fn schedule_flush(&self) {
        if self.inner.ticking.get() {
            return;
        }
        self.inner.ticking.set(true);
        let weak = Rc::downgrade(&self.inner);
        self.inner.scheduler.append(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                if inner.ticking.get() {
                    inner.ticking.set(false);
                    Observer::from_inner(inner).diff_async();
                }
            }
        }));
    }

    /// Deliver the recorded batch. Each change is re-read at its keypath and
    /// compared to the pinned pre-batch value; changes that were undone spend
    /// their delivery credits silently.
    fn diff_async(&self) {
        let pending = self.inner.pending.replace(Vec::new());
        let mut dirty = self.inner.dirty.replace(HashMap::new());
        if pending.is_empty() {
            return;
        }

        debug!(changes = pending.len(), "flush");

        for change in pending {
            let new_value = self.peek(&change.keypath);
            for watch_keypath in &change.patterns {
                let entries = self.inner.async_emitter.borrow().snapshot(watch_keypath);
                let mut finished: Vec<WatcherId> = Vec::new();
                for entry in entries {
                    let Some(credits) = dirty.get_mut(&entry.id) else {
                        // registered after the change was recorded
                        continue;
                    };
                    if *credits == 0 {
                        continue;
                    }
                    *credits -= 1;
                    if new_value != change.old_value {
                        (entry.func)(&new_value, &change.old_value, &change.keypath);
                        if entry.once {
                            finished.push(entry.id);
                        }
                    }
                }
                if !finished.is_empty() {
                    let mut emitter = self.inner.async_emitter.borrow_mut();
                    for id in finished {
                        emitter.off_watcher(watch_keypath, id);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------------

    /// Register an async watcher on a keypath or wildcard pattern.
    pub fn watch(
        &self,
        keypath: &str,
        watcher: impl Fn(&Value, &Value, &str) + 'static,
    ) -> WatcherId {
        self.watch_with(keypath, WatchOptions::default(), watcher)
    }

    pub fn watch_with(
        &self,
        keypath: &str,
        options: WatchOptions,
        watcher: impl Fn(&Value, &Value, &str) + 'static,
    ) -> WatcherId {
        let func: WatcherFn = Rc::new(watcher);
        let id = self.register(keypath, func.clone(), options.sync, options.once);
        if options.immediate {
            func(&self.peek(keypath), &Value::Null, keypath);
        }
        id
    }

    fn register(&self, keypath: &str, func: WatcherFn, sync: bool, once: bool) -> WatcherId {
        let entry = WatcherEntry::new(func, once);
        let id = entry.id;
        if self.inner.destroyed.get() {
            return id;
        }
        let emitter = if sync {
            &self.inner.sync_emitter
        } else {
            &self.inner.async_emitter
        };
        emitter.borrow_mut().on(keypath, entry);
        id
    }

    pub(crate) fn bind_watcher(&self, keypath: &str, func: WatcherFn, sync: bool) -> WatcherId {
        self.register(keypath, func, sync, false)
    }

    pub(crate) fn unbind_watcher(&self, keypath: &str, id: WatcherId, sync: bool) {
        let emitter = if sync {
            &self.inner.sync_emitter
        } else {
            &self.inner.async_emitter
        };
        emitter.borrow_mut().off_watcher(keypath, id);
    }

    /// Remove every watcher registered under a pattern.
    pub fn unwatch(&self, keypath: &str) {
        self.inner.sync_emitter.borrow_mut().off(keypath);
        self.inner.async_emitter.borrow_mut().off(keypath);
    }

    /// Remove every watcher on the observer, computed dependency bindings
    /// included — computeds registered before this call go stale for good.
    pub fn unwatch_all(&self) {
        self.inner.sync_emitter.borrow_mut().clear();
        self.inner.async_emitter.borrow_mut().clear();
    }

    /// Remove one watcher by id.
    pub fn unwatch_watcher(&self, keypath: &str, id: WatcherId) {
        self.inner.sync_emitter.borrow_mut().off_watcher(keypath, id);
        self.inner.async_emitter.borrow_mut().off_watcher(keypath, id);
    }

    // ------------------------------------------------------------------------
    // Computed properties
    // ------------------------------------------------------------------------

    /// Register a computed property at a keypath, replacing any existing one.
    /// Cached computeds evaluate once immediately so dependency bindings
    /// stand before the first write.
    pub fn add_computed(
        &self,
        keypath_str: &str,
        options: ComputedOptions,
    ) -> Result<(), StoreError> {
        if self.inner.destroyed.get() {
            return Err(StoreError::Destroyed);
        }
        if keypath_str.is_empty() || keypath::is_fuzzy(keypath_str) {
            return Err(StoreError::InvalidComputedKeypath(keypath_str.to_string()));
        }

        debug!(keypath = keypath_str, "add computed");

        self.remove_computed(keypath_str);

        let computed = Computed::build(keypath_str, self, options);
        let prime = computed.is_cached().then(|| computed.clone());
        self.inner
            .computed
            .borrow_mut()
            .insert(keypath_str.to_string(), computed);
        self.rebuild_computed_keys();

        if let Some(computed) = prime {
            computed.get(false);
        }
        Ok(())
    }

    /// Remove a computed property and its dependency bindings. The keypath
    /// falls back to whatever the raw data tree holds.
    pub fn remove_computed(&self, keypath_str: &str) {
        let removed = self.inner.computed.borrow_mut().remove(keypath_str);
        if let Some(computed) = removed {
            computed.teardown(self);
            self.rebuild_computed_keys();
        }
    }

    pub fn has_computed(&self, keypath_str: &str) -> bool {
        self.inner.computed.borrow().contains_key(keypath_str)
    }

    fn rebuild_computed_keys(&self) {
        let mut keys: Vec<String> = self.inner.computed.borrow().keys().cloned().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        *self.inner.computed_keys.borrow_mut() = keys;
    }

    #[cfg(test)]
    pub(crate) fn computed_at(&self, keypath_str: &str) -> Option<Rc<Computed>> {
        self.inner.computed.borrow().get(keypath_str).cloned()
    }

    // ------------------------------------------------------------------------
    // Convenience mutators
    // ------------------------------------------------------------------------
    //
    // All of these route through `set`, so they diff and notify like any
    // other write. List mutators are copy-on-write: they read the array,
    // clone, mutate, and write the whole array back.

    /// Invert the truthiness of a keypath, storing a boolean. Returns the
    /// stored value.
    pub fn toggle(&self, keypath: &str) -> bool {
        let flipped = !value::is_truthy(&self.peek(keypath));
        self.set(keypath, flipped);
        flipped
    }

    /// Add `step` to the number at a keypath, clamped to `max` when given.
    /// Non-numeric current values count from zero. Returns the stored value,
    /// or `None` when the clamp rejected the move.
    pub fn increase(&self, keypath: &str, step: f64, max: Option<f64>) -> Option<f64> {
        let current = value::to_number(&self.peek(keypath), 0.0);
        let next = current + step;
        if let Some(max) = max {
            if next > max {
                return None;
            }
        }
        self.set(keypath, value::number_value(next));
        Some(next)
    }

    /// Subtract `step` from the number at a keypath, clamped to `min`.
    pub fn decrease(&self, keypath: &str, step: f64, min: Option<f64>) -> Option<f64> {
        let current = value::to_number(&self.peek(keypath), 0.0);
        let next = current - step;
        if let Some(min) = min {
            if next < min {
                return None;
            }
        }
        self.set(keypath, value::number_value(next));
        Some(next)
    }

    /// Insert into the array at a keypath. An absent or null keypath becomes
    /// a fresh array; an index past the end appends. Returns whether the
    /// insert happened.
    pub fn insert(&self, keypath: &str, item: impl Into<Value>, index: usize) -> bool {
        let current = self.peek(keypath);
        let mut list = match current {
            Value::Array(list) => list,
            Value::Null => Vec::new(),
            _ => return false,
        };
        let index = index.min(list.len());
        list.insert(index, item.into());
        self.set(keypath, Value::Array(list));
        true
    }

    pub fn append(&self, keypath: &str, item: impl Into<Value>) -> bool {
        let end = match self.peek(keypath) {
            Value::Array(list) => list.len(),
            _ => 0,
        };
        self.insert(keypath, item, end)
    }

    pub fn prepend(&self, keypath: &str, item: impl Into<Value>) -> bool {
        self.insert(keypath, item, 0)
    }

    /// Remove the element at `index`. Out-of-range indices are a no-op.
    pub fn remove_at(&self, keypath: &str, index: usize) -> bool {
        let Value::Array(mut list) = self.peek(keypath) else {
            return false;
        };
        if index >= list.len() {
            return false;
        }
        list.remove(index);
        self.set(keypath, Value::Array(list));
        true
    }

    /// Remove the first element equal to `item`. Returns whether one was
    /// found.
    pub fn remove(&self, keypath: &str, item: &Value) -> bool {
        let Value::Array(mut list) = self.peek(keypath) else {
            return false;
        };
        let Some(position) = list.iter().position(|existing| existing == item) else {
            return false;
        };
        list.remove(position);
        self.set(keypath, Value::Array(list));
        true
    }

    // ------------------------------------------------------------------------
    // Batch control
    // ------------------------------------------------------------------------

    /// Run a task after the current batch's async deliveries. The task is
    /// dropped if the observer is destroyed first.
    pub fn next_tick(&self, task: impl FnOnce() + 'static) {
        let weak = Rc::downgrade(&self.inner);
        self.inner.scheduler.append(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                if !inner.destroyed.get() {
                    task();
                }
            }
        }));
    }

    /// Drain one batch: deliver pending async changes, then any `next_tick`
    /// tasks queued behind them. Writes made by callbacks start a new batch.
    pub fn next_run(&self) {
        self.inner.scheduler.run();
    }

    /// Tear down the observer: all watchers, computeds, and pending work are
    /// dropped. Reads keep working against the final data; writes and new
    /// registrations become no-ops.
    pub fn destroy(&self) {
        if self.inner.destroyed.get() {
            return;
        }
        self.inner.destroyed.set(true);
        self.inner.ticking.set(false);
        self.inner.sync_emitter.borrow_mut().clear();
        self.inner.async_emitter.borrow_mut().clear();
        self.inner.computed.borrow_mut().clear();
        self.inner.computed_keys.borrow_mut().clear();
        self.inner.pending.borrow_mut().clear();
        self.inner.dirty.borrow_mut().clear();
        self.inner.scheduler.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
