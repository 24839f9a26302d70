// ============================================================================
// spark-store - Computed Properties
// Memoized derived values with fixed or auto-discovered dependencies
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::trace;

use crate::core::{context, value};
use crate::reactivity::{WatcherFn, WatcherId};

use super::observer::{Observer, ObserverInner};

/// Getter for a computed property. Reads issued through the observer while
/// the getter runs are recorded as dependencies (dynamic-deps mode only).
pub type ComputedGetter = Rc<dyn Fn(&Observer) -> Value>;

/// Optional setter invoked when the computed's own keypath is written.
pub type ComputedSetter = Rc<dyn Fn(&Observer, Value)>;

/// Configuration for `add_computed`.
///
/// Defaults: caching on, sync dependency watchers, dynamic dependency
/// discovery. Supplying an explicit `deps` list freezes the dependency set:
/// bindings are established once and discovery never runs.
pub struct ComputedOptions {
    pub(crate) get: ComputedGetter,
    pub(crate) set: Option<ComputedSetter>,
    pub(crate) cache: bool,
    pub(crate) sync: bool,
    pub(crate) deps: Vec<String>,
}

impl ComputedOptions {
    pub fn new(getter: impl Fn(&Observer) -> Value + 'static) -> Self {
        Self {
            get: Rc::new(getter),
            set: None,
            cache: true,
            sync: true,
            deps: Vec::new(),
        }
    }

    /// Route writes at the computed's keypath into this setter.
    pub fn with_setter(mut self, setter: impl Fn(&Observer, Value) + 'static) -> Self {
        self.set = Some(Rc::new(setter));
        self
    }

    /// Disable memoization: every read re-runs the getter and dependency
    /// discovery never happens.
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Choose whether dependency watchers fire inline with the triggering
    /// write (`true`, the default) or at the next flush.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Fix the dependency list. Entries may be wildcard patterns.
    pub fn deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// A computed property registered at a keypath.
///
/// State is either fresh (memoized value present) or stale. A dependency
/// change forces a recompute; if the memoized value changed, the computed
/// re-enters `diff_sync` at its own keypath, which is what cascades
/// computed-of-computed chains exactly like a plain write.
pub(crate) struct Computed {
    keypath: String,
    sync: bool,
    cache: bool,
    /// Fixed-deps mode: bindings stand from construction, discovery is off.
    frozen: bool,
    observer: Weak<ObserverInner>,
    getter: ComputedGetter,
    setter: Option<ComputedSetter>,
    value: RefCell<Option<Value>>,
    deps: RefCell<Vec<(String, WatcherId)>>,
}

impl Computed {
    pub fn build(keypath: &str, observer: &Observer, options: ComputedOptions) -> Rc<Self> {
        let computed = Rc::new(Self {
            keypath: keypath.to_string(),
            sync: options.sync,
            cache: options.cache,
            frozen: !options.deps.is_empty(),
            observer: Rc::downgrade(&observer.inner),
            getter: options.get,
            setter: options.set,
            value: RefCell::new(None),
            deps: RefCell::new(Vec::new()),
        });
        for dep in &options.deps {
            computed.bind_dep(observer, dep);
        }
        computed
    }

    pub fn keypath(&self) -> &str {
        &self.keypath
    }

    pub fn is_cached(&self) -> bool {
        self.cache
    }

    /// Read the computed value, recomputing when stale or forced.
    pub fn get(self: &Rc<Self>, force: bool) -> Value {
        let Some(observer) = self.observer() else {
            return self.cached().unwrap_or(Value::Null);
        };

        // cache disabled: always recompute, never collect dependencies
        if !self.cache {
            let fresh = (self.getter)(&observer);
            *self.value.borrow_mut() = Some(fresh.clone());
            return fresh;
        }

        if !force {
            if let Some(memoized) = self.cached() {
                return memoized;
            }
        }

        trace!(keypath = %self.keypath, "recompute");

        let fresh = if self.frozen {
            (self.getter)(&observer)
        } else {
            // stale bindings from the previous run must go before fresh
            // ones are collected, or a branch no longer read keeps reacting
            self.unbind_deps(&observer);
            let (fresh, deps) = context::collect(observer.id(), || (self.getter)(&observer));
            for dep in deps {
                self.bind_dep(&observer, &dep);
            }
            fresh
        };

        *self.value.borrow_mut() = Some(fresh.clone());
        fresh
    }

    /// Write through the user setter. Returns whether a setter exists;
    /// without one the write is silently ignored.
    pub fn set(&self, observer: &Observer, new_value: Value) -> bool {
        match &self.setter {
            Some(setter) => {
                setter(observer, new_value);
                true
            }
            None => false,
        }
    }

    /// Mutate the memoized value at a sub-keypath. Used when a write lands
    /// under this computed's keypath. Fails on scalar values: there is no
    /// setter to receive the write.
    pub fn write_at(&self, sub_keypath: &str, new_value: Value) -> bool {
        let mut memoized = self.value.borrow_mut();
        match memoized.as_mut() {
            Some(resolved) if resolved.is_object() || resolved.is_array() => {
                value::set(resolved, sub_keypath, new_value);
                true
            }
            _ => false,
        }
    }

    /// Dependency-watcher entry point: recompute and, when the memoized
    /// value changed, propagate from this computed's own keypath.
    pub fn refresh(self: &Rc<Self>) {
        let Some(observer) = self.observer() else {
            return;
        };
        let old_value = self.cached().unwrap_or(Value::Null);
        let new_value = self.get(true);
        if new_value != old_value {
            observer.diff_sync(&self.keypath, &new_value, &old_value);
        }
    }

    /// Drop every standing dependency binding. Called on removal and before
    /// each dynamic re-collection.
    pub fn teardown(&self, observer: &Observer) {
        self.unbind_deps(observer);
    }

    fn bind_dep(self: &Rc<Self>, observer: &Observer, dep: &str) {
        if self.deps.borrow().iter().any(|(name, _)| name == dep) {
            return;
        }
        let weak = Rc::downgrade(self);
        let func: WatcherFn = Rc::new(move |_new, _old, _keypath| {
            if let Some(computed) = weak.upgrade() {
                computed.refresh();
            }
        });
        let id = observer.bind_watcher(dep, func, self.sync);
        self.deps.borrow_mut().push((dep.to_string(), id));
    }

    fn unbind_deps(&self, observer: &Observer) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for (dep, id) in deps {
            observer.unbind_watcher(&dep, id, self.sync);
        }
    }

    fn cached(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    fn observer(&self) -> Option<Observer> {
        self.observer.upgrade().map(Observer::from_inner)
    }

    #[cfg(test)]
    pub fn dep_keypaths(&self) -> Vec<String> {
        self.deps
            .borrow()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
