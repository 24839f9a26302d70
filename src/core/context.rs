// ============================================================================
// spark-store - Dependency Collection Context
// Thread-local frame stack tracking which computed is currently evaluating
// ============================================================================
//
// The tracker is a thread-local stack of frames rather than a single
// "current computed" cell. Each frame is tagged with the id of the observer
// that opened it, so reads against one observer never leak dependencies into
// a computed evaluating on another.
// ============================================================================

use std::cell::{Cell, RefCell};

struct CollectFrame {
    observer_id: u64,
    deps: Vec<String>,
}

thread_local! {
    static FRAMES: RefCell<Vec<CollectFrame>> = const { RefCell::new(Vec::new()) };
    static NEXT_OBSERVER_ID: Cell<u64> = const { Cell::new(1) };
}

/// Allocate a unique id for a new observer instance.
pub(crate) fn next_observer_id() -> u64 {
    NEXT_OBSERVER_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

/// Run `f` with a fresh collection frame on top of the stack, returning the
/// result together with every keypath read through the owning observer while
/// the frame was active. Frames nest: an inner computed recomputing during an
/// outer collection captures only its own reads.
pub(crate) fn collect<R>(observer_id: u64, f: impl FnOnce() -> R) -> (R, Vec<String>) {
    FRAMES.with(|frames| {
        frames.borrow_mut().push(CollectFrame {
            observer_id,
            deps: Vec::new(),
        });
    });
    let result = f();
    let frame = FRAMES.with(|frames| {
        frames
            .borrow_mut()
            .pop()
            .expect("collection frame pushed above")
    });
    (result, frame.deps)
}

/// Register a keypath read against the innermost frame, if that frame belongs
/// to the reading observer. Duplicate reads collapse to one dependency.
pub(crate) fn track_read(observer_id: u64, keypath: &str) {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        if let Some(frame) = frames.last_mut() {
            if frame.observer_id == observer_id && !frame.deps.iter().any(|dep| dep == keypath) {
                frame.deps.push(keypath.to_string());
            }
        }
    });
}

/// Whether any collection frame is currently active on this thread.
pub fn is_collecting() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}

// =============================================================================
// TESTS
// =============================================================================
