// ============================================================================
// spark-store - Scheduler
// Batch task queue drained once per tick by the embedding layer
// ============================================================================
//
// There is no ambient microtask queue in Rust, so the flush boundary is
// explicit: the host (a render layer, a test) calls `run()` to drain one
// batch. Tasks appended while a batch is draining belong to the next batch,
// which is what lets a mid-flush write start a fresh cycle instead of
// corrupting the one in progress.
// ============================================================================

use std::cell::RefCell;

type Task = Box<dyn FnOnce()>;

/// FIFO queue of deferred tasks.
#[derive(Default)]
pub(crate) struct TaskQueue {
    tasks: RefCell<Vec<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, task: Task) {
        self.tasks.borrow_mut().push(task);
    }

    /// Drain one batch. Tasks appended during the drain stay queued.
    pub fn run(&self) {
        let batch = self.tasks.replace(Vec::new());
        for task in batch {
            task();
        }
    }

    pub fn clear(&self) {
        self.tasks.borrow_mut().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
