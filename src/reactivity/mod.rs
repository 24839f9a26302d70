// ============================================================================
// spark-store - Reactivity Module
// Listener tables and the batch scheduler
// ============================================================================

pub mod emitter;
pub mod scheduler;

pub use emitter::{WatcherFn, WatcherId};

pub(crate) use emitter::{Emitter, WatcherEntry};
pub(crate) use scheduler::TaskQueue;
