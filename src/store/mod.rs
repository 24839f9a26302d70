// ============================================================================
// spark-store - Store Module
// The observer and its computed properties
// ============================================================================

pub mod computed;
pub mod observer;

pub use computed::{ComputedGetter, ComputedOptions, ComputedSetter};
pub use observer::{Observer, WatchOptions};
