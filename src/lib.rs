// ============================================================================
// spark-store - A Keypath-Addressed Reactive Store for Rust
// ============================================================================
//
// A JSON data tree addressed by dotted keypaths (`user.name`, `list.0`),
// with computed properties, wildcard watchers (`list.*`, `tree.**`), and a
// dual notification pipeline: sync watchers fire inline with the triggering
// write, async watchers batch until the host drains a tick with `next_run`.
// ============================================================================
//
// ```rust
// use serde_json::json;
// use spark_store::{ComputedOptions, Observer};
//
// let observer = Observer::new(json!({ "a": 2, "b": 3 }));
// observer
//     .add_computed(
//         "sum",
//         ComputedOptions::new(|observer: &Observer| {
//             json!(observer.get("a").as_i64().unwrap_or(0)
//                 + observer.get("b").as_i64().unwrap_or(0))
//         }),
//     )
//     .unwrap();
//
// observer.watch("sum", |new_value, old_value, keypath| {
//     println!("{keypath}: {old_value} -> {new_value}");
// });
//
// observer.set("a", 4);
// observer.next_run(); // prints "sum: 5 -> 7"
// ```

pub mod core;
pub mod diff;
pub mod reactivity;
pub mod store;

// Re-export the public surface at crate root for ergonomic access
pub use crate::core::context::is_collecting;
pub use crate::core::error::StoreError;
pub use crate::diff::pattern::matches;
pub use crate::reactivity::emitter::{WatcherFn, WatcherId};
pub use crate::store::computed::{ComputedGetter, ComputedOptions, ComputedSetter};
pub use crate::store::observer::{Observer, WatchOptions};

// The value type is `serde_json::Value`; re-exported so callers need not
// name the dependency themselves
pub use serde_json::Value;
