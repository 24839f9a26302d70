// ============================================================================
// spark-store - Computed Property Integration Tests
// Memoization, dependency rebinding, chains, and shadowing
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{json, Value};
use spark_store::{ComputedOptions, Observer, StoreError, WatchOptions};

fn sum_of(a: &str, b: &str) -> ComputedOptions {
    let (a, b) = (a.to_string(), b.to_string());
    ComputedOptions::new(move |observer: &Observer| {
        json!(observer.get(&a).as_i64().unwrap_or(0) + observer.get(&b).as_i64().unwrap_or(0))
    })
}

#[test]
fn sync_settling_with_async_delivery() {
    let observer = Observer::new(json!({ "a": 1, "b": 2 }));
    observer.add_computed("sum", sum_of("a", "b")).unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    observer.watch("sum", move |new_value, old_value, keypath| {
        sink.borrow_mut()
            .push((new_value.clone(), old_value.clone(), keypath.to_string()));
    });

    observer.set("a", 2);
    observer.set("b", 3);

    // the derived value is already consistent, the listener has not run
    assert_eq!(observer.get("sum"), json!(5));
    assert!(log.borrow().is_empty());

    observer.next_run();
    assert_eq!(
        *log.borrow(),
        vec![(json!(5), json!(3), "sum".to_string())]
    );
}

#[test]
fn memoized_value_is_reused_until_a_dependency_changes() {
    let observer = Observer::new(json!({ "a": 1 }));
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    observer
        .add_computed(
            "double",
            ComputedOptions::new(move |observer: &Observer| {
                counter.set(counter.get() + 1);
                json!(observer.get("a").as_i64().unwrap_or(0) * 2)
            }),
        )
        .unwrap();

    // registration primes the memo
    assert_eq!(runs.get(), 1);
    observer.get("double");
    observer.get("double");
    assert_eq!(runs.get(), 1);

    observer.set("a", 2);
    assert_eq!(runs.get(), 2);
    assert_eq!(observer.get("double"), json!(4));
    assert_eq!(runs.get(), 2);
}

#[test]
fn cache_disabled_recomputes_on_every_read() {
    let observer = Observer::new(json!({ "a": 1 }));
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    observer
        .add_computed(
            "stamp",
            ComputedOptions::new(move |observer: &Observer| {
                counter.set(counter.get() + 1);
                observer.get("a")
            })
            .cache(false),
        )
        .unwrap();

    // no priming without a cache to prime
    assert_eq!(runs.get(), 0);
    observer.get("stamp");
    observer.get("stamp");
    assert_eq!(runs.get(), 2);
}

#[test]
fn computed_chains_settle_transitively() {
    let observer = Observer::new(json!({ "a": 1 }));
    observer
        .add_computed(
            "double",
            ComputedOptions::new(|observer: &Observer| {
                json!(observer.get("a").as_i64().unwrap_or(0) * 2)
            }),
        )
        .unwrap();
    observer
        .add_computed(
            "quad",
            ComputedOptions::new(|observer: &Observer| {
                json!(observer.get("double").as_i64().unwrap_or(0) * 2)
            }),
        )
        .unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    observer.watch("quad", move |new_value, old_value, _| {
        sink.borrow_mut().push((new_value.clone(), old_value.clone()));
    });

    observer.set("a", 3);
    assert_eq!(observer.get("quad"), json!(12));

    observer.next_run();
    assert_eq!(*log.borrow(), vec![(json!(12), json!(4))]);
}

#[test]
fn dynamic_deps_rebind_when_the_getter_changes_branch() {
    let observer = Observer::new(json!({ "flag": true, "a": "left", "b": "right" }));
    observer
        .add_computed(
            "pick",
            ComputedOptions::new(|observer: &Observer| {
                if observer.get("flag") == json!(true) {
                    observer.get("a")
                } else {
                    observer.get("b")
                }
            }),
        )
        .unwrap();

    let fired = Rc::new(Cell::new(0));
    let hits = fired.clone();
    observer.watch("pick", move |_, _, _| hits.set(hits.get() + 1));

    observer.set("flag", false);
    observer.next_run();
    assert_eq!(fired.get(), 1);
    assert_eq!(observer.get("pick"), json!("right"));

    // the branch no longer read must have stopped reacting
    observer.set("a", "changed");
    observer.next_run();
    assert_eq!(fired.get(), 1);

    observer.set("b", "other");
    observer.next_run();
    assert_eq!(fired.get(), 2);
}

#[test]
fn fixed_deps_never_rediscover() {
    let observer = Observer::new(json!({ "a": 1, "b": 2 }));
    observer
        .add_computed("sum", sum_of("a", "b").deps(["a"]))
        .unwrap();

    let fired = Rc::new(Cell::new(0));
    let hits = fired.clone();
    observer.watch("sum", move |_, _, _| hits.set(hits.get() + 1));

    // `b` was read by the getter but never declared
    observer.set("b", 5);
    observer.next_run();
    assert_eq!(fired.get(), 0);
    // stale until a declared dependency moves
    assert_eq!(observer.get("sum"), json!(3));

    observer.set("a", 2);
    observer.next_run();
    assert_eq!(fired.get(), 1);
    assert_eq!(observer.get("sum"), json!(7));
}

#[test]
fn writable_computed_routes_through_its_setter() {
    let observer = Observer::new(json!({ "first": "ada", "last": "js" }));
    observer
        .add_computed(
            "fullname",
            ComputedOptions::new(|observer: &Observer| {
                json!(format!(
                    "{} {}",
                    observer.get("first").as_str().unwrap_or(""),
                    observer.get("last").as_str().unwrap_or("")
                ))
            })
            .with_setter(|observer: &Observer, new_value: Value| {
                if let Some(full) = new_value.as_str() {
                    if let Some((first, last)) = full.split_once(' ') {
                        observer.set("first", first);
                        observer.set("last", last);
                    }
                }
            }),
        )
        .unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    observer.watch("fullname", move |new_value, old_value, _| {
        sink.borrow_mut().push((new_value.clone(), old_value.clone()));
    });

    observer.set("fullname", "spark store");
    assert_eq!(observer.get("first"), json!("spark"));
    assert_eq!(observer.get("last"), json!("store"));
    assert_eq!(observer.get("fullname"), json!("spark store"));

    observer.next_run();
    assert_eq!(*log.borrow(), vec![(json!("spark store"), json!("ada js"))]);
}

#[test]
fn readonly_computed_silently_ignores_writes() {
    let observer = Observer::new(json!({ "a": 1, "b": 2 }));
    observer.add_computed("sum", sum_of("a", "b")).unwrap();

    let fired = Rc::new(Cell::new(0));
    let hits = fired.clone();
    observer.watch_with("sum", WatchOptions::SYNC, move |_, _, _| {
        hits.set(hits.get() + 1)
    });

    observer.set("sum", 99);
    observer.next_run();

    assert_eq!(fired.get(), 0);
    assert_eq!(observer.get("sum"), json!(3));
}

#[test]
fn longest_prefix_computed_shadows_reads() {
    let observer = Observer::new(json!({ "user": { "name": "raw" } }));
    observer
        .add_computed(
            "user",
            ComputedOptions::new(|_: &Observer| json!({ "name": "derived" })),
        )
        .unwrap();

    assert_eq!(observer.get("user.name"), json!("derived"));
}

#[test]
fn suffix_write_under_a_computed_mutates_its_resolved_value() {
    let observer = Observer::new(json!({}));
    observer
        .add_computed(
            "profile",
            ComputedOptions::new(|_: &Observer| json!({ "name": "ada" })),
        )
        .unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    observer.watch("profile.name", move |new_value, old_value, _| {
        sink.borrow_mut().push((new_value.clone(), old_value.clone()));
    });

    observer.set("profile.name", "spark");
    assert_eq!(observer.get("profile.name"), json!("spark"));

    observer.next_run();
    assert_eq!(*log.borrow(), vec![(json!("spark"), json!("ada"))]);
}

#[test]
fn suffix_write_onto_a_primitive_computed_is_rejected() {
    let observer = Observer::new(json!({}));
    observer
        .add_computed(
            "version",
            ComputedOptions::new(|_: &Observer| json!(3)),
        )
        .unwrap();

    let fired = Rc::new(Cell::new(0));
    let hits = fired.clone();
    observer.watch("version.major", move |_, _, _| hits.set(hits.get() + 1));

    observer.set("version.major", 4);
    observer.next_run();

    assert_eq!(fired.get(), 0);
    assert_eq!(observer.get("version.major"), Value::Null);
}

#[test]
fn remove_computed_unbinds_dependencies_and_unshadows() {
    let observer = Observer::new(json!({ "a": 1, "b": 2, "sum": "raw" }));
    observer.add_computed("sum", sum_of("a", "b")).unwrap();
    assert_eq!(observer.get("sum"), json!(3));

    let fired = Rc::new(Cell::new(0));
    let hits = fired.clone();
    observer.watch("sum", move |_, _, _| hits.set(hits.get() + 1));

    observer.remove_computed("sum");
    assert!(!observer.has_computed("sum"));
    assert_eq!(observer.get("sum"), json!("raw"));

    // dependency watchers must be gone with it
    observer.set("a", 9);
    observer.next_run();
    assert_eq!(fired.get(), 0);
}

#[test]
fn async_dependency_watchers_defer_the_recompute() {
    let observer = Observer::new(json!({ "a": 1, "b": 2 }));
    observer.add_computed("sum", sum_of("a", "b").sync(false)).unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    observer.watch("sum", move |new_value, old_value, _| {
        sink.borrow_mut().push((new_value.clone(), old_value.clone()));
    });

    observer.set("a", 2);
    // the refresh itself waits for the flush, so its own notification lands
    // one batch later
    observer.next_run();
    assert!(log.borrow().is_empty());

    observer.next_run();
    assert_eq!(*log.borrow(), vec![(json!(4), json!(3))]);
}

#[test]
fn invalid_computed_keypaths_are_rejected() {
    let observer = Observer::new(json!({}));
    let wildcard = observer.add_computed("user.*", sum_of("a", "b"));
    assert!(matches!(
        wildcard,
        Err(StoreError::InvalidComputedKeypath(_))
    ));

    let empty = observer.add_computed("", sum_of("a", "b"));
    assert!(matches!(empty, Err(StoreError::InvalidComputedKeypath(_))));

    observer.destroy();
    let destroyed = observer.add_computed("sum", sum_of("a", "b"));
    assert!(matches!(destroyed, Err(StoreError::Destroyed)));
}
