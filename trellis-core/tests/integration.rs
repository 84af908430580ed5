//! Integration Tests for Reactive System
//!
//! These tests verify that signals, computeds, effects and scopes work
//! together correctly through the public API.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use trellis_core::{Cleanup, FlushMode, NodeKind, ReactiveError, Runtime, RuntimeConfig};

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

fn bump(count: &Cell<usize>) {
    count.set(count.get() + 1);
}

#[derive(Debug)]
struct CountIsFive;

impl fmt::Display for CountIsFive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("count reached five")
    }
}

impl std::error::Error for CountIsFive {}

/// Test the basic signal round trip.
#[test]
fn signal_set_then_get() {
    let rt = Runtime::new();
    let (count, set_count) = rt.create_signal(0);

    set_count.set(5).unwrap();
    assert_eq!(count.get(), 5);
}

/// Test that a computed follows its signal.
#[test]
fn computed_doubles_signal() {
    let rt = Runtime::new();
    let (count, set_count) = rt.create_signal(1);

    let doubled = rt.create_computed(move || count.get() * 2);
    assert_eq!(doubled.get(), 2);

    set_count.set(2).unwrap();
    assert_eq!(doubled.get(), 4);
}

/// Test that writing an equal value never reruns dependents.
#[test]
fn equal_writes_are_no_ops() {
    let rt = Runtime::new();
    let (count, set_count) = rt.create_signal(3);
    let derivations = counter();
    let runs = counter();

    let derivations_clone = derivations.clone();
    let doubled = rt.create_computed(move || {
        bump(&derivations_clone);
        count.get() * 2
    });
    let runs_clone = runs.clone();
    let _effect = rt
        .create_effect(move || {
            doubled.get();
            bump(&runs_clone);
        })
        .unwrap();

    set_count.set(3).unwrap();
    set_count.update(|v| *v).unwrap();

    assert_eq!(derivations.get(), 1);
    assert_eq!(runs.get(), 1);
}

/// Test that N unbatched writes run an effect N+1 times, and N batched
/// writes run it twice.
#[test]
fn effect_run_counts_with_and_without_batch() {
    let rt = Runtime::new();
    let (count, set_count) = rt.create_signal(0);
    let runs = counter();
    let last_seen = Rc::new(Cell::new(-1));

    let runs_clone = runs.clone();
    let seen_clone = last_seen.clone();
    let _effect = rt
        .create_effect(move || {
            seen_clone.set(count.get());
            bump(&runs_clone);
        })
        .unwrap();

    for value in 1..=4 {
        set_count.set(value).unwrap();
    }
    assert_eq!(runs.get(), 5);

    runs.set(0);
    rt.batch(|| {
        set_count.set(1).unwrap();
        set_count.set(2).unwrap();
        set_count.set(3).unwrap();
    })
    .unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(last_seen.get(), 3);
}

/// Test that a diamond recomputes its sink once per change, and that the
/// effect reading it never sees a half-updated pair.
#[test]
fn diamond_recomputes_once() {
    let rt = Runtime::new();
    let (source, set_source) = rt.create_signal(1);
    let result_runs = counter();
    let observed = Rc::new(RefCell::new(Vec::new()));

    let a = rt.create_computed({
        let source = source.clone();
        move || source.get() + 1
    });
    let b = rt.create_computed({
        let source = source.clone();
        move || source.get() * 10
    });
    let result = rt.create_computed({
        let result_runs = result_runs.clone();
        move || {
            bump(&result_runs);
            (a.get(), b.get())
        }
    });

    let observed_clone = observed.clone();
    let _effect = rt
        .create_effect(move || observed_clone.borrow_mut().push(result.get()))
        .unwrap();
    assert_eq!(result_runs.get(), 1);

    set_source.set(2).unwrap();
    assert_eq!(result_runs.get(), 2);
    assert_eq!(*observed.borrow(), vec![(2, 10), (3, 20)]);
}

/// Test that a computed yielding an unchanged value does not rerun readers.
#[test]
fn unchanged_computed_stops_propagation() {
    let rt = Runtime::new();
    let (count, set_count) = rt.create_signal(2);
    let runs = counter();

    let is_even = rt.create_computed(move || count.get() % 2 == 0);
    let runs_clone = runs.clone();
    let _effect = rt
        .create_effect(move || {
            is_even.get();
            bump(&runs_clone);
        })
        .unwrap();

    set_count.set(4).unwrap();
    set_count.set(6).unwrap();
    assert_eq!(runs.get(), 1);

    set_count.set(7).unwrap();
    assert_eq!(runs.get(), 2);
}

/// Test that only the taken branch of a conditional read is tracked.
#[test]
fn conditional_reads_track_taken_branch_only() {
    let rt = Runtime::new();
    let (flag, set_flag) = rt.create_signal(true);
    let (a, set_a) = rt.create_signal(1);
    let (b, set_b) = rt.create_signal(2);
    let runs = counter();

    let runs_clone = runs.clone();
    let _effect = rt
        .create_effect(move || {
            bump(&runs_clone);
            let _value = if flag.get() { a.get() } else { b.get() };
        })
        .unwrap();

    set_b.set(20).unwrap();
    assert_eq!(runs.get(), 1);

    set_a.set(10).unwrap();
    assert_eq!(runs.get(), 2);

    set_flag.set(false).unwrap();
    assert_eq!(runs.get(), 3);
    assert_eq!(rt.observer_count(set_a.id()), 0);

    set_a.set(11).unwrap();
    assert_eq!(runs.get(), 3);

    set_b.set(21).unwrap();
    assert_eq!(runs.get(), 4);
}

/// Test that disposing a scope stops its effects and drops their edges.
#[test]
fn disposing_scope_stops_effects() {
    let rt = Runtime::new();
    let (count, set_count) = rt.create_signal(0);
    let runs = counter();
    let cleanups = counter();

    let root = rt.create_root(|root| {
        let runs = runs.clone();
        let cleanups = cleanups.clone();
        rt.create_effect(move || {
            count.get();
            bump(&runs);
            let cleanups = cleanups.clone();
            Cleanup::new(move || bump(&cleanups))
        })
        .unwrap();
        root
    });
    assert_eq!(rt.observer_count(set_count.id()), 1);

    set_count.set(1).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(cleanups.get(), 1);

    root.dispose().unwrap();
    assert_eq!(cleanups.get(), 2);
    assert_eq!(rt.observer_count(set_count.id()), 0);

    set_count.set(2).unwrap();
    rt.flush_sync().unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(rt.snapshot().count(NodeKind::Effect), 0);
}

/// Test that untracked and peeked reads create no edges.
#[test]
fn untrack_and_peek_create_no_edges() {
    let rt = Runtime::new();
    let (a, set_a) = rt.create_signal(1);
    let (b, set_b) = rt.create_signal(1);
    let runs = counter();

    let runs_clone = runs.clone();
    let inner_rt = rt.clone();
    let _effect = rt
        .create_effect(move || {
            a.peek();
            inner_rt.untrack(|| b.get());
            bump(&runs_clone);
        })
        .unwrap();

    assert_eq!(rt.observer_count(set_a.id()), 0);
    assert_eq!(rt.observer_count(set_b.id()), 0);

    set_a.set(2).unwrap();
    set_b.set(2).unwrap();
    assert_eq!(runs.get(), 1);
}

/// Test that an effect error surfaces from the flush that ran it, and that
/// earlier flushes complete normally.
#[test]
fn effect_error_surfaces_from_flush_sync() {
    let rt = Runtime::with_config(RuntimeConfig::default().with_flush_mode(FlushMode::Deferred));
    let (count, set_count) = rt.create_signal(0);

    let _effect = rt
        .create_effect(move || {
            if count.get() == 5 {
                Err(CountIsFive)
            } else {
                Ok(())
            }
        })
        .unwrap();

    set_count.set(1).unwrap();
    rt.flush_sync().unwrap();

    set_count.set(5).unwrap();
    let err = rt.flush_sync().unwrap_err();
    assert!(err.is_user_error());
    assert!(matches!(err, ReactiveError::Effect { .. }));
    assert!(err.to_string().contains("count reached five"));

    // The queue is empty again; the graph stays usable.
    assert_eq!(rt.pending_count(), 0);
    set_count.set(6).unwrap();
    rt.flush_sync().unwrap();
}

/// Test that in immediate mode the same error comes out of the write.
#[test]
fn effect_error_surfaces_from_set_in_immediate_mode() {
    let rt = Runtime::new();
    let count = rt.signal(0);

    let reader = count.clone();
    let _effect = rt
        .create_effect(move || {
            if reader.get() == 5 {
                Err(CountIsFive)
            } else {
                Ok(())
            }
        })
        .unwrap();

    count.set(1).unwrap();
    assert!(count.set(5).is_err());
    // The write itself went through; nothing is rolled back.
    assert_eq!(count.peek(), 5);
}

/// Test that a failing effect leaves the rest of its pass queued for the next flush.
#[test]
fn failed_pass_resumes_on_next_flush() {
    let rt = Runtime::with_config(RuntimeConfig::default().with_flush_mode(FlushMode::Deferred));
    let count = rt.signal(0);
    let seen = Rc::new(Cell::new(0));

    let failing = count.clone();
    let _failing = rt
        .create_effect(move || {
            if failing.get() == 5 {
                Err(CountIsFive)
            } else {
                Ok(())
            }
        })
        .unwrap();

    let reader = count.clone();
    let seen_clone = seen.clone();
    let recorder = rt
        .create_effect(move || seen_clone.set(reader.get()))
        .unwrap();

    count.set(5).unwrap();
    let err = rt.flush_sync().unwrap_err();
    assert!(matches!(err, ReactiveError::Effect { .. }));

    // The second effect was skipped, not dropped.
    assert_eq!(rt.pending_count(), 1);
    assert_eq!(seen.get(), 0);
    assert_eq!(recorder.run_count(), 1);

    rt.flush_sync().unwrap();
    assert_eq!(seen.get(), 5);
    assert_eq!(recorder.run_count(), 2);
    assert_eq!(rt.pending_count(), 0);
}

/// Test that effects created by an effect are disposed before it reruns.
#[test]
fn nested_effects_are_owned_by_their_parent() {
    let rt = Runtime::new();
    let (outer, set_outer) = rt.create_signal(0);
    let (inner, set_inner) = rt.create_signal(0);
    let inner_runs = counter();

    let root = rt.create_root(|root| {
        let inner_rt = rt.clone();
        let inner_runs = inner_runs.clone();
        rt.create_effect(move || {
            outer.get();
            let inner = inner.clone();
            let inner_runs = inner_runs.clone();
            inner_rt
                .create_effect(move || {
                    inner.get();
                    bump(&inner_runs);
                })
                .map(|_| ())
        })
        .unwrap();
        root
    });
    assert_eq!(inner_runs.get(), 1);

    // Rerunning the parent replaces the child rather than adding one.
    set_outer.set(1).unwrap();
    assert_eq!(inner_runs.get(), 2);
    assert_eq!(rt.observer_count(set_inner.id()), 1);

    set_inner.set(1).unwrap();
    assert_eq!(inner_runs.get(), 3);

    root.dispose().unwrap();
    assert_eq!(rt.observer_count(set_inner.id()), 0);
}

/// Test that an effect writing to another signal settles in the same flush.
#[test]
fn writes_from_effects_settle_in_one_flush() {
    let rt = Runtime::new();
    let (count, set_count) = rt.create_signal(1);
    let (mirror, set_mirror) = rt.create_signal(0);
    let seen = Rc::new(Cell::new(0));

    let _copy = rt
        .create_effect(move || set_mirror.set(count.get() * 100).map(|_| ()))
        .unwrap();
    let seen_clone = seen.clone();
    let _watch = rt
        .create_effect(move || seen_clone.set(mirror.get()))
        .unwrap();
    assert_eq!(seen.get(), 100);

    set_count.set(2).unwrap();
    assert_eq!(seen.get(), 200);
    assert_eq!(rt.pending_count(), 0);
}

/// Test the keyed collection end to end.
#[test]
fn keyed_collection_granularity() {
    let rt = Runtime::new();
    let rows = rt.create_keyed(vec![(1, "one"), (2, "two")], |row| row.0);
    let row_runs = counter();
    let id_runs = counter();

    let row_reader = rows.clone();
    let row_runs_clone = row_runs.clone();
    let _row = rt
        .create_effect(move || {
            row_reader.get(&1);
            bump(&row_runs_clone);
        })
        .unwrap();
    let id_reader = rows.clone();
    let id_runs_clone = id_runs.clone();
    let _ids = rt
        .create_effect(move || {
            id_reader.ids();
            bump(&id_runs_clone);
        })
        .unwrap();

    rows.update(&2, (2, "TWO")).unwrap();
    assert_eq!((row_runs.get(), id_runs.get()), (1, 1));

    rows.update(&1, (1, "ONE")).unwrap();
    assert_eq!((row_runs.get(), id_runs.get()), (2, 1));

    rows.set(vec![(2, "TWO"), (1, "ONE")]).unwrap();
    assert_eq!((row_runs.get(), id_runs.get()), (2, 2));
    assert_eq!(rows.get_all(), vec![(2, "TWO"), (1, "ONE")]);
}

/// Test that the snapshot reflects graph shape and serializes to JSON.
#[test]
fn snapshot_serializes_graph() {
    let rt = Runtime::new();
    let (count, _set_count) = rt.create_signal(0);

    let root = rt.create_root(|root| {
        let doubled = rt.create_computed(move || count.get() * 2);
        rt.create_effect(move || {
            doubled.get();
        })
        .unwrap();
        root
    });

    let snapshot = rt.snapshot();
    assert_eq!(snapshot.count(NodeKind::Signal), 1);
    assert_eq!(snapshot.count(NodeKind::Computed), 1);
    assert_eq!(snapshot.count(NodeKind::Effect), 1);
    assert_eq!(snapshot.count(NodeKind::Scope), 1);
    assert_eq!(snapshot.pending, 0);

    let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
    let nodes = json["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 4);
    assert!(nodes.iter().any(|n| n["kind"] == "scope" && n["owned"] == 2));
    assert!(nodes.iter().all(|n| n["state"] == "clean"));

    root.dispose().unwrap();
    assert_eq!(rt.node_count(), 1);
}

/// Test that a runtime loaded from config behaves accordingly.
#[test]
fn runtime_from_deserialized_config() {
    let config: RuntimeConfig =
        serde_json::from_str(r#"{ "flush_mode": "deferred", "max_flush_passes": 3 }"#).unwrap();
    let rt = Runtime::with_config(config);
    assert_eq!(rt.config().flush_mode, FlushMode::Deferred);

    let (count, set_count) = rt.create_signal(0);
    let writer = set_count.clone();
    let _effect = rt
        .create_effect(move || writer.set(count.get() + 1).map(|_| ()))
        .unwrap();

    set_count.set(10).unwrap();
    let err = rt.flush_sync().unwrap_err();
    assert!(matches!(err, ReactiveError::FlushLimit { passes: 3 }));
}
