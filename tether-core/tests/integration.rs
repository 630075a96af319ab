//! Integration Tests for Reactive System
//!
//! These tests verify that constants, derived cells, properties, links and
//! configuration files work together correctly.

use std::fs;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tether_core::config::{ConfigManager, FileWatcher};
use tether_core::reactive::{CellValue, Constant, Derived, Observable, Property, Value};

fn count_changes<T: CellValue>(property: &Property<T>) -> Arc<AtomicI32> {
    let count = Arc::new(AtomicI32::new(0));
    let count_clone = count.clone();
    property.add_change_listener(move |_| {
        count_clone.fetch_add(1, Ordering::SeqCst);
    });
    count
}

// ----------------------------------------------------------------------------
// Cells
// ----------------------------------------------------------------------------

/// Test that a constant is stable and never notifies.
#[test]
fn constant_is_stable_and_silent() {
    let calls = Arc::new(AtomicI32::new(0));
    let value = Value::wrap(String::from("fixed"));

    let calls_clone = calls.clone();
    value.add_change_listener(move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });
    value.invalidate();

    assert_eq!(value.get(), "fixed");
    assert_eq!(value.get(), "fixed");
    assert!(value.is_valid());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Test that two constants holding equal values compare equal.
#[test]
fn equal_constants_are_equal_cells() {
    assert_eq!(Value::wrap(3), Value::from_cell(Constant::new(3)));
    assert_ne!(Value::wrap(3), Value::wrap(4));
}

/// Test the dynamic counter: every read recomputes.
#[test]
fn dependency_free_cell_recomputes_on_every_read() {
    let counter = Arc::new(AtomicI64::new(0));
    let counter_clone = counter.clone();
    let d = Value::dynamic(move || counter_clone.fetch_add(1, Ordering::SeqCst));

    assert_eq!(d.get(), 0);
    assert!(!d.is_valid());
    assert_eq!(d.get(), 1);
    assert!(!d.is_valid());
}

/// Test that a derived cell is valid exactly when its dependencies were.
#[test]
fn derived_validity_follows_dependencies() {
    let a = Property::of(1);
    let b = Property::of(2);

    let a_clone = a.clone();
    let b_clone = b.clone();
    let sum = Derived::new(move || a_clone.get() + b_clone.get(), [a.dependency(), b.dependency()]);

    assert!(!sum.has_value());
    assert_eq!(sum.get(), 3);
    assert!(sum.is_valid());

    b.invalidate();
    assert!(!sum.is_valid());
}

/// Test that a derived cell depending on a never-valid cell stays invalid.
#[test]
fn derived_over_dynamic_source_stays_invalid() {
    let ticks = Arc::new(AtomicI64::new(0));
    let ticks_clone = ticks.clone();
    let clock = Value::dynamic(move || ticks_clone.fetch_add(1, Ordering::SeqCst));
    let label = clock.map(|t| format!("tick {t}"));

    assert_eq!(label.get(), "tick 0");
    assert!(!label.is_valid());
    assert_eq!(label.get(), "tick 1");
}

// ----------------------------------------------------------------------------
// Properties
// ----------------------------------------------------------------------------

/// Test the empty property scenario with a default written back.
#[test]
fn empty_property_materializes_default() {
    let p = Property::<Option<i32>>::empty();

    assert_eq!(p.get(), None);
    assert_eq!(p.get_or(7), 7);
    assert_eq!(p.get(), Some(7));
    assert_eq!(p.get_or(9), 7);
}

/// Test that explicit writes always notify, even with an equal value.
///
/// Pulled recomputation only notifies on a difference; explicit writes are
/// events in their own right.
#[test]
fn explicit_write_echoes_but_pull_does_not() {
    let p = Property::of(5);
    let changes = count_changes(&p);

    p.set(5);
    p.set(5);
    assert_eq!(changes.load(Ordering::SeqCst), 2);

    let trigger = Property::of(0);
    p.bind_dynamic(|| 5, [trigger.dependency()]);
    assert_eq!(p.get(), 5);

    trigger.set(1);
    assert_eq!(p.get(), 5);
    assert_eq!(changes.load(Ordering::SeqCst), 2);
}

/// Test that a bound property follows the cell it tracks.
#[test]
fn bound_property_follows_source() {
    let source = Property::of(String::from("a"));
    let follower = Property::from_value(source.as_value());
    let changes = count_changes(&follower);

    assert_eq!(follower.get(), "a");
    source.set(String::from("b"));
    assert!(!follower.is_valid());
    assert_eq!(follower.get(), "b");
    assert_eq!(changes.load(Ordering::SeqCst), 2);
}

/// Test that a removed listener is never called again.
#[test]
fn removed_listener_stays_removed() {
    let p = Property::of(0);
    let calls = Arc::new(AtomicI32::new(0));

    let calls_clone = calls.clone();
    let handle = p.add_change_listener(move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    p.set(1);
    handle.remove();
    handle.remove();
    p.set(2);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Test that one panicking listener does not starve the others.
#[test]
fn panicking_listener_is_isolated() {
    let p = Property::of(0);
    let before = count_changes(&p);
    p.add_change_listener(|_| panic!("listener failure is expected here"));
    let after = count_changes(&p);

    p.set(1);
    p.set(2);

    assert_eq!(before.load(Ordering::SeqCst), 2);
    assert_eq!(after.load(Ordering::SeqCst), 2);
    assert_eq!(p.get(), 2);
}

/// Test that concurrent readers never observe a torn value.
#[test]
fn concurrent_set_and_get_are_not_torn() {
    let p = Property::of((0_i64, 0_i64));

    let writers: Vec<_> = (0..4)
        .map(|worker| {
            let p = p.clone();
            thread::spawn(move || {
                for i in 0..500_i64 {
                    let v = worker * 1_000 + i;
                    p.set((v, v));
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let p = p.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    let (a, b) = p.get();
                    assert_eq!(a, b);
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().expect("worker thread panicked");
    }
}

/// Test that a write landing while a cell recomputes is not lost.
///
/// The writer runs on another thread after the input was read, so the value
/// returned is already stale; the cell and its follower must stay invalid so
/// the next read picks the write up.
#[test]
fn concurrent_write_during_recompute_is_not_lost() {
    let source = Property::of(1);
    let first_run = Arc::new(AtomicBool::new(true));

    let doubled = {
        let dependencies = [source.dependency()];
        let source = source.clone();
        let first_run = first_run.clone();
        Value::dynamic_with(
            move || {
                let value = source.get() * 2;
                if first_run.swap(false, Ordering::SeqCst) {
                    let writer = source.clone();
                    thread::spawn(move || writer.set(2))
                        .join()
                        .expect("writer thread panicked");
                }
                value
            },
            dependencies,
        )
    };
    let follower = Property::from_value(doubled.clone());

    assert_eq!(follower.get(), 2);
    assert!(!doubled.is_valid());
    assert!(!follower.is_valid());

    assert_eq!(follower.get(), 4);
    assert!(doubled.is_valid());
    assert!(follower.is_valid());
}

// ----------------------------------------------------------------------------
// Links
// ----------------------------------------------------------------------------

/// Test the doubling link scenario.
#[test]
fn doubling_link_scenario() {
    let p = Property::of(10);
    let child = p.bimap(|n| n * 2, |s| s / 2);

    assert_eq!(child.get(), 20);

    p.set(5);
    assert_eq!(child.get(), 10);

    child.set(6);
    assert_eq!(p.get(), 3);
}

/// Test that a write does not bounce back through the link.
#[test]
fn link_does_not_bounce() {
    let forward = Arc::new(AtomicI32::new(0));
    let backward = Arc::new(AtomicI32::new(0));

    let a = Property::of(1);
    let forward_clone = forward.clone();
    let backward_clone = backward.clone();
    let b = a.bimap(
        move |x| {
            forward_clone.fetch_add(1, Ordering::SeqCst);
            x + 100
        },
        move |y| {
            backward_clone.fetch_add(1, Ordering::SeqCst);
            y - 100
        },
    );
    let initial = forward.load(Ordering::SeqCst);

    a.set(2);
    assert_eq!(b.get(), 102);
    assert_eq!(forward.load(Ordering::SeqCst), initial + 1);
    assert_eq!(backward.load(Ordering::SeqCst), 0);

    b.set(150);
    assert_eq!(a.get(), 50);
    assert_eq!(forward.load(Ordering::SeqCst), initial + 1);
    assert_eq!(backward.load(Ordering::SeqCst), 1);
}

/// Test that a derived cell over a linked child sees source writes.
#[test]
fn derived_cell_over_link() {
    let meters = Property::of(1.0_f64);
    let centimeters = meters.bimap(|m| m * 100.0, |cm| cm / 100.0);
    let label = centimeters.map(|cm| format!("{cm:.0} cm"));

    assert_eq!(label.get(), "100 cm");

    meters.set(2.5);
    assert_eq!(label.get(), "250 cm");

    centimeters.set(30.0);
    assert_eq!(label.get(), "30 cm");
    assert!((meters.get() - 0.3).abs() < 1e-12);
}

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Test a full round trip through a configuration file.
#[test]
fn config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app").join("config.json");

    let manager = ConfigManager::new(Arc::new(FileWatcher::new().unwrap()));
    let config = manager.load(&path).unwrap();

    let workers = config.node("server").get_u64("workers");
    assert_eq!(workers.get_or(4), 4);
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "{\n  \"server\": {\n    \"workers\": 4\n  }\n}"
    );

    let seen = Arc::new(AtomicI64::new(0));
    let seen_clone = seen.clone();
    workers.add_change_listener(move |value| {
        seen_clone.store(value.map_or(-1, |v| v as i64), Ordering::SeqCst);
    });

    fs::write(&path, r#"{"server":{"workers":16}}"#).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while workers.get() != Some(16) && Instant::now() < deadline {
        manager.watcher().poll();
        thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(workers.get(), Some(16));
    assert_eq!(seen.load(Ordering::SeqCst), 16);
    assert!(manager.take_errors().is_empty());

    drop(workers);
    drop(config);
    assert!(manager.watcher().is_empty());
}
