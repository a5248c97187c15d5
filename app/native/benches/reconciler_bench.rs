//! Benchmarks for reconciler hot paths.
//!
//! Run with: `cargo bench -p winsync`
//!
//! ## Benchmark Groups
//!
//! - `normalizer`: coalescing bursts of changes in the notification queue
//! - `snapshot`: applying deltas and diffing candidate values

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use smallvec::SmallVec;
use winsync_lib::reconciler::events::channel;
use winsync_lib::reconciler::registry::EntityRegistry;
use winsync_lib::reconciler::state::{
    AppId, Application, Attribute, Delta, Entity, SnapshotStore, Value, Window, WindowId,
};
use winsync_lib::reconciler::{AttributeValue, OsRef, Point, RawNotification, Rect};

// ============================================================================
// Test Data
// ============================================================================

const PID: i32 = 100;

fn window_ref(n: u32) -> OsRef { OsRef::Window { pid: PID, window_number: n } }

fn drag_burst(windows: u32, moves: u32) -> Vec<RawNotification> {
    (0..moves)
        .flat_map(|step| {
            (0..windows).map(move |n| RawNotification::Changed {
                object: window_ref(n),
                value: AttributeValue::position(Point::new(f64::from(step), f64::from(step))),
                tag: None,
            })
        })
        .collect()
}

/// A store holding one application with `count` windows.
fn populated_store(count: u32) -> (SnapshotStore, Vec<WindowId>) {
    let mut registry = EntityRegistry::new(1024);
    let mut store = SnapshotStore::new();

    let Ok((app_entity, _)) = registry.register_or_lookup(OsRef::Application { pid: PID }, None)
    else {
        return (store, Vec::new());
    };
    let Some(app) = AppId::from_entity(app_entity) else {
        return (store, Vec::new());
    };
    store.apply(&Delta::Created(Entity::Application(Application {
        id: app,
        pid: PID,
        bundle_id: Some("com.example.bench".to_string()),
        name: "Bench".to_string(),
        is_hidden: false,
        main_window: None,
        focused_window: None,
        windows: SmallVec::new(),
    })));

    let mut ids = Vec::new();
    for n in 0..count {
        let Ok((entity, _)) = registry.register_or_lookup(window_ref(n), Some(app_entity)) else {
            continue;
        };
        let Some(id) = WindowId::from_entity(entity) else { continue };
        store.apply(&Delta::Created(Entity::Window(Window {
            id,
            app,
            window_number: n,
            title: format!("Window {n}"),
            frame: Rect::new(0.0, 0.0, 800.0, 600.0),
            is_minimized: false,
            is_fullscreen: false,
            screen: None,
        })));
        ids.push(id);
    }
    (store, ids)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_normalizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalizer");

    for windows in [1_u32, 16, 64] {
        let burst = drag_burst(windows, 50);
        group.bench_with_input(BenchmarkId::new("coalesce_drag", windows), &burst, |b, burst| {
            b.iter(|| {
                let (sink, mut stream) = channel(256);
                for notification in burst {
                    sink.push(notification.clone());
                }
                black_box(stream.try_next_batch())
            });
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for count in [8_u32, 64, 256] {
        let (store, ids) = populated_store(count);
        let Some(&last) = ids.last() else { continue };
        let target = Value::Frame(Rect::new(10.0, 10.0, 800.0, 600.0));
        let same = Value::Frame(Rect::new(0.2, 0.0, 800.0, 600.0));

        group.bench_with_input(BenchmarkId::new("diff_changed", count), &store, |b, store| {
            b.iter(|| {
                black_box(store.current().diff(Some(last.entity()), Attribute::Frame, &target, 0.5))
            });
        });

        group.bench_with_input(BenchmarkId::new("diff_within_tolerance", count), &store, |b, store| {
            b.iter(|| {
                black_box(store.current().diff(Some(last.entity()), Attribute::Frame, &same, 0.5))
            });
        });
    }

    group.bench_function("apply_and_publish_64", |b| {
        let (mut store, ids) = populated_store(64);
        let _reader = store.reader();
        let mut step = 0.0;
        b.iter(|| {
            step += 1.0;
            for id in &ids {
                let new = Value::Frame(Rect::new(step, step, 800.0, 600.0));
                if let Some(delta) = store.current().diff(Some(id.entity()), Attribute::Frame, &new, 0.5) {
                    store.apply(&Delta::Changed(delta));
                }
            }
            black_box(store.publish())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_normalizer, bench_snapshot);
criterion_main!(benches);
