//! Benchmark: read and write propagation through cells

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tether_core::reactive::{Property, Value};

fn benchmark_cached_read(c: &mut Criterion) {
    let source = Property::of(1_u64);
    let doubled = source.map(|v| v * 2);
    doubled.get();

    c.bench_function("cached_read", |b| b.iter(|| black_box(doubled.get())));
}

fn benchmark_set_then_read_chain(c: &mut Criterion) {
    let source = Property::of(0_u64);
    let mut tail: Value<u64> = source.as_value();
    for _ in 0..16 {
        tail = tail.map(|v| v + 1);
    }

    let mut next = 0_u64;
    c.bench_function("set_then_read_chain_16", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
            black_box(tail.get())
        })
    });
}

fn benchmark_linked_write(c: &mut Criterion) {
    let source = Property::of(0_i64);
    let child = source.bimap(|v| v * 2, |v| v / 2);

    let mut next = 0_i64;
    c.bench_function("linked_write", |b| {
        b.iter(|| {
            next += 2;
            child.set(next);
            black_box(source.get())
        })
    });
}

fn benchmark_listener_fanout(c: &mut Criterion) {
    c.bench_function("listener_fanout_64", |b| {
        b.iter_batched(
            || {
                let property = Property::of(0_u64);
                let handles: Vec<_> = (0..64)
                    .map(|_| {
                        property.add_change_listener(|v| {
                            black_box(*v);
                        })
                    })
                    .collect();
                (property, handles)
            },
            |(property, _handles)| property.set(1),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    benchmark_cached_read,
    benchmark_set_then_read_chain,
    benchmark_linked_write,
    benchmark_listener_fanout
);
criterion_main!(benches);
