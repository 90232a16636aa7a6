use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use tricolor_core::{BufferMode, BufferStore, Color, Token};

fn fill(store: &mut BufferStore, count: u64) {
    for serial in 0..count {
        let color = Color::ALL[(serial % 3) as usize];
        let _ = store.enqueue(Token::new(color, Color::Red, serial));
    }
}

fn bench_enqueue_until_overflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_until_overflow");
    for mode in [BufferMode::Shared, BufferMode::Separate] {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |b, &mode| {
            b.iter(|| {
                let mut store = BufferStore::new(mode, 64);
                fill(&mut store, 256);
                black_box(store.len())
            });
        });
    }
    group.finish();
}

fn bench_dequeue_by_color(c: &mut Criterion) {
    let mut group = c.benchmark_group("dequeue_by_color");
    for mode in [BufferMode::Shared, BufferMode::Separate] {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |b, &mode| {
            b.iter_batched(
                || {
                    let mut store = BufferStore::new(mode, 64);
                    fill(&mut store, 64);
                    store
                },
                |mut store| {
                    // Yellow sits behind red and blue in a shared queue.
                    while let Some(token) = store.dequeue_by_color(Color::Yellow) {
                        black_box(token);
                    }
                    store
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_enqueue_until_overflow, bench_dequeue_by_color);
criterion_main!(benches);
