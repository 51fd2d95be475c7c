//! Basic benchmarks for the `growable_array` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use growable_array::{GrowableArray, PodArray};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;
const FILL_COUNT: usize = 1000;
const MIDDLE_INDEX: usize = 500;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("array_basic");

    let allocs_op = allocs.operation("push_one_empty");
    group.bench_function("push_one_empty", |b| {
        b.iter_custom(|iters| {
            let mut arrays = iter::repeat_with(GrowableArray::<TestItem>::new)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for array in &mut arrays {
                black_box(array.push_back(black_box(TEST_VALUE))).unwrap();
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("push_1000");
    group.bench_function("push_1000", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut array = GrowableArray::<TestItem>::new();

                for _ in 0..FILL_COUNT {
                    array.push_back(black_box(TEST_VALUE)).unwrap();
                }

                drop(black_box(array));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("pod_push_1000");
    group.bench_function("pod_push_1000", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut array = PodArray::<TestItem>::new();

                for _ in 0..FILL_COUNT {
                    array.push_back(black_box(TEST_VALUE)).unwrap();
                }

                drop(black_box(array));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("at_one");
    group.bench_function("at_one", |b| {
        b.iter_custom(|iters| {
            let mut array = GrowableArray::<TestItem>::new();
            array.grow_filled(FILL_COUNT, &TEST_VALUE).unwrap();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                _ = black_box(array.at(black_box(MIDDLE_INDEX)));
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
