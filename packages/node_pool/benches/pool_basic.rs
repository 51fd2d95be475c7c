//! Basic benchmarks for the `node_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use node_pool::NodePool;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

const NODE_SIZE: usize = 32;
const WARM_COUNT: usize = 1000;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("pool_basic");

    let allocs_op = allocs.operation("build_empty");
    group.bench_function("build_empty", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(NodePool::<NODE_SIZE>::new()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("allocate_first");
    group.bench_function("allocate_first", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(NodePool::<NODE_SIZE>::new)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for pool in &mut pools {
                _ = black_box(pool.allocate().unwrap());
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("allocate_free_warm");
    group.bench_function("allocate_free_warm", |b| {
        b.iter_custom(|iters| {
            let mut pool = NodePool::<NODE_SIZE>::new();

            // Grow the pool up front so the measured loop only touches the free list.
            let warm = iter::repeat_with(|| pool.allocate().unwrap())
                .take(WARM_COUNT)
                .collect::<Vec<_>>();

            for node in warm {
                // SAFETY: The node came from this pool and is freed once.
                unsafe {
                    pool.free(node);
                }
            }

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let node = black_box(pool.allocate().unwrap());

                // SAFETY: The node came from this pool and is freed once.
                unsafe {
                    pool.free(node);
                }
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("allocate_1000");
    group.bench_function("allocate_1000", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let mut pool = NodePool::<NODE_SIZE>::new();

                for _ in 0..WARM_COUNT {
                    _ = black_box(pool.allocate().unwrap());
                }

                drop(black_box(pool));
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
