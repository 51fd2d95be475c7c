//! Tests of pool behavior under custom and failing memory, using only the public API.

#![allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_ptr_alignment,
    reason = "test code doesn't need the same rigor as production code"
)]

use std::collections::HashSet;

use node_pool::{NODE_ALIGN, NodePool};
use raw_memory::{Error, ErrorCode, Status, report};
use testing::FaultyMemory;

#[test]
fn freed_third_node_is_next_to_be_handed_out() {
    let mut pool = NodePool::<16>::new();

    let nodes: Vec<_> = (0..5).map(|_| pool.allocate().unwrap()).collect();

    // SAFETY: The node came from this pool and is freed once.
    unsafe {
        pool.free(nodes[2]);
    }

    assert_eq!(pool.allocate().unwrap(), nodes[2]);
}

#[test]
fn live_nodes_never_overlap() {
    let mut pool = NodePool::<48>::new();
    let mut live = HashSet::new();

    // Interleave allocations and frees across several blocks.
    for round in 0..10 {
        for _ in 0..20 {
            let node = pool.allocate().unwrap();
            assert_eq!(node.addr().get() % NODE_ALIGN, 0);
            assert!(live.insert(node), "node handed out while still live");
        }

        let to_free: Vec<_> = live.iter().copied().take(round + 5).collect();

        for node in to_free {
            live.remove(&node);

            // SAFETY: The node is live and came from this pool.
            unsafe {
                pool.free(node);
            }
        }
    }

    assert_eq!(pool.len(), live.len());

    // No two live nodes may share any byte.
    let mut addresses: Vec<usize> = live.iter().map(|node| node.addr().get()).collect();
    addresses.sort_unstable();

    for pair in addresses.windows(2) {
        assert!(pair[1] - pair[0] >= 48);
    }
}

#[test]
fn new_block_only_when_free_list_is_empty() {
    let memory = FaultyMemory::new();
    let mut pool = NodePool::<16>::builder().memory(&memory).build();

    for _ in 0..6 {
        _ = pool.allocate().unwrap();
    }

    assert_eq!(memory.allocations(), 1);
    assert_eq!(pool.capacity(), 6);

    _ = pool.allocate().unwrap();

    assert_eq!(memory.allocations(), 2);
    assert_eq!(pool.capacity(), 15);
}

#[test]
fn failed_growth_leaves_pool_unchanged() {
    let memory = FaultyMemory::new();
    let mut pool = NodePool::<16>::builder().memory(&memory).build();

    let nodes: Vec<_> = (0..6).map(|_| pool.allocate().unwrap()).collect();

    memory.fail_all();

    let error = pool.allocate().unwrap_err();
    assert!(matches!(error, Error::BadAlloc { .. }));
    assert_eq!(pool.capacity(), 6);
    assert_eq!(pool.block_count(), 1);
    assert_eq!(pool.len(), 6);

    // Freed nodes are still served without touching memory.
    // SAFETY: The node came from this pool and is freed once.
    unsafe {
        pool.free(nodes[0]);
    }

    assert_eq!(pool.allocate().unwrap(), nodes[0]);

    memory.allow_all();

    _ = pool.allocate().unwrap();
    assert_eq!(pool.block_count(), 2);
}

#[test]
fn allocations_fail_once_memory_runs_out() {
    let memory = FaultyMemory::new();
    let mut pool = NodePool::<16>::builder().memory(&memory).build();

    // Blocks of 6 and 9 nodes may be allocated, the next one may not.
    memory.fail_after(2);

    let mut nodes = HashSet::new();
    while let Ok(node) = pool.allocate() {
        assert!(nodes.insert(node));
    }

    assert_eq!(nodes.len(), 15);
    assert_eq!(pool.capacity(), 15);
    assert_eq!(pool.block_count(), 2);
    assert_eq!(pool.len(), 15);

    for _ in 0..3 {
        assert!(matches!(pool.allocate(), Err(Error::BadAlloc { .. })));

        assert_eq!(pool.capacity(), 15);
        assert_eq!(pool.block_count(), 2);
        assert_eq!(pool.len(), 15);
    }

    assert_eq!(memory.outstanding(), 2);

    let node = nodes.iter().copied().next().unwrap();

    // SAFETY: The node came from this pool and is freed once.
    unsafe {
        pool.free(node);
    }

    assert_eq!(pool.allocate().unwrap(), node);
}

#[test]
fn failure_reported_through_status_and_code() {
    let memory = FaultyMemory::new();
    let mut pool = NodePool::<16>::builder().memory(&memory).build();

    memory.fail_all();

    let mut code = None;
    let status = report(&pool.allocate(), Some(&mut code));

    assert_eq!(status, Status::Fatal);
    assert_eq!(code, Some(ErrorCode::BadAlloc));
}

#[test]
fn drop_releases_every_block() {
    let memory = FaultyMemory::new();

    {
        let mut pool = NodePool::<64>::builder().memory(&memory).build();

        for _ in 0..100 {
            _ = pool.allocate().unwrap();
        }

        assert!(pool.block_count() > 1);
        assert_eq!(memory.outstanding(), pool.block_count());
    }

    assert_eq!(memory.outstanding(), 0);
    assert!(memory.frees() > 1);
}

#[test]
fn drop_of_unused_pool_touches_nothing() {
    let memory = FaultyMemory::new();

    drop(NodePool::<8>::builder().memory(&memory).build());

    assert_eq!(memory.allocations(), 0);
    assert_eq!(memory.frees(), 0);
}

#[test]
fn values_in_nodes_are_preserved() {
    let mut pool = NodePool::<32>::new();

    let nodes: Vec<_> = (0..50_u64)
        .map(|i| {
            let node = pool.allocate().unwrap().cast::<[u64; 4]>();

            // SAFETY: The node is 32 bytes aligned to 16, which fits [u64; 4].
            unsafe {
                node.write([i; 4]);
            }

            node
        })
        .collect();

    for (i, node) in (0..50_u64).zip(&nodes) {
        // SAFETY: We wrote this value above and nothing else touched the node.
        assert_eq!(unsafe { node.read() }, [i; 4]);
    }
}
