//! Basic usage example for `NodePool`.
//!
//! This example hands out fixed-size nodes, stores values in them and shows that freed nodes are
//! reused before the pool grows.

use node_pool::{NODE_ALIGN, NodePool};
use raw_memory::Error;

fn main() -> Result<(), Error> {
    // Every node holds 24 bytes.
    let mut pool = NodePool::<24>::new();

    println!(
        "Created NodePool with node size {} and alignment {}",
        pool.node_size(),
        pool.node_align()
    );
    assert_eq!(pool.node_align(), NODE_ALIGN);

    let mut nodes = Vec::new();

    for i in 0..5_u64 {
        let node = pool.allocate()?.cast::<[u64; 3]>();

        // SAFETY: The node is 24 bytes aligned to 16, which fits [u64; 3].
        unsafe {
            node.write([i; 3]);
        }

        nodes.push(node);
    }

    println!(
        "Allocated {} nodes in {} block(s), capacity {}",
        pool.len(),
        pool.block_count(),
        pool.capacity()
    );

    for node in &nodes {
        // SAFETY: We wrote this value above and nothing else touched the node.
        let value = unsafe { node.read() };
        println!("Node contains {value:?}");
    }

    // Give back the third node. It is the next one to be handed out.
    let third = nodes.remove(2);

    // SAFETY: The node came from this pool and is freed once. Its value is plain data.
    unsafe {
        pool.free(third.cast());
    }

    let reused = pool.allocate()?;
    println!("Freed node {third:p}, next allocation is {reused:p}");
    assert_eq!(reused, third.cast());

    // The pool grows by whole blocks once the free nodes run out.
    for _ in 0..20 {
        _ = pool.allocate()?;
    }

    println!(
        "Now {} nodes in {} blocks, capacity {}",
        pool.len(),
        pool.block_count(),
        pool.capacity()
    );

    println!("All blocks are released when the pool is dropped");
    println!("NodePool example completed successfully!");

    Ok(())
}
