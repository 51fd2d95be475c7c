//! Builder configuration example for `NodePool`.
//!
//! This example shows how the builder selects the memory a pool draws its blocks from and how the
//! minimum block capacity shapes block growth.

use std::cell::Cell;
use std::ptr::NonNull;

use new_zealand::nz;
use node_pool::NodePool;
use raw_memory::{AlignedMemory, SystemMemory};

/// Memory that counts the blocks it hands out.
#[derive(Debug, Default)]
struct CountingMemory {
    blocks: Cell<usize>,
}

impl AlignedMemory for CountingMemory {
    fn allocate(&self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
        let ptr = SystemMemory.allocate(bytes, align)?;
        self.blocks.set(self.blocks.get().wrapping_add(1));
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, align: usize) {
        // SAFETY: Every buffer of this memory came from SystemMemory with the same alignment.
        unsafe {
            SystemMemory.free(ptr, align);
        }
    }
}

fn fill(pool: &mut NodePool<64, &CountingMemory>, count: usize) {
    for _ in 0..count {
        _ = pool.allocate().unwrap();
    }
}

fn main() {
    // Default settings: blocks of 6, 9, 22, 55, ... nodes.
    let memory = CountingMemory::default();
    let mut pool = NodePool::<64>::builder().memory(&memory).build();

    fill(&mut pool, 100);

    println!(
        "Default growth: {} nodes in {} blocks, {} block allocations",
        pool.capacity(),
        pool.block_count(),
        memory.blocks.get()
    );

    // A pool known to hold many nodes starts with a large first block.
    let memory = CountingMemory::default();
    let mut pool = NodePool::<64>::builder()
        .memory(&memory)
        .min_block_capacity(nz!(100))
        .build();

    fill(&mut pool, 100);

    println!(
        "Minimum block capacity 100: {} nodes in {} blocks, {} block allocations",
        pool.capacity(),
        pool.block_count(),
        memory.blocks.get()
    );
    assert_eq!(pool.block_count(), 1);
    assert_eq!(pool.capacity(), 150);

    drop(pool);

    println!("Builder example completed successfully!");
}
