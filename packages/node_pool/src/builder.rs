use std::num::NonZero;

use raw_memory::{AlignedMemory, SystemMemory};

use crate::NodePool;
use crate::pool::DEFAULT_MIN_BLOCK_CAPACITY;

/// Builder for creating an instance of [`NodePool`].
///
/// All settings are optional. By default the pool draws blocks from [`SystemMemory`] and seeds
/// block growth with a capacity of 4 nodes.
///
/// # Examples
///
/// ```
/// use new_zealand::nz;
/// use node_pool::NodePool;
/// use raw_memory::SystemMemory;
///
/// let pool = NodePool::<32>::builder()
///     .memory(SystemMemory)
///     .min_block_capacity(nz!(64))
///     .build();
///
/// assert_eq!(pool.capacity(), 0);
/// ```
#[derive(Debug)]
#[must_use]
pub struct NodePoolBuilder<const NODE_SIZE: usize, M = SystemMemory> {
    memory: M,
    min_block_capacity: NonZero<usize>,
}

impl<const NODE_SIZE: usize> NodePoolBuilder<NODE_SIZE> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            memory: SystemMemory,
            min_block_capacity: DEFAULT_MIN_BLOCK_CAPACITY,
        }
    }
}

impl<const NODE_SIZE: usize, M> NodePoolBuilder<NODE_SIZE, M>
where
    M: AlignedMemory,
{
    /// Sets the memory the pool draws its blocks from.
    ///
    /// Pass a reference (`&memory`) to keep access to the memory while the pool uses it.
    #[inline]
    pub fn memory<M2>(self, memory: M2) -> NodePoolBuilder<NODE_SIZE, M2>
    where
        M2: AlignedMemory,
    {
        NodePoolBuilder {
            memory,
            min_block_capacity: self.min_block_capacity,
        }
    }

    /// Sets the capacity that block growth is seeded with while the pool is small.
    ///
    /// Each new block holds `max(total capacity, min_block_capacity)` nodes plus half of that.
    /// A larger value means fewer, larger blocks for pools that are known to hold many nodes.
    #[inline]
    pub fn min_block_capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.min_block_capacity = capacity;
        self
    }

    /// Builds the pool with the specified configuration. No memory is allocated yet.
    #[must_use]
    #[inline]
    pub fn build(self) -> NodePool<NODE_SIZE, M> {
        NodePool::new_inner(self.memory, self.min_block_capacity)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(NodePoolBuilder<16>: Send, Sync);

    #[test]
    fn default_seed_gives_six_node_block() {
        let mut pool = NodePool::<16>::builder().build();

        _ = pool.allocate().unwrap();

        assert_eq!(pool.capacity(), 6);
    }

    #[test]
    fn larger_seed_gives_larger_blocks() {
        let mut pool = NodePool::<16>::builder()
            .min_block_capacity(nz!(100))
            .build();

        _ = pool.allocate().unwrap();

        assert_eq!(pool.capacity(), 150);
    }

    #[test]
    fn seed_below_total_capacity_is_ignored() {
        let mut pool = NodePool::<16>::builder().min_block_capacity(nz!(1)).build();

        // 1 -> 2, then 2 -> 3 (total 5), then 5 -> 7 (total 12)
        for _ in 0..6 {
            _ = pool.allocate().unwrap();
        }

        assert_eq!(pool.capacity(), 12);
        assert_eq!(pool.block_count(), 3);
    }

    #[test]
    fn memory_by_reference() {
        let memory = SystemMemory;

        let mut pool = NodePool::<16>::builder().memory(&memory).build();

        _ = pool.allocate().unwrap();
        assert_eq!(*pool.memory(), &memory);
    }
}
