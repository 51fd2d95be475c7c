use std::fmt;
use std::num::NonZero;
use std::ptr::NonNull;

use new_zealand::nz;
use raw_memory::{AlignedMemory, Error, SystemMemory, grow_once};
use tracing::{debug, warn};

use crate::block::BlockHeader;
use crate::node::{NODE_ALIGN, Node};
use crate::{NodePoolBuilder, Result};

/// Smallest number of nodes the pool seeds block growth with, unless configured otherwise.
pub(crate) const DEFAULT_MIN_BLOCK_CAPACITY: NonZero<usize> = nz!(4);

/// A pool of fixed-size memory nodes, each `NODE_SIZE` bytes and aligned to 16 bytes.
///
/// Nodes are carved out of blocks obtained from an [`AlignedMemory`]. Vacant nodes form an
/// intrusive free list: [`allocate()`](Self::allocate) takes the most recently freed node and
/// [`free()`](Self::free) puts a node back at the front, so reuse is last-in-first-out.
///
/// When the free list runs dry, the pool allocates a new block whose node count is derived from
/// the total capacity so far (`max(capacity, 4)` plus half of that), so the pool grows
/// geometrically. Blocks are never released while the pool exists. Dropping the pool releases
/// every block at once, regardless of whether nodes are still handed out.
///
/// The pool deals in raw, uninitialized memory only. It never constructs or drops values placed
/// in its nodes.
///
/// # Example
///
/// ```
/// use node_pool::NodePool;
///
/// let mut pool = NodePool::<16>::new();
///
/// let first = pool.allocate()?;
/// let second = pool.allocate()?;
/// assert_ne!(first, second);
///
/// // SAFETY: The node came from this pool and is released once.
/// unsafe { pool.free(second) };
///
/// // The most recently freed node is handed out next.
/// assert_eq!(pool.allocate()?, second);
/// # Ok::<(), raw_memory::Error>(())
/// ```
///
/// # Thread safety
///
/// The pool can be moved to another thread if its memory can ([`Send`]) but it cannot be shared
/// between threads ([`Sync`]) because every operation mutates the free list.
pub struct NodePool<const NODE_SIZE: usize, M = SystemMemory>
where
    M: AlignedMemory,
{
    memory: M,

    /// The most recently allocated block, which links to the one before it.
    newest_block: Option<NonNull<BlockHeader<NODE_SIZE>>>,

    /// Head of the free list. `None` means every node is handed out.
    first_free: Option<NonNull<Node<NODE_SIZE>>>,

    /// Total nodes across all blocks.
    capacity: usize,

    block_count: usize,

    /// Nodes currently handed out.
    in_use: usize,

    min_block_capacity: NonZero<usize>,
}

impl<const NODE_SIZE: usize> NodePool<NODE_SIZE> {
    /// Creates an empty pool that draws blocks from the global allocator.
    ///
    /// Does not allocate until the first node is requested.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring the pool.
    ///
    /// # Example
    ///
    /// ```
    /// use new_zealand::nz;
    /// use node_pool::NodePool;
    ///
    /// let pool = NodePool::<64>::builder().min_block_capacity(nz!(32)).build();
    /// # drop(pool);
    /// ```
    pub fn builder() -> NodePoolBuilder<NODE_SIZE> {
        NodePoolBuilder::new()
    }
}

impl<const NODE_SIZE: usize, M> NodePool<NODE_SIZE, M>
where
    M: AlignedMemory,
{
    /// Creates an empty pool that draws blocks from the given memory.
    #[must_use]
    pub fn new_in(memory: M) -> Self {
        Self::new_inner(memory, DEFAULT_MIN_BLOCK_CAPACITY)
    }

    pub(crate) fn new_inner(memory: M, min_block_capacity: NonZero<usize>) -> Self {
        const {
            assert!(NODE_SIZE > 0, "NodePool must have non-zero node size");
        }

        Self {
            memory,
            newest_block: None,
            first_free: None,
            capacity: 0,
            block_count: 0,
            in_use: 0,
            min_block_capacity,
        }
    }

    /// Hands out the memory of one node, `NODE_SIZE` bytes aligned to 16.
    ///
    /// The memory is uninitialized and remains valid until it is returned via
    /// [`free()`](Self::free) or the pool is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool had no vacant node and could not allocate a new block. The
    /// pool is unchanged in that case.
    pub fn allocate(&mut self) -> Result<NonNull<u8>> {
        let node = match self.first_free {
            Some(node) => node,
            None => self.add_block()?,
        };

        // SAFETY: Every node on the free list lies within a live block and has its link set.
        self.first_free = unsafe { Node::next_free(node) };

        // SAFETY: As above. Clearing the link marks the node as handed out.
        unsafe {
            Node::set_next_free(node, None);
        }

        // Cannot overflow because every handed out node is counted in `capacity`.
        self.in_use = self.in_use.wrapping_add(1);

        Ok(Node::memory(node))
    }

    /// Returns the memory of a node to the pool. It is the first to be handed out again.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was returned by [`allocate()`](Self::allocate) on this
    /// same pool and has not been freed since. Any value placed in the memory must already have
    /// been dropped or moved out, and the memory must not be used afterwards.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        // SAFETY: The caller guarantees the pointer is the memory of a node from this pool.
        let node = unsafe { Node::<NODE_SIZE>::from_memory(ptr) };

        // SAFETY: The node is in one of our live blocks, per the caller's guarantee.
        unsafe {
            Node::set_next_free(node, self.first_free);
        }

        self.first_free = Some(node);

        // Cannot underflow because the caller guarantees the node was handed out.
        self.in_use = self.in_use.wrapping_sub(1);
    }

    /// Total number of nodes across all blocks, handed out or vacant.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks the pool has allocated.
    #[must_use]
    #[inline]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Number of nodes currently handed out.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.in_use
    }

    /// Whether no nodes are currently handed out.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    /// Size in bytes of the memory behind every node.
    #[must_use]
    #[inline]
    #[expect(clippy::unused_self, reason = "read alongside the other pool properties")]
    pub fn node_size(&self) -> usize {
        NODE_SIZE
    }

    /// Alignment of the memory behind every node.
    #[must_use]
    #[inline]
    #[expect(clippy::unused_self, reason = "read alongside the other pool properties")]
    pub fn node_align(&self) -> usize {
        NODE_ALIGN
    }

    /// The memory the pool draws blocks from.
    #[must_use]
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Allocates a new block, links its nodes into the free list and returns the first of them.
    ///
    /// Only called when the free list is empty. On failure, nothing is modified.
    fn add_block(&mut self) -> Result<NonNull<Node<NODE_SIZE>>> {
        debug_assert!(self.first_free.is_none());

        let seed = self.capacity.max(self.min_block_capacity.get());
        let block_capacity = NonZero::new(grow_once(seed))
            .expect("growing a non-zero capacity always yields a non-zero capacity");

        let bytes = BlockHeader::<NODE_SIZE>::size_for(block_capacity)?;
        let align = BlockHeader::<NODE_SIZE>::ALIGN;

        let Some(memory) = self.memory.allocate(bytes, align) else {
            warn!(bytes, align, "node pool block allocation failed");
            return Err(Error::BadAlloc { bytes, align });
        };

        // SAFETY: The memory was just allocated with the size and alignment the block requires.
        // The free list is empty, so the new nodes terminate it.
        let (block, first) =
            unsafe { BlockHeader::initialize(memory, block_capacity, self.newest_block, None) };

        self.newest_block = Some(block);
        self.first_free = Some(first);
        self.capacity = self.capacity.saturating_add(block_capacity.get());
        self.block_count = self.block_count.saturating_add(1);

        debug!(
            node_size = NODE_SIZE,
            block_capacity = block_capacity.get(),
            total_capacity = self.capacity,
            block_count = self.block_count,
            "node pool grew by one block"
        );

        Ok(first)
    }
}

impl<const NODE_SIZE: usize> Default for NodePool<NODE_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const NODE_SIZE: usize, M> Drop for NodePool<NODE_SIZE, M>
where
    M: AlignedMemory,
{
    fn drop(&mut self) {
        let mut current = self.newest_block.take();

        while let Some(block) = current {
            // SAFETY: Every block on the list is live until we free it right below.
            current = unsafe { block.as_ref() }.previous;

            // SAFETY: The block came from our memory with this alignment and is freed once,
            // after which we never touch it again.
            unsafe {
                self.memory.free(block.cast(), BlockHeader::<NODE_SIZE>::ALIGN);
            }
        }
    }
}

impl<const NODE_SIZE: usize, M> fmt::Debug for NodePool<NODE_SIZE, M>
where
    M: AlignedMemory + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("memory", &self.memory)
            .field("newest_block", &self.newest_block)
            .field("first_free", &self.first_free)
            .field("capacity", &self.capacity)
            .field("block_count", &self.block_count)
            .field("in_use", &self.in_use)
            .field("min_block_capacity", &self.min_block_capacity)
            .finish()
    }
}

// SAFETY: The pool exclusively owns its blocks. Nothing in them is tied to the creating thread,
// so the pool may move wherever its memory may.
unsafe impl<const NODE_SIZE: usize, M> Send for NodePool<NODE_SIZE, M> where
    M: AlignedMemory + Send
{
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::collections::HashSet;
    use std::slice;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(NodePool<16>: Send, Default);
    assert_not_impl_any!(NodePool<16>: Sync);

    #[test]
    fn new_does_not_allocate() {
        let pool = NodePool::<16>::new();

        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.block_count(), 0);
        assert!(pool.is_empty());
        assert_eq!(pool.node_size(), 16);
        assert_eq!(pool.node_align(), 16);
    }

    #[test]
    fn first_block_holds_six_nodes() {
        let mut pool = NodePool::<16>::new();

        _ = pool.allocate().unwrap();

        assert_eq!(pool.capacity(), 6);
        assert_eq!(pool.block_count(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn block_sizes_follow_total_capacity() {
        let mut pool = NodePool::<8>::new();
        let mut capacities = Vec::new();

        for _ in 0..37 {
            _ = pool.allocate().unwrap();

            if capacities.last() != Some(&pool.capacity()) {
                capacities.push(pool.capacity());
            }
        }

        // Blocks of 6, 9 and 22 nodes.
        assert_eq!(capacities, [6, 15, 37]);
        assert_eq!(pool.block_count(), 3);
    }

    #[test]
    fn freed_node_is_reused_first() {
        let mut pool = NodePool::<16>::new();

        let nodes: Vec<_> = (0..5).map(|_| pool.allocate().unwrap()).collect();

        unsafe {
            pool.free(nodes[2]);
        }

        assert_eq!(pool.allocate().unwrap(), nodes[2]);
    }

    #[test]
    fn reuse_is_last_in_first_out() {
        let mut pool = NodePool::<32>::new();

        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        let c = pool.allocate().unwrap();

        unsafe {
            pool.free(a);
            pool.free(c);
            pool.free(b);
        }

        assert_eq!(pool.allocate().unwrap(), b);
        assert_eq!(pool.allocate().unwrap(), c);
        assert_eq!(pool.allocate().unwrap(), a);
        assert_eq!(pool.block_count(), 1);
    }

    #[test]
    fn handed_out_nodes_are_distinct_and_aligned() {
        let mut pool = NodePool::<24>::new();
        let mut seen = HashSet::new();

        for _ in 0..100 {
            let node = pool.allocate().unwrap();

            assert_eq!(node.addr().get() % NODE_ALIGN, 0);
            assert!(seen.insert(node), "node handed out twice");
        }

        assert_eq!(pool.len(), 100);
    }

    #[test]
    fn node_memory_is_fully_usable() {
        let mut pool = NodePool::<40>::new();

        let nodes: Vec<_> = (0..20).map(|_| pool.allocate().unwrap()).collect();

        for (i, node) in nodes.iter().enumerate() {
            unsafe {
                node.write_bytes(u8::try_from(i).unwrap(), 40);
            }
        }

        for (i, node) in nodes.iter().enumerate() {
            let bytes = unsafe { slice::from_raw_parts(node.as_ptr(), 40) };
            assert!(bytes.iter().all(|b| usize::from(*b) == i));
        }
    }

    #[test]
    fn free_then_allocate_does_not_grow() {
        let mut pool = NodePool::<16>::new();

        for _ in 0..1000 {
            let node = pool.allocate().unwrap();
            unsafe {
                pool.free(node);
            }
        }

        assert_eq!(pool.block_count(), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn odd_node_sizes_work() {
        let mut pool = NodePool::<1>::new();

        let first = pool.allocate().unwrap();
        let second = pool.allocate().unwrap();

        unsafe {
            first.write(1);
            second.write(2);

            assert_eq!(first.read(), 1);
            assert_eq!(second.read(), 2);
        }
    }

    #[test]
    fn debug_mentions_capacity() {
        let pool = NodePool::<16>::new();

        let output = format!("{pool:?}");

        assert!(output.contains("capacity"));
    }
}
