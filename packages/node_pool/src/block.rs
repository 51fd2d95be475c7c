use std::num::NonZero;
use std::ptr::NonNull;

use raw_memory::Error;

use crate::node::Node;

/// Sits at the start of every block, followed by the nodes of the block.
///
/// Blocks form a singly linked list from the newest to the oldest, which is only walked when
/// the pool is dropped.
#[repr(C)]
pub(crate) struct BlockHeader<const NODE_SIZE: usize> {
    pub(crate) previous: Option<NonNull<Self>>,
    pub(crate) capacity: NonZero<usize>,
}

impl<const NODE_SIZE: usize> BlockHeader<NODE_SIZE> {
    /// Distance in bytes from the start of a block to its first node.
    pub(crate) const NODES_OFFSET: usize =
        size_of::<Self>().next_multiple_of(align_of::<Node<NODE_SIZE>>());

    /// Alignment of the memory a block is allocated in.
    pub(crate) const ALIGN: usize = if align_of::<Self>() > align_of::<Node<NODE_SIZE>>() {
        align_of::<Self>()
    } else {
        align_of::<Node<NODE_SIZE>>()
    };

    /// Size in bytes of a block holding `capacity` nodes.
    pub(crate) fn size_for(capacity: NonZero<usize>) -> Result<usize, Error> {
        let item_size = size_of::<Node<NODE_SIZE>>();

        capacity
            .get()
            .checked_mul(item_size)
            .and_then(|nodes| nodes.checked_add(Self::NODES_OFFSET))
            .filter(|bytes| *bytes <= isize::MAX.unsigned_abs())
            .ok_or(Error::BadSize {
                count: capacity.get(),
                item_size,
            })
    }

    /// Initializes a block in freshly allocated memory and links its nodes into a free list
    /// that ends in `then`.
    ///
    /// Returns the block and the first node of its free list.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `memory` is valid for writes of
    /// [`size_for(capacity)`](Self::size_for) bytes and aligned to [`ALIGN`](Self::ALIGN).
    pub(crate) unsafe fn initialize(
        memory: NonNull<u8>,
        capacity: NonZero<usize>,
        previous: Option<NonNull<Self>>,
        then: Option<NonNull<Node<NODE_SIZE>>>,
    ) -> (NonNull<Self>, NonNull<Node<NODE_SIZE>>) {
        let block = memory.cast::<Self>();

        // SAFETY: The caller guarantees the memory is valid and aligned for the header.
        unsafe {
            block.write(Self { previous, capacity });
        }

        // SAFETY: The caller guarantees room for the header and `capacity` nodes after it.
        let first = unsafe { memory.byte_add(Self::NODES_OFFSET) }.cast::<Node<NODE_SIZE>>();

        // Link back to front so each node points to its successor.
        let mut next = then;

        for index in (0..capacity.get()).rev() {
            // SAFETY: `index < capacity`, so the node is within the block.
            let node = unsafe { first.add(index) };

            // SAFETY: The node is within memory the caller guarantees is valid for writes.
            unsafe {
                Node::set_next_free(node, next);
            }

            next = Some(node);
        }

        (block, first)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::arithmetic_side_effects,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use new_zealand::nz;
    use raw_memory::{AlignedMemory, SystemMemory};

    use super::*;

    #[test]
    fn nodes_start_aligned() {
        assert_eq!(BlockHeader::<16>::NODES_OFFSET % 16, 0);
        assert!(BlockHeader::<16>::NODES_OFFSET >= size_of::<BlockHeader<16>>());
        assert_eq!(BlockHeader::<16>::ALIGN, 16);
    }

    #[test]
    fn size_covers_header_and_nodes() {
        let size = BlockHeader::<16>::size_for(nz!(6)).unwrap();

        assert_eq!(
            size,
            BlockHeader::<16>::NODES_OFFSET + 6 * size_of::<Node<16>>()
        );
    }

    #[test]
    fn size_overflow_is_bad_size() {
        let error = BlockHeader::<16>::size_for(NonZero::new(usize::MAX).unwrap()).unwrap_err();

        assert!(matches!(
            error,
            Error::BadSize {
                count: usize::MAX,
                ..
            }
        ));
    }

    #[test]
    fn initialize_links_all_nodes_in_order() {
        let capacity = nz!(5);
        let bytes = BlockHeader::<8>::size_for(capacity).unwrap();
        let memory = SystemMemory
            .allocate(bytes, BlockHeader::<8>::ALIGN)
            .unwrap();

        let (block, first) = unsafe { BlockHeader::<8>::initialize(memory, capacity, None, None) };

        assert_eq!(block.cast::<u8>(), memory);
        assert_eq!(unsafe { block.as_ref() }.capacity, capacity);
        assert!(unsafe { block.as_ref() }.previous.is_none());

        let mut current = Some(first);
        let mut seen = 0;

        while let Some(node) = current {
            assert_eq!(node, unsafe { first.add(seen) });
            seen += 1;
            current = unsafe { Node::next_free(node) };
        }

        assert_eq!(seen, 5);

        unsafe {
            SystemMemory.free(memory, BlockHeader::<8>::ALIGN);
        }
    }
}
