use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;

/// Alignment of the memory handed out for every node.
pub const NODE_ALIGN: usize = 16;

/// The caller-visible storage of a node.
#[repr(C, align(16))]
#[allow(
    dead_code,
    reason = "only ever accessed through the raw pointers handed out by the pool"
)]
pub(crate) struct Payload<const NODE_SIZE: usize>([MaybeUninit<u8>; NODE_SIZE]);

/// One slot of a block. While the node is vacant, `next_free` links it into the free list.
/// While it is handed out, `next_free` is `None` and the caller owns `memory`.
#[repr(C)]
pub(crate) struct Node<const NODE_SIZE: usize> {
    pub(crate) next_free: Option<NonNull<Self>>,
    pub(crate) memory: Payload<NODE_SIZE>,
}

impl<const NODE_SIZE: usize> Node<NODE_SIZE> {
    /// Distance in bytes from the start of a node to the start of its memory.
    pub(crate) const MEMORY_OFFSET: usize = mem::offset_of!(Self, memory);

    /// Pointer to the memory of the node.
    pub(crate) fn memory(node: NonNull<Self>) -> NonNull<u8> {
        // SAFETY: The memory field lies within the node, so the offset stays in bounds.
        unsafe { node.byte_add(Self::MEMORY_OFFSET) }.cast()
    }

    /// Recovers the node from a pointer returned by [`memory()`](Self::memory).
    ///
    /// # Safety
    ///
    /// The caller must ensure that `memory` was obtained from [`memory()`](Self::memory) of a
    /// node that is still allocated.
    pub(crate) unsafe fn from_memory(memory: NonNull<u8>) -> NonNull<Self> {
        // SAFETY: The caller guarantees `memory` is MEMORY_OFFSET bytes into a live node.
        unsafe { memory.byte_sub(Self::MEMORY_OFFSET) }.cast()
    }

    /// Sets the free list link of a node.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `node` points to storage of a node within a live block.
    pub(crate) unsafe fn set_next_free(node: NonNull<Self>, next: Option<NonNull<Self>>) {
        // SAFETY: The caller guarantees `node` is valid. We write only the link field and never
        // create a reference to the memory, which the caller may be using.
        unsafe {
            (&raw mut (*node.as_ptr()).next_free).write(next);
        }
    }

    /// Reads the free list link of a node.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `node` points to a node within a live block whose link has
    /// been initialized by [`set_next_free()`](Self::set_next_free).
    pub(crate) unsafe fn next_free(node: NonNull<Self>) -> Option<NonNull<Self>> {
        // SAFETY: Forwarding the caller's guarantee that the link is initialized.
        unsafe { (&raw const (*node.as_ptr()).next_free).read() }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use super::*;

    #[test]
    fn memory_is_aligned_within_node() {
        assert_eq!(Node::<1>::MEMORY_OFFSET % NODE_ALIGN, 0);
        assert_eq!(Node::<16>::MEMORY_OFFSET % NODE_ALIGN, 0);
        assert_eq!(Node::<100>::MEMORY_OFFSET % NODE_ALIGN, 0);

        assert_eq!(align_of::<Node<1>>(), NODE_ALIGN);
        assert_eq!(size_of::<Node<16>>() % NODE_ALIGN, 0);
    }

    #[test]
    fn node_holds_full_payload() {
        assert!(size_of::<Node<16>>() >= Node::<16>::MEMORY_OFFSET + 16);
        assert!(size_of::<Node<33>>() >= Node::<33>::MEMORY_OFFSET + 33);
    }

    #[test]
    fn memory_round_trips_to_node() {
        let mut node = MaybeUninit::<Node<24>>::uninit();
        let node = NonNull::from(&mut node).cast::<Node<24>>();

        let memory = Node::memory(node);
        assert_eq!(memory.addr().get() % NODE_ALIGN, 0);

        assert_eq!(unsafe { Node::from_memory(memory) }, node);
    }

    #[test]
    fn link_reads_back() {
        let mut first = MaybeUninit::<Node<8>>::uninit();
        let mut second = MaybeUninit::<Node<8>>::uninit();
        let first = NonNull::from(&mut first).cast::<Node<8>>();
        let second = NonNull::from(&mut second).cast::<Node<8>>();

        unsafe {
            Node::set_next_free(first, Some(second));
            Node::set_next_free(second, None);

            assert_eq!(Node::next_free(first), Some(second));
            assert_eq!(Node::next_free(second), None);
        }
    }
}
