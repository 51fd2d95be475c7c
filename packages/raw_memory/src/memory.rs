use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

/// Alignment used by the containers when the caller does not ask for a specific one.
pub const DEFAULT_ALIGN: usize = 16;

/// A source of raw, aligned byte buffers.
///
/// This is the leaf of every container in this workspace: it knows nothing about the values
/// stored in the memory. Failure is reported as `None` and is never retried by the implementation.
///
/// Implementations must be able to release a buffer given only its pointer and alignment - the
/// size is not passed back to [`free()`](Self::free).
pub trait AlignedMemory {
    /// Allocates `bytes` bytes aligned to `align`, which must be a power of two.
    ///
    /// A request for zero bytes succeeds and returns a unique pointer that must still be released
    /// via [`free()`](Self::free).
    ///
    /// Returns `None` if the memory cannot be provided or if `align` is not a power of two.
    fn allocate(&self, bytes: usize, align: usize) -> Option<NonNull<u8>>;

    /// Releases a buffer previously returned by this memory.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was returned by [`allocate()`](Self::allocate) or
    /// [`reallocate()`](Self::reallocate) on this same memory with the same `align` and that it
    /// has not already been released.
    unsafe fn free(&self, ptr: NonNull<u8>, align: usize);

    /// Resizes a buffer to `new_bytes`, preserving the first `min(old_bytes, new_bytes)` bytes.
    ///
    /// On success, the old pointer must no longer be used. On failure, `None` is returned and the
    /// old buffer remains valid and unchanged.
    ///
    /// The provided implementation allocates a new buffer, copies the contents and frees the old
    /// buffer.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` is a live buffer from this memory, allocated with
    /// `align`, and that `old_bytes` does not exceed the size it was allocated with.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_bytes: usize,
        new_bytes: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        let new_ptr = self.allocate(new_bytes, align)?;

        // SAFETY: The old buffer is valid for `old_bytes` reads per the safety contract and the
        // new buffer is valid for `new_bytes` writes. The two are distinct live allocations.
        unsafe {
            ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_bytes.min(new_bytes));
        }

        // SAFETY: Forwarding the caller's guarantee that `ptr` is a live buffer from this memory.
        unsafe {
            self.free(ptr, align);
        }

        Some(new_ptr)
    }
}

impl<M> AlignedMemory for &M
where
    M: AlignedMemory + ?Sized,
{
    #[inline]
    fn allocate(&self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
        (**self).allocate(bytes, align)
    }

    #[inline]
    unsafe fn free(&self, ptr: NonNull<u8>, align: usize) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { (**self).free(ptr, align) }
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_bytes: usize,
        new_bytes: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { (**self).reallocate(ptr, old_bytes, new_bytes, align) }
    }
}

/// [`AlignedMemory`] backed by the Rust global allocator.
///
/// Each buffer is preceded by a header that records the requested size, which is what allows
/// [`free()`](AlignedMemory::free) to work with only the alignment. The header occupies
/// `max(align, size_of::<usize>())` bytes so the returned pointer keeps the requested alignment.
///
/// This type is zero-sized and all instances are interchangeable.
///
/// # Example
///
/// ```
/// use raw_memory::{AlignedMemory, SystemMemory};
///
/// let memory = SystemMemory;
///
/// let buffer = memory.allocate(100, 64).expect("allocation should succeed");
/// assert_eq!(buffer.as_ptr() as usize % 64, 0);
///
/// // SAFETY: The buffer came from this memory with the same alignment.
/// unsafe {
///     memory.free(buffer, 64);
/// }
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[allow(
    clippy::exhaustive_structs,
    reason = "a unit struct that will never gain fields"
)]
pub struct SystemMemory;

impl SystemMemory {
    /// Size of the header in front of each buffer, which is also the alignment of the underlying
    /// allocation. Both inputs are powers of two, so the maximum is as well.
    fn header_size(align: usize) -> usize {
        align.max(size_of::<usize>())
    }

    fn block_layout(bytes: usize, align: usize) -> Option<Layout> {
        let header_size = Self::header_size(align);

        Layout::from_size_align(header_size.checked_add(bytes)?, header_size).ok()
    }

    /// Pointer to the size slot, which is the last `usize` of the header.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` is a user pointer returned by this memory.
    unsafe fn size_slot(ptr: NonNull<u8>) -> NonNull<usize> {
        #[allow(
            clippy::cast_ptr_alignment,
            reason = "user pointers are aligned to at least size_of::<usize>()"
        )]
        let slot = ptr.cast::<usize>();

        // SAFETY: The header is at least one usize long and directly precedes the user pointer,
        // so stepping back one usize stays inside the same allocation.
        unsafe { slot.sub(1) }
    }
}

impl AlignedMemory for SystemMemory {
    fn allocate(&self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
        if !align.is_power_of_two() {
            return None;
        }

        let layout = Self::block_layout(bytes, align)?;

        // SAFETY: The layout always has a non-zero size because it includes the header.
        let base = NonNull::new(unsafe { alloc::alloc(layout) })?;

        // SAFETY: The allocation is header_size + bytes long, so offsetting by the header size
        // lands inside it (or one past the end if bytes is zero, which is still valid).
        let user = unsafe { base.add(layout.align()) };

        // SAFETY: The size slot lies within the header of the allocation we just made.
        let size_slot = unsafe { Self::size_slot(user) };

        // SAFETY: The size slot is valid for writes and aligned for usize because the header
        // size is a multiple of size_of::<usize>().
        unsafe {
            size_slot.write(bytes);
        }

        Some(user)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, align: usize) {
        // SAFETY: The caller guarantees that `ptr` is a user pointer from this memory.
        let size_slot = unsafe { Self::size_slot(ptr) };

        // SAFETY: The size slot was written when the buffer was allocated.
        let bytes = unsafe { size_slot.read() };

        let layout = Self::block_layout(bytes, align)
            .expect("layout was valid when the buffer was allocated with the same alignment");

        // SAFETY: The user pointer is exactly one header past the start of the allocation.
        let base = unsafe { ptr.sub(layout.align()) };

        // SAFETY: `base` was allocated by the global allocator with this exact layout.
        unsafe {
            alloc::dealloc(base.as_ptr(), layout);
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_bytes: usize,
        new_bytes: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        // SAFETY: The caller guarantees that `ptr` is a user pointer from this memory.
        let size_slot = unsafe { Self::size_slot(ptr) };

        // SAFETY: The size slot was written when the buffer was allocated.
        let allocated_bytes = unsafe { size_slot.read() };

        debug_assert!(
            old_bytes <= allocated_bytes,
            "reallocate() claims {old_bytes} bytes of a {allocated_bytes} byte buffer"
        );

        let old_layout = Self::block_layout(allocated_bytes, align)
            .expect("layout was valid when the buffer was allocated with the same alignment");
        let new_layout = Self::block_layout(new_bytes, align)?;

        // SAFETY: The user pointer is exactly one header past the start of the allocation.
        let base = unsafe { ptr.sub(old_layout.align()) };

        // SAFETY: `base` was allocated by the global allocator with `old_layout`, the new size is
        // non-zero and was validated by Layout::from_size_align() against the same alignment.
        let new_base =
            NonNull::new(unsafe { alloc::realloc(base.as_ptr(), old_layout, new_layout.size()) })?;

        // SAFETY: The new allocation is header_size + new_bytes long.
        let user = unsafe { new_base.add(new_layout.align()) };

        // SAFETY: The size slot lies within the header of the new allocation.
        let size_slot = unsafe { Self::size_slot(user) };

        // SAFETY: The size slot is valid for writes and aligned for usize.
        unsafe {
            size_slot.write(new_bytes);
        }

        Some(user)
    }
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
    use std::cell::Cell;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SystemMemory: Send, Sync, Copy, Default);

    #[test]
    fn smoke_test() {
        let memory = SystemMemory;

        let buffer = memory.allocate(32, 16).unwrap();
        assert_eq!(buffer.as_ptr() as usize % 16, 0);

        unsafe {
            for i in 0..32_u8 {
                buffer.add(usize::from(i)).write(i);
            }

            for i in 0..32_u8 {
                assert_eq!(buffer.add(usize::from(i)).read(), i);
            }

            memory.free(buffer, 16);
        }
    }

    #[test]
    fn honors_various_alignments() {
        let memory = SystemMemory;

        for align in [1, 2, 4, 8, 16, 32, 64, 128, 4096] {
            let buffer = memory.allocate(10, align).unwrap();
            assert_eq!(buffer.as_ptr() as usize % align, 0, "alignment {align}");

            unsafe {
                memory.free(buffer, align);
            }
        }
    }

    #[test]
    fn zero_bytes_is_valid() {
        let memory = SystemMemory;

        let buffer = memory.allocate(0, 16).unwrap();

        unsafe {
            memory.free(buffer, 16);
        }
    }

    #[test]
    fn rejects_invalid_alignment() {
        let memory = SystemMemory;

        assert!(memory.allocate(8, 0).is_none());
        assert!(memory.allocate(8, 3).is_none());
        assert!(memory.allocate(8, 24).is_none());
    }

    #[test]
    fn rejects_impossible_size() {
        let memory = SystemMemory;

        assert!(memory.allocate(usize::MAX, 16).is_none());
        assert!(memory.allocate(usize::MAX / 2 + 1, 16).is_none());
    }

    #[test]
    fn reallocate_preserves_contents() {
        let memory = SystemMemory;

        let buffer = memory.allocate(8, 32).unwrap();

        unsafe {
            for i in 0..8_u8 {
                buffer.add(usize::from(i)).write(i * 3);
            }

            let grown = memory.reallocate(buffer, 8, 1000, 32).unwrap();
            assert_eq!(grown.as_ptr() as usize % 32, 0);

            for i in 0..8_u8 {
                assert_eq!(grown.add(usize::from(i)).read(), i * 3);
            }

            let shrunk = memory.reallocate(grown, 1000, 4, 32).unwrap();

            for i in 0..4_u8 {
                assert_eq!(shrunk.add(usize::from(i)).read(), i * 3);
            }

            memory.free(shrunk, 32);
        }
    }

    /// Memory that only implements the required methods, to exercise the provided `reallocate()`.
    #[derive(Default)]
    struct MinimalMemory {
        frees: Cell<usize>,
    }

    impl AlignedMemory for MinimalMemory {
        fn allocate(&self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
            SystemMemory.allocate(bytes, align)
        }

        unsafe fn free(&self, ptr: NonNull<u8>, align: usize) {
            self.frees.set(self.frees.get() + 1);
            unsafe { SystemMemory.free(ptr, align) }
        }
    }

    #[test]
    fn provided_reallocate_copies_and_frees() {
        let memory = MinimalMemory::default();

        let buffer = memory.allocate(4, 16).unwrap();

        unsafe {
            buffer.cast::<u32>().write(0xDEAD_BEEF);

            let grown = memory.reallocate(buffer, 4, 64, 16).unwrap();
            assert_eq!(memory.frees.get(), 1);
            assert_eq!(grown.cast::<u32>().read(), 0xDEAD_BEEF);

            memory.free(grown, 16);
        }

        assert_eq!(memory.frees.get(), 2);
    }

    #[test]
    fn shared_reference_forwards() {
        let memory = MinimalMemory::default();
        let by_ref = &memory;

        let buffer = by_ref.allocate(16, 16).unwrap();

        unsafe {
            by_ref.free(buffer, 16);
        }

        assert_eq!(memory.frees.get(), 1);
    }
}
