use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use tracing::warn;

use crate::{AlignedMemory, Error, Result, SystemMemory};

/// Acquires and releases uninitialized storage for values of one type.
///
/// This is the allocator shape that containers are generic over. It never constructs or drops
/// values - that is the job of the container, typically via the [`uninit`](crate::uninit)
/// utilities.
///
/// An allocator can be [rebound](Self::rebind) to a different value type, producing an
/// equivalent allocator that draws from the same memory. Containers use this to allocate internal
/// bookkeeping types that differ from their element type.
pub trait ElementAllocator: Clone {
    /// The type of value the storage is intended for.
    type Value;

    /// The equivalent allocator for values of type `U`.
    type Rebind<U>: ElementAllocator<Value = U>;

    /// Allocates uninitialized storage for `count` values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadSize`] if the storage size cannot be represented and
    /// [`Error::BadAlloc`] if the memory could not be provided.
    fn allocate(&self, count: usize) -> Result<NonNull<Self::Value>>;

    /// Releases storage obtained from [`allocate()`](Self::allocate).
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was returned by this allocator (or one equal to it) for
    /// `count` values and has not yet been released. Any values in the storage must already have
    /// been dropped or moved out.
    unsafe fn deallocate(&self, ptr: NonNull<Self::Value>, count: usize);

    /// Resizes storage from `old_count` to `new_count` values, preserving the bytes of the first
    /// `min(old_count, new_count)` values.
    ///
    /// On failure the original storage is left intact.
    ///
    /// # Errors
    ///
    /// Same as [`allocate()`](Self::allocate).
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` was returned by this allocator for `old_count` values
    /// and has not yet been released.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<Self::Value>,
        old_count: usize,
        new_count: usize,
    ) -> Result<NonNull<Self::Value>>;

    /// Creates the equivalent allocator for values of type `U`.
    #[must_use]
    fn rebind<U>(&self) -> Self::Rebind<U>;
}

/// An [`ElementAllocator`] that obtains storage from an [`AlignedMemory`].
///
/// Storage is aligned to the larger of `ALIGN` and the natural alignment of `T`. `ALIGN` must be
/// a power of two; this is checked at compile time when the allocator is used.
///
/// With the default [`SystemMemory`], the allocator is zero-sized and all instances with the same
/// `ALIGN` are equal and interchangeable, so containers can create one whenever they need it.
///
/// # Example
///
/// ```
/// use raw_memory::{ElementAllocator, SystemMemory, TypedAllocator};
///
/// let strings = TypedAllocator::<String, SystemMemory, 32>::default();
/// let storage = strings.allocate(3)?;
/// assert_eq!(storage.as_ptr() as usize % 32, 0);
///
/// // The rebound allocator uses the same memory and alignment.
/// let bytes = strings.rebind::<u8>();
/// assert_eq!(TypedAllocator::<u8, SystemMemory, 32>::align(), 32);
///
/// // SAFETY: The storage came from this allocator for 3 values, none of which were written.
/// unsafe { strings.deallocate(storage, 3) };
/// # drop(bytes);
/// # Ok::<(), raw_memory::Error>(())
/// ```
pub struct TypedAllocator<T, M = SystemMemory, const ALIGN: usize = 16> {
    memory: M,

    // Storage for T is handed out as raw pointers, the allocator never owns any T.
    _value: PhantomData<fn() -> T>,
}

impl<T> TypedAllocator<T> {
    /// Creates an allocator that draws from the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_memory(SystemMemory)
    }
}

impl<T, M, const ALIGN: usize> TypedAllocator<T, M, ALIGN> {
    /// Creates an allocator that draws from the given memory.
    #[must_use]
    pub fn with_memory(memory: M) -> Self {
        Self {
            memory,
            _value: PhantomData,
        }
    }

    /// The memory this allocator draws from.
    #[must_use]
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// The alignment of storage returned by this allocator.
    #[must_use]
    pub const fn align() -> usize {
        const {
            assert!(ALIGN.is_power_of_two(), "ALIGN must be a power of two");
        }

        if ALIGN > align_of::<T>() {
            ALIGN
        } else {
            align_of::<T>()
        }
    }

    fn size_of_count(count: usize) -> Result<usize> {
        let item_size = size_of::<T>();

        count
            .checked_mul(item_size)
            .filter(|bytes| *bytes <= isize::MAX.unsigned_abs())
            .ok_or(Error::BadSize { count, item_size })
    }
}

impl<T, M, const ALIGN: usize> ElementAllocator for TypedAllocator<T, M, ALIGN>
where
    M: AlignedMemory + Clone,
{
    type Value = T;
    type Rebind<U> = TypedAllocator<U, M, ALIGN>;

    fn allocate(&self, count: usize) -> Result<NonNull<T>> {
        let bytes = Self::size_of_count(count)?;

        // Nothing to store, so nothing to allocate. deallocate() mirrors this.
        if bytes == 0 {
            return Ok(NonNull::dangling());
        }

        let align = Self::align();

        let Some(ptr) = self.memory.allocate(bytes, align) else {
            warn!(bytes, align, "aligned memory allocation failed");
            return Err(Error::BadAlloc { bytes, align });
        };

        #[allow(
            clippy::cast_ptr_alignment,
            reason = "the memory is aligned to at least align_of::<T>()"
        )]
        let ptr = ptr.cast::<T>();

        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) {
        let bytes = Self::size_of_count(count)
            .expect("the caller guarantees the same count as used for allocation, which was valid");

        if bytes == 0 {
            return;
        }

        // SAFETY: Forwarding the caller's guarantee that the storage came from this allocator,
        // which means it came from our memory with this alignment.
        unsafe {
            self.memory.free(ptr.cast(), Self::align());
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<T>,
        old_count: usize,
        new_count: usize,
    ) -> Result<NonNull<T>> {
        let old_bytes = Self::size_of_count(old_count)?;
        let new_bytes = Self::size_of_count(new_count)?;

        if old_bytes == 0 {
            return self.allocate(new_count);
        }

        if new_bytes == 0 {
            // SAFETY: Forwarding the caller's guarantee about the storage.
            unsafe {
                self.deallocate(ptr, old_count);
            }

            return Ok(NonNull::dangling());
        }

        let align = Self::align();

        // SAFETY: Forwarding the caller's guarantee that the storage came from this allocator,
        // which means it is a live buffer of at least old_bytes from our memory with this alignment.
        let new_ptr = unsafe {
            self.memory
                .reallocate(ptr.cast(), old_bytes, new_bytes, align)
        };

        let Some(new_ptr) = new_ptr else {
            warn!(
                bytes = new_bytes,
                align, "aligned memory reallocation failed"
            );
            return Err(Error::BadAlloc {
                bytes: new_bytes,
                align,
            });
        };

        #[allow(
            clippy::cast_ptr_alignment,
            reason = "the memory is aligned to at least align_of::<T>()"
        )]
        let new_ptr = new_ptr.cast::<T>();

        Ok(new_ptr)
    }

    fn rebind<U>(&self) -> TypedAllocator<U, M, ALIGN> {
        TypedAllocator::with_memory(self.memory.clone())
    }
}

impl<T, M, const ALIGN: usize> Clone for TypedAllocator<T, M, ALIGN>
where
    M: Clone,
{
    fn clone(&self) -> Self {
        Self::with_memory(self.memory.clone())
    }
}

impl<T, M, const ALIGN: usize> Copy for TypedAllocator<T, M, ALIGN> where M: Copy {}

impl<T, M, const ALIGN: usize> Default for TypedAllocator<T, M, ALIGN>
where
    M: Default,
{
    fn default() -> Self {
        Self::with_memory(M::default())
    }
}

impl<T, M, const ALIGN: usize> PartialEq for TypedAllocator<T, M, ALIGN>
where
    M: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.memory == other.memory
    }
}

impl<T, M, const ALIGN: usize> Eq for TypedAllocator<T, M, ALIGN> where M: Eq {}

impl<T, M, const ALIGN: usize> fmt::Debug for TypedAllocator<T, M, ALIGN>
where
    M: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedAllocator")
            .field("memory", &self.memory)
            .field("align", &Self::align())
            .finish_non_exhaustive()
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
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    // The allocator never holds a T, so T does not affect its auto traits.
    assert_impl_all!(TypedAllocator<Rc<u8>>: Send, Sync, Copy, Default, Eq);
    assert_impl_all!(TypedAllocator<String, SystemMemory, 64>: Send, Sync, Copy);
    assert_not_impl_any!(TypedAllocator<u8, Rc<SystemMemory>>: Send, Sync, Copy);

    #[test]
    fn zero_sized_when_stateless() {
        assert_eq!(size_of::<TypedAllocator<u64>>(), 0);
    }

    #[test]
    fn allocate_write_read_deallocate() {
        let allocator = TypedAllocator::<u64>::new();

        let storage = allocator.allocate(8).unwrap();

        unsafe {
            for i in 0..8 {
                storage.add(i).write(i as u64 * 10);
            }

            for i in 0..8 {
                assert_eq!(storage.add(i).read(), i as u64 * 10);
            }

            allocator.deallocate(storage, 8);
        }
    }

    #[test]
    fn default_alignment_is_16() {
        assert_eq!(TypedAllocator::<u8>::align(), 16);

        let allocator = TypedAllocator::<u8>::new();

        for count in [1, 3, 17, 1000] {
            let storage = allocator.allocate(count).unwrap();
            assert_eq!(storage.as_ptr() as usize % 16, 0);

            unsafe {
                allocator.deallocate(storage, count);
            }
        }
    }

    #[test]
    fn natural_alignment_wins_when_larger() {
        #[repr(align(64))]
        struct Wide {
            _data: [u8; 64],
        }

        assert_eq!(TypedAllocator::<Wide>::align(), 64);
        assert_eq!(TypedAllocator::<u8, SystemMemory, 128>::align(), 128);

        let allocator = TypedAllocator::<Wide>::new();
        let storage = allocator.allocate(2).unwrap();
        assert_eq!(storage.as_ptr() as usize % 64, 0);

        unsafe {
            allocator.deallocate(storage, 2);
        }
    }

    #[test]
    fn zero_count_does_not_touch_memory() {
        let allocator = TypedAllocator::<u32>::new();

        let storage = allocator.allocate(0).unwrap();

        unsafe {
            allocator.deallocate(storage, 0);
        }
    }

    #[test]
    fn zero_sized_values_do_not_touch_memory() {
        let allocator = TypedAllocator::<()>::new();

        let storage = allocator.allocate(1_000_000).unwrap();

        unsafe {
            allocator.deallocate(storage, 1_000_000);
        }
    }

    #[test]
    fn overflowing_count_is_bad_size() {
        let allocator = TypedAllocator::<u64>::new();

        let error = allocator.allocate(usize::MAX / 4).unwrap_err();

        assert_eq!(
            error,
            Error::BadSize {
                count: usize::MAX / 4,
                item_size: 8
            }
        );
    }

    #[test]
    fn reallocate_preserves_prefix() {
        let allocator = TypedAllocator::<u32>::new();

        let storage = allocator.allocate(4).unwrap();

        unsafe {
            for i in 0..4_u32 {
                storage.add(i as usize).write(i + 100);
            }

            let grown = allocator.reallocate(storage, 4, 64).unwrap();

            for i in 0..4_u32 {
                assert_eq!(grown.add(i as usize).read(), i + 100);
            }

            allocator.deallocate(grown, 64);
        }
    }

    #[test]
    fn reallocate_from_and_to_nothing() {
        let allocator = TypedAllocator::<u32>::new();

        unsafe {
            let storage = allocator.reallocate(NonNull::dangling(), 0, 10).unwrap();
            storage.write(7);

            let emptied = allocator.reallocate(storage, 10, 0).unwrap();
            assert_eq!(emptied, NonNull::dangling());
        }
    }

    #[derive(Clone, Debug, Default)]
    struct CountingMemory {
        allocations: Rc<Cell<usize>>,
        refuse: bool,
    }

    impl AlignedMemory for CountingMemory {
        fn allocate(&self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
            if self.refuse {
                return None;
            }

            self.allocations.set(self.allocations.get() + 1);
            SystemMemory.allocate(bytes, align)
        }

        unsafe fn free(&self, ptr: NonNull<u8>, align: usize) {
            unsafe { SystemMemory.free(ptr, align) }
        }
    }

    #[test]
    fn rebind_shares_memory() {
        let memory = CountingMemory::default();
        let allocator = TypedAllocator::<u64, _>::with_memory(memory.clone());

        let rebound = allocator.rebind::<[u8; 3]>();

        let storage = rebound.allocate(5).unwrap();
        assert_eq!(memory.allocations.get(), 1);
        assert_eq!(storage.as_ptr() as usize % 16, 0);

        unsafe {
            rebound.deallocate(storage, 5);
        }
    }

    #[test]
    fn failed_memory_is_bad_alloc() {
        let memory = CountingMemory {
            refuse: true,
            ..CountingMemory::default()
        };
        let allocator = TypedAllocator::<u64, _>::with_memory(memory);

        let error = allocator.allocate(3).unwrap_err();

        assert_eq!(
            error,
            Error::BadAlloc {
                bytes: 24,
                align: 16
            }
        );
    }

    #[test]
    fn instances_are_interchangeable() {
        let a = TypedAllocator::<u16>::new();
        let b = TypedAllocator::<u16>::default();
        assert_eq!(a, b);

        // Storage from one can be released through the other.
        let storage = a.allocate(10).unwrap();

        unsafe {
            b.deallocate(storage, 10);
        }
    }
}
