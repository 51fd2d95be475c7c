#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing the container packages.

use std::cell::Cell;
use std::ptr::NonNull;

use raw_memory::{AlignedMemory, SystemMemory};

/// An [`AlignedMemory`] that counts its calls and can be told to fail.
///
/// Memory is obtained from [`SystemMemory`] while the memory is not failing. Borrow it into a
/// container via `&FaultyMemory`, which also implements [`AlignedMemory`], so the test keeps
/// access to the counters.
///
/// Both [`allocate()`](AlignedMemory::allocate) and [`reallocate()`](AlignedMemory::reallocate)
/// draw from the same failure budget.
///
/// # Example
///
/// ```rust
/// use raw_memory::AlignedMemory;
/// use testing::FaultyMemory;
///
/// let memory = FaultyMemory::new();
///
/// memory.fail_all();
/// assert!(memory.allocate(64, 16).is_none());
/// assert_eq!(memory.outstanding(), 0);
/// ```
#[derive(Debug, Default)]
pub struct FaultyMemory {
    inner: SystemMemory,

    allocations: Cell<usize>,
    reallocations: Cell<usize>,
    frees: Cell<usize>,

    /// How many more requests may succeed. `None` means unlimited.
    budget: Cell<Option<usize>>,
}

impl FaultyMemory {
    /// Creates a memory that does not fail until told to.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following request fail until [`allow_all()`](Self::allow_all) is called.
    pub fn fail_all(&self) {
        self.budget.set(Some(0));
    }

    /// Lets `count` more requests succeed, then fails every following one.
    pub fn fail_after(&self, count: usize) {
        self.budget.set(Some(count));
    }

    /// Lets every following request succeed.
    pub fn allow_all(&self) {
        self.budget.set(None);
    }

    /// Number of successful allocations.
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// Number of successful reallocations.
    #[must_use]
    pub fn reallocations(&self) -> usize {
        self.reallocations.get()
    }

    /// Number of buffers released.
    #[must_use]
    pub fn frees(&self) -> usize {
        self.frees.get()
    }

    /// Number of buffers currently allocated and not yet released.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.allocations
            .get()
            .checked_sub(self.frees.get())
            .expect("more buffers were freed than were allocated")
    }

    /// Consumes one unit of budget, returning whether the request may proceed.
    fn admit(&self) -> bool {
        match self.budget.get() {
            None => true,
            Some(0) => false,
            Some(remaining) => {
                self.budget.set(Some(remaining.wrapping_sub(1)));
                true
            }
        }
    }

    fn increment(counter: &Cell<usize>) {
        counter.set(counter.get().wrapping_add(1));
    }
}

impl AlignedMemory for FaultyMemory {
    fn allocate(&self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
        if !self.admit() {
            return None;
        }

        let ptr = self.inner.allocate(bytes, align)?;
        Self::increment(&self.allocations);
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, align: usize) {
        Self::increment(&self.frees);

        // SAFETY: Forwarding safety requirements to the caller. Every buffer we hand out comes
        // from the inner memory.
        unsafe {
            self.inner.free(ptr, align);
        }
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_bytes: usize,
        new_bytes: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        if !self.admit() {
            return None;
        }

        // SAFETY: Forwarding safety requirements to the caller.
        let new_ptr = unsafe { self.inner.reallocate(ptr, old_bytes, new_bytes, align) }?;

        Self::increment(&self.reallocations);
        Some(new_ptr)
    }
}
