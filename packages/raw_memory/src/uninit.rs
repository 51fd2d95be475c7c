//! Constructing, copying and destroying values in raw, uninitialized storage.
//!
//! These are the primitives a container uses to manage the lifetime of its elements manually.
//! None of them allocate or free memory and none of them track which slots are live - that is
//! the caller's bookkeeping.
//!
//! If a clone or a construction closure panics part way through, the values constructed so far
//! are leaked. They are never dropped twice.

use std::ptr::{self, NonNull};

/// Constructs `count` clones of `value` in the storage starting at `dst`.
///
/// Returns a pointer one past the last constructed value.
///
/// # Safety
///
/// The caller must ensure that `dst` is valid for writes of `count` consecutive values and that
/// the storage does not contain live values (they would be overwritten without being dropped).
///
/// # Example
///
/// ```
/// use std::mem::MaybeUninit;
/// use std::ptr::NonNull;
///
/// use raw_memory::uninit;
///
/// let mut storage = [const { MaybeUninit::<String>::uninit() }; 3];
/// let first = NonNull::from(&mut storage).cast::<String>();
///
/// // SAFETY: The storage has room for 3 values and holds none.
/// unsafe { uninit::fill_n(first, 3, &"hi".to_string()) };
///
/// // SAFETY: We constructed 3 values above and drop each exactly once.
/// unsafe {
///     assert_eq!(first.add(2).as_ref(), "hi");
///     uninit::destroy(first, first.add(3));
/// }
/// ```
pub unsafe fn fill_n<T: Clone>(dst: NonNull<T>, count: usize, value: &T) -> NonNull<T> {
    // SAFETY: Forwarding safety requirements to the caller.
    unsafe { fill_with_n(dst, count, || value.clone()) }
}

/// Constructs `count` values produced by `f` in the storage starting at `dst`, in order.
///
/// Returns a pointer one past the last constructed value.
///
/// # Safety
///
/// Same as [`fill_n()`].
pub unsafe fn fill_with_n<T>(dst: NonNull<T>, count: usize, mut f: impl FnMut() -> T) -> NonNull<T> {
    let mut current = dst;

    for _ in 0..count {
        // SAFETY: The caller guarantees room for `count` values from `dst`, and we have written
        // fewer than `count` so far.
        unsafe {
            current.write(f());
        }

        // SAFETY: At most one past the last value of the storage, which is a valid offset.
        current = unsafe { current.add(1) };
    }

    current
}

/// Constructs clones of the `count` values starting at `src` into the storage starting at `dst`,
/// front to back.
///
/// Returns a pointer one past the last constructed value.
///
/// # Safety
///
/// The caller must ensure that:
/// - `src` points to `count` consecutive live values.
/// - `dst` is valid for writes of `count` consecutive values and holds no live values.
/// - The two ranges do not overlap.
pub unsafe fn copy_n<T: Clone>(src: NonNull<T>, count: usize, dst: NonNull<T>) -> NonNull<T> {
    let mut source = src;
    let mut target = dst;

    for _ in 0..count {
        // SAFETY: The caller guarantees `count` live values from `src`.
        let value = unsafe { source.as_ref() }.clone();

        // SAFETY: The caller guarantees room for `count` values from `dst`.
        unsafe {
            target.write(value);
        }

        // SAFETY: Both stay within or one past their ranges.
        source = unsafe { source.add(1) };
        // SAFETY: As above.
        target = unsafe { target.add(1) };
    }

    target
}

/// Constructs clones of the `count` values that end just before `src_end` into the storage that
/// ends just before `dst_end`, back to front.
///
/// Returns a pointer to the first constructed value.
///
/// Iterating from the back allows the destination to overlap the tail of the source range when
/// values are being shifted towards the end of a buffer, as long as every destination slot that
/// overlaps the source has already been read before it is written.
///
/// # Safety
///
/// The caller must ensure that:
/// - The `count` values before `src_end` are live.
/// - The `count` slots before `dst_end` are valid for writes and hold no live values at the time
///   they are written.
pub unsafe fn copy_backward_n<T: Clone>(
    src_end: NonNull<T>,
    count: usize,
    dst_end: NonNull<T>,
) -> NonNull<T> {
    let mut source = src_end;
    let mut target = dst_end;

    for _ in 0..count {
        // SAFETY: The caller guarantees `count` values before both end pointers.
        source = unsafe { source.sub(1) };
        // SAFETY: As above.
        target = unsafe { target.sub(1) };

        // SAFETY: The caller guarantees the source value is live.
        let value = unsafe { source.as_ref() }.clone();

        // SAFETY: The caller guarantees the target slot is writable and holds no live value.
        unsafe {
            target.write(value);
        }
    }

    target
}

/// Drops the value at `ptr` in place, leaving the storage uninitialized.
///
/// # Safety
///
/// The caller must ensure that `ptr` points to a live value that is not used afterwards and not
/// dropped again.
pub unsafe fn destroy_at<T>(ptr: NonNull<T>) {
    // SAFETY: Forwarding safety requirements to the caller.
    unsafe {
        ptr::drop_in_place(ptr.as_ptr());
    }
}

/// Drops `count` values starting at `first` in place, front to back.
///
/// If a drop panics, the remaining values are still dropped before the panic continues.
///
/// # Safety
///
/// The caller must ensure that the `count` values starting at `first` are live, and that none of
/// them is used or dropped again afterwards.
pub unsafe fn destroy_n<T>(first: NonNull<T>, count: usize) {
    // SAFETY: Forwarding safety requirements to the caller.
    unsafe {
        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(first.as_ptr(), count));
    }
}

/// Drops the values in the half-open range `[first, last)` in place, front to back.
///
/// If a drop panics, the remaining values are still dropped before the panic continues.
///
/// A range of a zero-sized type has no length, because every pointer into it is the same
/// address. Such a range is treated as empty and nothing is dropped. Use [`destroy_n`] when the
/// element type may be zero-sized.
///
/// # Safety
///
/// The caller must ensure that:
/// - `first` and `last` belong to the same storage and `first <= last`.
/// - Every value in the range is live, and none of them is used or dropped again afterwards.
pub unsafe fn destroy<T>(first: NonNull<T>, last: NonNull<T>) {
    if size_of::<T>() == 0 {
        return;
    }

    // SAFETY: The caller guarantees both pointers are in the same storage and the type is not
    // zero-sized, checked above.
    let distance = unsafe { last.offset_from(first) };

    let count = usize::try_from(distance).expect("the caller guarantees first <= last");

    // SAFETY: The caller guarantees `count` live values from `first` that may be dropped.
    unsafe {
        destroy_n(first, count);
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
    use std::mem::MaybeUninit;
    use std::rc::Rc;

    use super::*;

    /// Counts live instances through a shared counter.
    #[derive(Debug)]
    struct Tracked {
        value: u32,
        live: Rc<Cell<usize>>,
    }

    impl Tracked {
        fn new(value: u32, live: &Rc<Cell<usize>>) -> Self {
            live.set(live.get() + 1);

            Self {
                value,
                live: Rc::clone(live),
            }
        }
    }

    impl Clone for Tracked {
        fn clone(&self) -> Self {
            Self::new(self.value, &self.live)
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    fn storage<T, const N: usize>(slots: &mut [MaybeUninit<T>; N]) -> NonNull<T> {
        NonNull::from(slots).cast::<T>()
    }

    #[test]
    fn fill_n_constructs_clones() {
        let live = Rc::new(Cell::new(0));
        let mut slots = [const { MaybeUninit::<Tracked>::uninit() }; 4];
        let first = storage(&mut slots);

        let template = Tracked::new(7, &live);

        let end = unsafe { fill_n(first, 4, &template) };
        assert_eq!(end, unsafe { first.add(4) });
        assert_eq!(live.get(), 5);

        for i in 0..4 {
            assert_eq!(unsafe { first.add(i).as_ref() }.value, 7);
        }

        unsafe {
            destroy(first, end);
        }

        assert_eq!(live.get(), 1);
    }

    #[test]
    fn fill_with_n_calls_in_order() {
        let mut slots = [const { MaybeUninit::<u32>::uninit() }; 5];
        let first = storage(&mut slots);

        let mut next = 0;
        unsafe {
            fill_with_n(first, 5, || {
                next += 1;
                next
            });
        }

        for i in 0..5 {
            assert_eq!(unsafe { first.add(i).read() }, u32::try_from(i).unwrap() + 1);
        }
    }

    #[test]
    fn zero_count_is_noop() {
        let mut slots = [const { MaybeUninit::<u32>::uninit() }; 1];
        let first = storage(&mut slots);

        unsafe {
            assert_eq!(fill_n(first, 0, &1), first);
            assert_eq!(copy_n(first, 0, first), first);
            assert_eq!(copy_backward_n(first, 0, first), first);
            destroy(first, first);
        }
    }

    #[test]
    fn copy_n_clones_forward() {
        let live = Rc::new(Cell::new(0));

        let source: Vec<Tracked> = (0..3).map(|i| Tracked::new(i, &live)).collect();
        let src = NonNull::from(source.as_slice()).cast::<Tracked>();

        let mut slots = [const { MaybeUninit::<Tracked>::uninit() }; 3];
        let dst = storage(&mut slots);

        let end = unsafe { copy_n(src, 3, dst) };
        assert_eq!(end, unsafe { dst.add(3) });
        assert_eq!(live.get(), 6);

        for i in 0..3 {
            assert_eq!(
                unsafe { dst.add(i).as_ref() }.value,
                u32::try_from(i).unwrap()
            );
        }

        unsafe {
            destroy(dst, end);
        }

        drop(source);
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn copy_backward_n_shifts_towards_end() {
        // [1, 2, 3, _, _] -> shift the last three right by two -> [1, 2, 1, 2, 3]
        let mut slots = [const { MaybeUninit::<u32>::uninit() }; 5];
        let first = storage(&mut slots);

        unsafe {
            first.write(1);
            first.add(1).write(2);
            first.add(2).write(3);

            let start = copy_backward_n(first.add(3), 3, first.add(5));
            assert_eq!(start, first.add(2));

            assert_eq!(first.add(2).read(), 1);
            assert_eq!(first.add(3).read(), 2);
            assert_eq!(first.add(4).read(), 3);
        }
    }

    #[test]
    fn destroy_at_drops_single_value() {
        let live = Rc::new(Cell::new(0));
        let mut slots = [const { MaybeUninit::<Tracked>::uninit() }; 2];
        let first = storage(&mut slots);

        unsafe {
            first.write(Tracked::new(1, &live));
            first.add(1).write(Tracked::new(2, &live));
        }

        assert_eq!(live.get(), 2);

        unsafe {
            destroy_at(first.add(1));
        }

        assert_eq!(live.get(), 1);

        unsafe {
            destroy_at(first);
        }

        assert_eq!(live.get(), 0);
    }

    thread_local! {
        static MARKER_DROPS: Cell<usize> = const { Cell::new(0) };
    }

    /// A zero-sized type that counts its drops in a thread-local counter.
    struct Marker;

    impl Drop for Marker {
        fn drop(&mut self) {
            MARKER_DROPS.with(|drops| drops.set(drops.get() + 1));
        }
    }

    #[test]
    fn destroy_n_drops_zero_sized_values() {
        assert_eq!(size_of::<Marker>(), 0);

        let mut slots = [const { MaybeUninit::<Marker>::uninit() }; 3];
        let first = storage(&mut slots);

        unsafe {
            fill_with_n(first, 3, || Marker);
            destroy_n(first, 3);
        }

        assert_eq!(MARKER_DROPS.with(Cell::get), 3);
    }

    #[test]
    fn destroy_of_zero_sized_range_is_empty() {
        let mut slots = [const { MaybeUninit::<()>::uninit() }; 4];
        let first = storage(&mut slots);

        unsafe {
            fill_n(first, 4, &());

            // Every pointer into a zero-sized range is the same address.
            assert_eq!(first, first.add(4));

            destroy(first, first.add(4));
            destroy_n(first, 4);
        }
    }

    #[test]
    fn panicking_clone_leaks_without_double_drop() {
        use std::panic::{self, AssertUnwindSafe};

        #[derive(Debug)]
        struct Bomb {
            remaining: Rc<Cell<u32>>,
        }

        impl Clone for Bomb {
            fn clone(&self) -> Self {
                let remaining = self.remaining.get();
                assert!(remaining > 0, "boom");
                self.remaining.set(remaining - 1);

                Self {
                    remaining: Rc::clone(&self.remaining),
                }
            }
        }

        let template = Bomb {
            remaining: Rc::new(Cell::new(2)),
        };

        let mut slots = [const { MaybeUninit::<Bomb>::uninit() }; 4];
        let first = storage(&mut slots);

        let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
            fill_n(first, 4, &template);
        }));

        assert!(result.is_err());

        // Two clones were constructed before the panic. We own them now, so clean them up.
        unsafe {
            destroy(first, first.add(2));
        }

        assert_eq!(Rc::strong_count(&template.remaining), 1);
    }
}
