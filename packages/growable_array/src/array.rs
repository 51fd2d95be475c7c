use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use raw_memory::{ElementAllocator, Error, TypedAllocator, grow_to, uninit};
use tracing::trace;

use crate::Result;

/// Capacity of the first buffer an array allocates when growing on demand.
pub(crate) const MIN_CAPACITY: usize = 4;

/// A contiguous, growable sequence of values that reports allocation failure as an error.
///
/// The array exclusively owns a buffer obtained from an [`ElementAllocator`]. The first
/// [`len()`](Self::len) slots of the buffer hold live values, the rest up to
/// [`capacity()`](Self::capacity) is uninitialized storage.
///
/// # Growth
///
/// When an operation needs more room than the current capacity, the new capacity starts at
/// `max(capacity, 4)` and grows by half of itself until it is large enough. Appending one value
/// at a time therefore costs amortized O(1) and at most a third of the buffer is unused after
/// growth.
///
/// # Failure
///
/// Every operation that may allocate returns a [`Result`]. If the allocation fails, the array is
/// left exactly as it was: same values, same length, same capacity, same buffer.
///
/// # Example
///
/// ```
/// use growable_array::GrowableArray;
///
/// let mut array = GrowableArray::new();
///
/// array.push_back(10)?;
/// array.push_back(20)?;
/// array.push_back(30)?;
///
/// assert_eq!(array.len(), 3);
/// assert!(array.capacity() >= 4);
/// assert_eq!(array.at(1), Some(&20));
/// assert_eq!(array.at(3), None);
/// # Ok::<(), raw_memory::Error>(())
/// ```
///
/// # Thread safety
///
/// The array is [`Send`] and [`Sync`] whenever its values and its allocator are. It has no
/// internal synchronization - mutation requires exclusive access as usual.
pub struct GrowableArray<T, A = TypedAllocator<T>>
where
    A: ElementAllocator<Value = T>,
{
    /// Start of the buffer. Dangling while the capacity is zero.
    data: NonNull<T>,

    /// Number of live values at the start of the buffer.
    len: usize,

    /// Number of values the buffer has room for.
    capacity: usize,

    allocator: A,

    _owns: PhantomData<T>,
}

impl<T> GrowableArray<T> {
    /// Creates an empty array that draws memory from the global allocator.
    ///
    /// Does not allocate until the first value is added.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(TypedAllocator::new())
    }
}

impl<T, A> GrowableArray<T, A>
where
    A: ElementAllocator<Value = T>,
{
    /// Creates an empty array that draws memory from the given allocator.
    ///
    /// Does not allocate until the first value is added.
    #[must_use]
    pub fn new_in(allocator: A) -> Self {
        Self {
            data: NonNull::dangling(),
            len: 0,
            capacity: 0,
            allocator,
            _owns: PhantomData,
        }
    }

    /// Creates an empty array with room for exactly `capacity` values.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be allocated.
    pub fn with_capacity_in(capacity: usize, allocator: A) -> Result<Self> {
        let mut array = Self::new_in(allocator);
        array.reserve(capacity)?;
        Ok(array)
    }

    /// The number of live values in the array.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array holds no values. It may still hold a buffer.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of values the array can hold without allocating.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The allocator the array draws its buffer from.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Appends a value at the end of the array, growing the buffer if it is full.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer needed to grow and the allocation failed. The array is
    /// unchanged and `value` is dropped.
    pub fn push_back(&mut self, value: T) -> Result<()> {
        self.ensure_room_for(1)?;

        // SAFETY: ensure_room_for() guarantees that the slot at `len` is within the buffer, and
        // every slot at or beyond `len` is uninitialized.
        unsafe {
            self.end().write(value);
        }

        // Cannot overflow because ensure_room_for() checked len + 1.
        self.len = self.len.wrapping_add(1);

        Ok(())
    }

    /// Appends `count` default values at the end of the array.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer needed to grow and the allocation failed. The array is
    /// unchanged.
    pub fn grow(&mut self, count: usize) -> Result<()>
    where
        T: Default,
    {
        self.ensure_room_for(count)?;

        // SAFETY: ensure_room_for() guarantees `count` uninitialized slots from `len`.
        unsafe {
            uninit::fill_with_n(self.end(), count, T::default);
        }

        // Cannot overflow because ensure_room_for() checked len + count.
        self.len = self.len.wrapping_add(count);

        Ok(())
    }

    /// Appends `count` clones of `value` at the end of the array.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer needed to grow and the allocation failed. The array is
    /// unchanged.
    pub fn grow_filled(&mut self, count: usize, value: &T) -> Result<()>
    where
        T: Clone,
    {
        self.ensure_room_for(count)?;

        // SAFETY: ensure_room_for() guarantees `count` uninitialized slots from `len`.
        unsafe {
            uninit::fill_n(self.end(), count, value);
        }

        // Cannot overflow because ensure_room_for() checked len + count.
        self.len = self.len.wrapping_add(count);

        Ok(())
    }

    /// Appends clones of all values in `values` at the end of the array.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer needed to grow and the allocation failed. The array is
    /// unchanged.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<()>
    where
        T: Clone,
    {
        self.ensure_room_for(values.len())?;

        // SAFETY: The source is a live slice that cannot overlap our buffer because we hold an
        // exclusive reference to the array. ensure_room_for() guarantees enough room after `len`.
        unsafe {
            uninit::copy_n(NonNull::from(values).cast::<T>(), values.len(), self.end());
        }

        // Cannot overflow because ensure_room_for() checked len + values.len().
        self.len = self.len.wrapping_add(values.len());

        Ok(())
    }

    /// Ensures the capacity is at least `capacity`, allocating exactly that much if it is not.
    ///
    /// Does not change the length and does nothing if the capacity is already sufficient.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation failed. The array is unchanged.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity {
            return Ok(());
        }

        self.reallocate(capacity)
    }

    /// Removes the last value and returns it, or `None` if the array is empty.
    ///
    /// The capacity is unchanged.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }

        // Cannot underflow because we checked for empty above.
        self.len = self.len.wrapping_sub(1);

        // SAFETY: The slot at the old `len - 1` holds a live value. We reduced `len` first so the
        // array no longer considers it live, which makes moving it out sound.
        Some(unsafe { self.end().read() })
    }

    /// Returns a reference to the value at `index`, or `None` if `index >= len()`.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Returns an exclusive reference to the value at `index`, or `None` if `index >= len()`.
    #[must_use]
    pub fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    /// The live values as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: The first `len` slots hold live values. With `len == 0` the dangling pointer is
        // still well-aligned and non-null, which is all an empty slice needs.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// The live values as an exclusive slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: As in as_slice(), plus we hold an exclusive reference to the array.
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }

    /// Drops all values. The length becomes zero, the buffer and capacity are retained.
    pub fn clear(&mut self) {
        let count = self.len;
        self.len = 0;

        // SAFETY: The first `count` slots held live values. We set the length to zero before
        // dropping so that a panicking drop cannot lead to a double drop later.
        unsafe {
            uninit::destroy_n(self.data, count);
        }
    }

    /// Drops all values and releases the buffer. The capacity becomes zero.
    pub fn reset(&mut self) {
        self.clear();
        self.release_buffer();
    }

    /// Creates an independent copy of the array with the same allocator, whose capacity equals
    /// the length of this array.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer for the copy cannot be allocated.
    pub fn try_clone(&self) -> Result<Self>
    where
        T: Clone,
    {
        let mut clone = Self::new_in(self.allocator.clone());
        clone.extend_from_slice(self.as_slice())?;
        Ok(clone)
    }

    /// Pointer to the first uninitialized slot.
    fn end(&self) -> NonNull<T> {
        // SAFETY: `len <= capacity`, so this is at most one past the end of the buffer.
        unsafe { self.data.add(self.len) }
    }

    /// Makes sure there is room for `additional` more values, growing by the standard growth
    /// rule if there is not.
    fn ensure_room_for(&mut self, additional: usize) -> Result<()> {
        let required = self.len.checked_add(additional).ok_or(Error::BadSize {
            count: additional,
            item_size: size_of::<T>(),
        })?;

        if required <= self.capacity {
            return Ok(());
        }

        self.reallocate(grow_to(required, self.capacity, MIN_CAPACITY))
    }

    /// Moves the live values into a new buffer of `new_capacity` and releases the old one.
    ///
    /// The new buffer is obtained before anything else is touched, so a failed allocation leaves
    /// the array unchanged.
    fn reallocate(&mut self, new_capacity: usize) -> Result<()> {
        debug_assert!(new_capacity >= self.len);

        let new_data = self.allocator.allocate(new_capacity)?;

        trace!(
            old_capacity = self.capacity,
            new_capacity,
            len = self.len,
            "reallocating array buffer"
        );

        // Relocating is a bitwise move. The old slots are treated as uninitialized afterwards,
        // so no value is dropped or duplicated.
        //
        // SAFETY: The old buffer holds `len` live values, the new one has room for at least that
        // many and the two are distinct allocations.
        unsafe {
            ptr::copy_nonoverlapping(self.data.as_ptr(), new_data.as_ptr(), self.len);
        }

        self.release_buffer();

        self.data = new_data;
        self.capacity = new_capacity;

        Ok(())
    }

    /// Releases the buffer without touching any values. The caller is responsible for the
    /// values having been dropped or moved out.
    fn release_buffer(&mut self) {
        if self.capacity == 0 {
            return;
        }

        // SAFETY: A non-zero capacity means `data` came from our allocator for `capacity`
        // values, and it is released exactly once because we reset it right after.
        unsafe {
            self.allocator.deallocate(self.data, self.capacity);
        }

        self.data = NonNull::dangling();
        self.capacity = 0;
    }
}

impl<T, A> Drop for GrowableArray<T, A>
where
    A: ElementAllocator<Value = T>,
{
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Default for GrowableArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A> Deref for GrowableArray<T, A>
where
    A: ElementAllocator<Value = T>,
{
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A> DerefMut for GrowableArray<T, A>
where
    A: ElementAllocator<Value = T>,
{
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'a, T, A> IntoIterator for &'a GrowableArray<T, A>
where
    A: ElementAllocator<Value = T>,
{
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T, A> IntoIterator for &'a mut GrowableArray<T, A>
where
    A: ElementAllocator<Value = T>,
{
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

impl<T, A> fmt::Debug for GrowableArray<T, A>
where
    T: fmt::Debug,
    A: ElementAllocator<Value = T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

// SAFETY: The array exclusively owns its values and its buffer, so moving it to another thread
// moves the values along with it. This is sound whenever the values and the allocator may move.
unsafe impl<T, A> Send for GrowableArray<T, A>
where
    T: Send,
    A: ElementAllocator<Value = T> + Send,
{
}

// SAFETY: Shared access to the array only grants shared access to the values and the allocator.
unsafe impl<T, A> Sync for GrowableArray<T, A>
where
    T: Sync,
    A: ElementAllocator<Value = T> + Sync,
{
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "test code doesn't need the same rigor as production code"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(GrowableArray<u32>: Send, Sync, Default);
    assert_impl_all!(GrowableArray<String>: Send, Sync);
    assert_not_impl_any!(GrowableArray<Rc<u32>>: Send, Sync);
    assert_not_impl_any!(GrowableArray<Cell<u32>>: Sync);

    /// Counts live instances through a shared counter.
    #[derive(Debug)]
    struct Tracked {
        live: Rc<Cell<usize>>,
    }

    impl Tracked {
        fn new(live: &Rc<Cell<usize>>) -> Self {
            live.set(live.get() + 1);

            Self {
                live: Rc::clone(live),
            }
        }
    }

    impl Clone for Tracked {
        fn clone(&self) -> Self {
            Self::new(&self.live)
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    #[test]
    fn new_does_not_allocate() {
        let array = GrowableArray::<u64>::new();

        assert_eq!(array.len(), 0);
        assert_eq!(array.capacity(), 0);
        assert!(array.is_empty());
        assert!(array.as_slice().is_empty());
    }

    #[test]
    fn push_three_values() {
        let mut array = GrowableArray::new();

        array.push_back(10).unwrap();
        array.push_back(20).unwrap();
        array.push_back(30).unwrap();

        assert_eq!(array.len(), 3);
        assert_eq!(array.capacity(), 4);
        assert_eq!(array.at(0), Some(&10));
        assert_eq!(array.at(1), Some(&20));
        assert_eq!(array.at(2), Some(&30));
        assert_eq!(array.at(3), None);
    }

    #[test]
    fn capacity_follows_growth_rule() {
        let mut array = GrowableArray::new();
        let mut observed = Vec::new();

        for i in 0..30 {
            array.push_back(i).unwrap();

            if observed.last() != Some(&array.capacity()) {
                observed.push(array.capacity());
            }
        }

        assert_eq!(observed, [4, 6, 9, 13, 19, 28, 42]);
    }

    #[test]
    fn values_survive_reallocation() {
        let mut array = GrowableArray::new();

        for i in 0..1000_u32 {
            array.push_back(i.to_string()).unwrap();
        }

        for (i, value) in array.iter().enumerate() {
            assert_eq!(*value, i.to_string());
        }
    }

    #[test]
    fn grow_default_constructs() {
        let mut array = GrowableArray::<u32>::new();
        array.push_back(5).unwrap();

        array.grow(3).unwrap();

        assert_eq!(array.as_slice(), &[5, 0, 0, 0]);
    }

    #[test]
    fn grow_by_zero_does_not_allocate() {
        let mut array = GrowableArray::<u32>::new();

        array.grow(0).unwrap();

        assert_eq!(array.len(), 0);
        assert_eq!(array.capacity(), 0);
    }

    #[test]
    fn grow_filled_clones() {
        let mut array = GrowableArray::new();

        array.grow_filled(3, &"x".to_string()).unwrap();

        assert_eq!(array.len(), 3);
        assert!(array.iter().all(|value| value == "x"));
    }

    #[test]
    fn reserve_is_exact_and_monotonic() {
        let mut array = GrowableArray::<u8>::new();

        array.reserve(100).unwrap();
        assert_eq!(array.capacity(), 100);
        assert_eq!(array.len(), 0);

        array.reserve(10).unwrap();
        assert_eq!(array.capacity(), 100);
    }

    #[test]
    fn clear_drops_values_and_keeps_buffer() {
        let live = Rc::new(Cell::new(0));
        let mut array = GrowableArray::new();

        for _ in 0..5 {
            array.push_back(Tracked::new(&live)).unwrap();
        }

        let capacity = array.capacity();
        assert_eq!(live.get(), 5);

        array.clear();

        assert_eq!(live.get(), 0);
        assert_eq!(array.len(), 0);
        assert_eq!(array.capacity(), capacity);
    }

    #[test]
    fn reset_releases_buffer() {
        let mut array = GrowableArray::new();
        array.push_back(1_u16).unwrap();

        array.reset();

        assert_eq!(array.len(), 0);
        assert_eq!(array.capacity(), 0);

        // Still usable afterwards.
        array.push_back(2).unwrap();
        assert_eq!(array.as_slice(), &[2]);
    }

    #[test]
    fn drop_drops_every_value_once() {
        let live = Rc::new(Cell::new(0));

        {
            let mut array = GrowableArray::new();

            for _ in 0..50 {
                array.push_back(Tracked::new(&live)).unwrap();
            }

            assert_eq!(live.get(), 50);
        }

        assert_eq!(live.get(), 0);
    }

    #[test]
    fn reallocation_does_not_clone_or_drop() {
        let live = Rc::new(Cell::new(0));
        let mut array = GrowableArray::new();

        for _ in 0..4 {
            array.push_back(Tracked::new(&live)).unwrap();
        }

        array.reserve(1000).unwrap();

        assert_eq!(live.get(), 4);
        assert_eq!(array.len(), 4);
    }

    #[test]
    fn pop_returns_last() {
        let mut array = GrowableArray::new();
        array.extend_from_slice(&[1, 2, 3]).unwrap();

        assert_eq!(array.pop(), Some(3));
        assert_eq!(array.pop(), Some(2));
        assert_eq!(array.pop(), Some(1));
        assert_eq!(array.pop(), None);
        assert!(array.capacity() >= 3);
    }

    #[test]
    fn at_mut_modifies_in_place() {
        let mut array = GrowableArray::new();
        array.extend_from_slice(&[1, 2, 3]).unwrap();

        *array.at_mut(1).unwrap() = 20;

        assert_eq!(array.as_slice(), &[1, 20, 3]);
        assert!(array.at_mut(3).is_none());
    }

    #[test]
    fn try_clone_is_independent() {
        let live = Rc::new(Cell::new(0));
        let mut original = GrowableArray::new();

        for _ in 0..3 {
            original.push_back(Tracked::new(&live)).unwrap();
        }

        let clone = original.try_clone().unwrap();
        assert_eq!(clone.len(), 3);
        assert_eq!(clone.capacity(), 4);
        assert_eq!(live.get(), 6);

        original.clear();
        assert_eq!(live.get(), 3);

        drop(clone);
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn deref_gives_slice_api() {
        let mut array = GrowableArray::new();
        array.extend_from_slice(&[3, 1, 2]).unwrap();

        array.sort_unstable();

        assert_eq!(&*array, &[1, 2, 3]);
        assert_eq!(array.iter().sum::<i32>(), 6);

        for value in &mut array {
            *value *= 2;
        }

        assert_eq!(array.as_slice(), &[2, 4, 6]);
    }

    #[test]
    fn debug_lists_values() {
        let mut array = GrowableArray::new();
        array.extend_from_slice(&[1, 2]).unwrap();

        assert_eq!(format!("{array:?}"), "[1, 2]");
    }

    #[test]
    fn zero_sized_values() {
        let mut array = GrowableArray::new();

        for _ in 0..100 {
            array.push_back(()).unwrap();
        }

        assert_eq!(array.len(), 100);
        assert_eq!(array.at(99), Some(&()));
    }

    #[test]
    fn drop_empty_zero_sized_array() {
        let array = GrowableArray::<()>::new();
        drop(array);

        let mut array = GrowableArray::<()>::new();
        array.reserve(10).unwrap();
        drop(array);
    }

    thread_local! {
        static MARKER_DROPS: Cell<usize> = const { Cell::new(0) };
    }

    /// Zero-sized, counts its drops in a thread-local counter.
    #[derive(Clone)]
    struct Marker;

    impl Drop for Marker {
        fn drop(&mut self) {
            MARKER_DROPS.with(|drops| drops.set(drops.get() + 1));
        }
    }

    fn marker_drops() -> usize {
        MARKER_DROPS.with(Cell::get)
    }

    #[test]
    fn zero_sized_values_are_dropped() {
        let mut array = GrowableArray::new();

        for _ in 0..7 {
            array.push_back(Marker).unwrap();
        }

        array.clear();
        assert_eq!(marker_drops(), 7);
        assert_eq!(array.len(), 0);

        array.grow_filled(3, &Marker).unwrap();
        // The template passed by reference is dropped here too.
        assert_eq!(marker_drops(), 8);

        array.reset();
        assert_eq!(marker_drops(), 11);
        assert_eq!(array.capacity(), 0);

        array.push_back(Marker).unwrap();
        array.push_back(Marker).unwrap();
        drop(array);

        assert_eq!(marker_drops(), 13);
    }

    #[test]
    fn overflowing_grow_is_bad_size() {
        let mut array = GrowableArray::<u8>::new();
        array.push_back(1).unwrap();

        let error = array.grow(usize::MAX).unwrap_err();

        assert!(matches!(error, Error::BadSize { .. }));
        assert_eq!(array.as_slice(), &[1]);
    }
}
