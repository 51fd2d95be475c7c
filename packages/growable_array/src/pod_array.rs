use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use raw_memory::{ElementAllocator, Error, TypedAllocator};
use tracing::trace;

use crate::Result;

/// Capacity of the first buffer a POD array allocates when growing on demand.
pub(crate) const POD_MIN_CAPACITY: usize = 16;

/// A growable array of plain [`Copy`] values.
///
/// Unlike [`GrowableArray`](crate::GrowableArray), this never runs constructors or destructors:
/// values are copied in and the buffer is resized via
/// [`ElementAllocator::reallocate()`], which may extend it in place.
///
/// Capacity starts at 16 and doubles until it fits the requested length.
///
/// If an allocation fails, the operation returns an error and the array is left unchanged.
///
/// # Example
///
/// ```
/// use growable_array::PodArray;
///
/// let mut ids = PodArray::new();
///
/// for id in [7_u32, 3, 9] {
///     ids.push_back(id)?;
/// }
///
/// assert_eq!(ids.capacity(), 16);
/// assert_eq!(ids.find(&9), 2);
///
/// // Not found is reported as the length.
/// assert_eq!(ids.find(&100), ids.len());
/// # Ok::<(), raw_memory::Error>(())
/// ```
pub struct PodArray<T, A = TypedAllocator<T>>
where
    T: Copy,
    A: ElementAllocator<Value = T>,
{
    data: NonNull<T>,
    len: usize,
    capacity: usize,
    allocator: A,
}

impl<T> PodArray<T>
where
    T: Copy,
{
    /// Creates an empty array that draws memory from the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(TypedAllocator::new())
    }
}

impl<T, A> PodArray<T, A>
where
    T: Copy,
    A: ElementAllocator<Value = T>,
{
    /// Creates an empty array that draws memory from the given allocator.
    #[must_use]
    pub fn new_in(allocator: A) -> Self {
        Self {
            data: NonNull::dangling(),
            len: 0,
            capacity: 0,
            allocator,
        }
    }

    /// The number of values in the array.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array holds no values.
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

    /// Appends a copy of `value`, growing the buffer if it is full.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer needed to grow and the allocation failed. The array is
    /// unchanged.
    pub fn push_back(&mut self, value: T) -> Result<()> {
        self.extend_from_slice(slice::from_ref(&value))
    }

    /// Appends copies of all values in `values`.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer needed to grow and the allocation failed. The array is
    /// unchanged.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<()> {
        let required = self.len.checked_add(values.len()).ok_or(Error::BadSize {
            count: values.len(),
            item_size: size_of::<T>(),
        })?;

        if required > self.capacity {
            self.resize_buffer(doubled_capacity(required, self.capacity))?;
        }

        // SAFETY: `len <= capacity`, so this is at most one past the end of the buffer.
        let end = unsafe { self.data.add(self.len) };

        // SAFETY: The buffer has room for `required` values and `values` cannot overlap it
        // because we hold an exclusive reference to the array.
        unsafe {
            ptr::copy_nonoverlapping(values.as_ptr(), end.as_ptr(), values.len());
        }

        self.len = required;

        Ok(())
    }

    /// Ensures the capacity is at least `capacity`, allocating exactly that much if it is not.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation failed. The array is unchanged.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity {
            return Ok(());
        }

        self.resize_buffer(capacity)
    }

    /// Removes the last value and returns it, or `None` if the array is empty.
    pub fn pop(&mut self) -> Option<T> {
        let value = *self.as_slice().last()?;

        // Cannot underflow because last() found a value.
        self.len = self.len.wrapping_sub(1);

        Some(value)
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

    /// Index of the first value equal to `value`, or `len()` if there is none.
    #[must_use]
    pub fn find(&self, value: &T) -> usize
    where
        T: PartialEq,
    {
        self.find_by(value, 0, self.len, |candidate, value| candidate == value)
    }

    /// Index of the first value in `start..end` for which `predicate(candidate, value)` holds,
    /// or `len()` if there is none.
    ///
    /// `end` is clamped to `len()`.
    #[must_use]
    pub fn find_by<P>(&self, value: &T, start: usize, end: usize, mut predicate: P) -> usize
    where
        P: FnMut(&T, &T) -> bool,
    {
        let end = end.min(self.len);

        self.as_slice()
            .get(start..end)
            .and_then(|range| range.iter().position(|candidate| predicate(candidate, value)))
            .and_then(|position| position.checked_add(start))
            .unwrap_or(self.len)
    }

    /// The values as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: The first `len` values are initialized. An empty slice only needs a non-null,
        // aligned pointer, which the dangling pointer is.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// The values as an exclusive slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: As in as_slice(), plus we hold an exclusive reference to the array.
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }

    /// Forgets all values. The buffer and capacity are retained.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Forgets all values and releases the buffer.
    pub fn reset(&mut self) {
        self.len = 0;

        if self.capacity == 0 {
            return;
        }

        // SAFETY: A non-zero capacity means the buffer came from our allocator for that many
        // values. Copy values need no drop.
        unsafe {
            self.allocator.deallocate(self.data, self.capacity);
        }

        self.data = NonNull::dangling();
        self.capacity = 0;
    }

    fn resize_buffer(&mut self, new_capacity: usize) -> Result<()> {
        trace!(
            old_capacity = self.capacity,
            new_capacity, "resizing POD array buffer"
        );

        let new_data = if self.capacity == 0 {
            self.allocator.allocate(new_capacity)?
        } else {
            // SAFETY: The buffer came from our allocator for `capacity` values. On failure it is
            // left intact, which keeps the array unchanged.
            unsafe {
                self.allocator
                    .reallocate(self.data, self.capacity, new_capacity)?
            }
        };

        self.data = new_data;
        self.capacity = new_capacity;

        Ok(())
    }
}

/// Smallest capacity reachable by doubling from `max(current, 16)` that is at least `required`.
#[cfg_attr(test, mutants::skip)] // Can be mutated into an infinite loop.
fn doubled_capacity(required: usize, current: usize) -> usize {
    let mut capacity = current.max(POD_MIN_CAPACITY);

    while capacity < required {
        capacity = capacity.saturating_mul(2);
    }

    capacity
}

impl<T, A> Drop for PodArray<T, A>
where
    T: Copy,
    A: ElementAllocator<Value = T>,
{
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Default for PodArray<T>
where
    T: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A> Deref for PodArray<T, A>
where
    T: Copy,
    A: ElementAllocator<Value = T>,
{
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A> DerefMut for PodArray<T, A>
where
    T: Copy,
    A: ElementAllocator<Value = T>,
{
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'a, T, A> IntoIterator for &'a PodArray<T, A>
where
    T: Copy,
    A: ElementAllocator<Value = T>,
{
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T, A> IntoIterator for &'a mut PodArray<T, A>
where
    T: Copy,
    A: ElementAllocator<Value = T>,
{
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

impl<T, A> fmt::Debug for PodArray<T, A>
where
    T: Copy + fmt::Debug,
    A: ElementAllocator<Value = T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

// SAFETY: The array exclusively owns its buffer, so it may move between threads whenever the
// values and the allocator may.
unsafe impl<T, A> Send for PodArray<T, A>
where
    T: Copy + Send,
    A: ElementAllocator<Value = T> + Send,
{
}

// SAFETY: Shared access only grants shared access to the values and the allocator.
unsafe impl<T, A> Sync for PodArray<T, A>
where
    T: Copy + Sync,
    A: ElementAllocator<Value = T> + Sync,
{
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(PodArray<u64>: Send, Sync, Default);

    #[test]
    fn first_growth_is_sixteen() {
        let mut array = PodArray::new();

        array.push_back(1_u8).unwrap();

        assert_eq!(array.len(), 1);
        assert_eq!(array.capacity(), 16);
    }

    #[test]
    fn capacity_doubles() {
        let mut array = PodArray::new();

        for i in 0..17_u32 {
            array.push_back(i).unwrap();
        }

        assert_eq!(array.capacity(), 32);

        for i in 17..65_u32 {
            array.push_back(i).unwrap();
        }

        assert_eq!(array.capacity(), 128);
        assert_eq!(array.at(64), Some(&64));
    }

    #[test]
    fn doubled_capacity_rule() {
        assert_eq!(doubled_capacity(1, 0), 16);
        assert_eq!(doubled_capacity(16, 0), 16);
        assert_eq!(doubled_capacity(17, 16), 32);
        assert_eq!(doubled_capacity(100, 16), 128);
        assert_eq!(doubled_capacity(10, 40), 40);
        assert_eq!(doubled_capacity(usize::MAX, 0), usize::MAX);
    }

    #[test]
    fn values_survive_resize() {
        let mut array = PodArray::new();
        let values: Vec<u64> = (0..100).collect();

        array.extend_from_slice(&values).unwrap();

        assert_eq!(array.as_slice(), values.as_slice());
        assert_eq!(array.capacity(), 128);
    }

    #[test]
    fn reserve_is_exact() {
        let mut array = PodArray::<u16>::new();

        array.reserve(5).unwrap();
        assert_eq!(array.capacity(), 5);

        array.reserve(3).unwrap();
        assert_eq!(array.capacity(), 5);
    }

    #[test]
    fn find_reports_len_when_missing() {
        let mut array = PodArray::new();
        array.extend_from_slice(&[5, 6, 7, 6]).unwrap();

        assert_eq!(array.find(&6), 1);
        assert_eq!(array.find(&8), 4);
    }

    #[test]
    fn find_by_respects_range() {
        let mut array = PodArray::new();
        array.extend_from_slice(&[5, 6, 7, 6]).unwrap();

        assert_eq!(array.find_by(&6, 2, 4, |a, b| a == b), 3);
        assert_eq!(array.find_by(&6, 2, 3, |a, b| a == b), 4);

        // End is clamped to the length.
        assert_eq!(array.find_by(&6, 2, 100, |a, b| a == b), 3);

        // Start beyond end finds nothing.
        assert_eq!(array.find_by(&5, 3, 1, |a, b| a == b), 4);
    }

    #[test]
    fn find_by_custom_predicate() {
        let mut array = PodArray::new();
        array.extend_from_slice(&[1_i32, -5, 3]).unwrap();

        assert_eq!(array.find_by(&5, 0, 3, |a, b| a.abs() == *b), 1);
    }

    #[test]
    fn clear_keeps_buffer_reset_releases() {
        let mut array = PodArray::new();
        array.extend_from_slice(&[1, 2, 3]).unwrap();

        array.clear();
        assert!(array.is_empty());
        assert_eq!(array.capacity(), 16);

        array.reset();
        assert_eq!(array.capacity(), 0);
    }

    #[test]
    fn pop_and_at_mut() {
        let mut array = PodArray::new();
        array.extend_from_slice(&[1, 2]).unwrap();

        *array.at_mut(0).unwrap() = 10;

        assert_eq!(array.pop(), Some(2));
        assert_eq!(array.pop(), Some(10));
        assert_eq!(array.pop(), None);
        assert!(array.at_mut(0).is_none());
    }

    #[test]
    fn debug_lists_values() {
        let mut array = PodArray::new();
        array.extend_from_slice(&[1_u8, 2]).unwrap();

        assert_eq!(format!("{array:?}"), "[1, 2]");
    }
}
