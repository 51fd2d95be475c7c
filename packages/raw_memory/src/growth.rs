//! The capacity growth rule shared by the containers.
//!
//! Capacity grows by half of itself at each step (a factor of about 1.5), which keeps the
//! amortized cost of appending constant while wasting at most a constant fraction of memory.

/// Capacity after a single growth step: `capacity + capacity / 2`, but always at least one more
/// than the input so that growth cannot stall at very small capacities.
///
/// Saturates at `usize::MAX`.
///
/// # Example
///
/// ```
/// use raw_memory::grow_once;
///
/// assert_eq!(grow_once(4), 6);
/// assert_eq!(grow_once(6), 9);
/// assert_eq!(grow_once(1), 2);
/// ```
#[must_use]
pub fn grow_once(capacity: usize) -> usize {
    capacity.saturating_add((capacity >> 1).max(1))
}

/// Smallest capacity reachable from `max(current, floor)` by repeated [`grow_once()`] steps that
/// is at least `required`.
///
/// # Example
///
/// ```
/// use raw_memory::grow_to;
///
/// // Starting from nothing, the floor is used as the seed.
/// assert_eq!(grow_to(3, 0, 4), 4);
///
/// // 4 -> 6 -> 9
/// assert_eq!(grow_to(7, 4, 4), 9);
///
/// // Already large enough.
/// assert_eq!(grow_to(5, 100, 4), 100);
/// ```
#[must_use]
#[cfg_attr(test, mutants::skip)] // Can be mutated into an infinite loop.
pub fn grow_to(required: usize, current: usize, floor: usize) -> usize {
    let mut capacity = current.max(floor);

    while capacity < required {
        capacity = grow_once(capacity);
    }

    capacity
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn grow_once_adds_half() {
        assert_eq!(grow_once(4), 6);
        assert_eq!(grow_once(9), 13);
        assert_eq!(grow_once(100), 150);
    }

    #[test]
    fn grow_once_makes_progress_from_tiny_values() {
        assert_eq!(grow_once(0), 1);
        assert_eq!(grow_once(1), 2);
        assert_eq!(grow_once(2), 3);
    }

    #[test]
    fn grow_once_saturates() {
        assert_eq!(grow_once(usize::MAX), usize::MAX);
        assert_eq!(grow_once(usize::MAX - 1), usize::MAX);
    }

    #[test]
    fn grow_to_uses_floor() {
        assert_eq!(grow_to(1, 0, 4), 4);
        assert_eq!(grow_to(4, 0, 4), 4);
        assert_eq!(grow_to(5, 0, 4), 6);
    }

    #[test]
    fn grow_to_sequence_from_floor() {
        // 4 -> 6 -> 9 -> 13 -> 19 -> 28
        assert_eq!(grow_to(20, 0, 4), 28);
    }

    #[test]
    fn grow_to_keeps_sufficient_capacity() {
        assert_eq!(grow_to(10, 10, 4), 10);
        assert_eq!(grow_to(3, 10, 4), 10);
    }

    #[test]
    fn grow_to_handles_huge_requests() {
        assert_eq!(grow_to(usize::MAX, 0, 4), usize::MAX);
    }
}
