//! Tests of array behavior under custom and failing memory, using only the public API.

use growable_array::{GrowableArray, PodArray};
use raw_memory::{Error, ErrorCode, Status, SystemMemory, TypedAllocator, report};
use testing::FaultyMemory;

type FaultyAllocator<'a, T> = TypedAllocator<T, &'a FaultyMemory>;

fn faulty_array<T>(memory: &FaultyMemory) -> GrowableArray<T, FaultyAllocator<'_, T>> {
    GrowableArray::new_in(TypedAllocator::with_memory(memory))
}

fn faulty_pod_array<T: Copy>(memory: &FaultyMemory) -> PodArray<T, FaultyAllocator<'_, T>> {
    PodArray::new_in(TypedAllocator::with_memory(memory))
}

#[test]
fn push_three_then_out_of_range_is_none() {
    let mut array = GrowableArray::new();

    array.push_back(10).unwrap();
    array.push_back(20).unwrap();
    array.push_back(30).unwrap();

    assert_eq!(array.len(), 3);
    assert!(array.capacity() >= 4);
    assert_eq!(array.at(0), Some(&10));
    assert_eq!(array.at(2), Some(&30));
    assert!(array.at(3).is_none());
}

#[test]
fn failed_push_leaves_array_unchanged() {
    let memory = FaultyMemory::new();
    let mut array = faulty_array(&memory);

    for value in ["a", "b", "c", "d"] {
        array.push_back(value.to_string()).unwrap();
    }

    assert_eq!(array.capacity(), 4);
    let buffer = array.as_ptr();

    memory.fail_all();

    let error = array.push_back("e".to_string()).unwrap_err();
    assert!(matches!(error, Error::BadAlloc { .. }));

    assert_eq!(array.len(), 4);
    assert_eq!(array.capacity(), 4);
    assert_eq!(array.as_ptr(), buffer);
    assert_eq!(array.as_slice(), ["a", "b", "c", "d"]);

    memory.allow_all();

    array.push_back("e".to_string()).unwrap();
    assert_eq!(array.len(), 5);
    assert_eq!(array.capacity(), 6);
}

#[test]
fn pushes_fail_once_memory_runs_out() {
    let memory = FaultyMemory::new();
    let mut array = faulty_array::<u32>(&memory);

    // Buffers of 4, 6 and 9 values may be allocated, the next one may not.
    memory.fail_after(3);

    let mut pushed = 0;
    while array.push_back(pushed).is_ok() {
        pushed += 1;
    }

    assert_eq!(pushed, 9);
    assert_eq!(array.len(), 9);
    assert_eq!(array.capacity(), 9);
    assert_eq!(memory.allocations(), 3);
    assert_eq!(memory.outstanding(), 1);

    let buffer = array.as_ptr();
    let expected: Vec<u32> = (0..9).collect();

    for _ in 0..3 {
        assert!(matches!(array.push_back(100), Err(Error::BadAlloc { .. })));

        assert_eq!(array.len(), 9);
        assert_eq!(array.capacity(), 9);
        assert_eq!(array.as_ptr(), buffer);
        assert_eq!(array.as_slice(), expected.as_slice());
    }
}

#[test]
fn grow_fails_once_memory_runs_out() {
    let memory = FaultyMemory::new();
    let mut array = faulty_array::<u64>(&memory);

    array.extend_from_slice(&[1, 2, 3, 4, 5]).unwrap();
    assert_eq!(array.capacity(), 6);

    memory.fail_after(1);

    // 15 values need a buffer of 19 (6, 9, 13, 19).
    array.grow(10).unwrap();
    assert_eq!(array.len(), 15);
    assert_eq!(array.capacity(), 19);

    let error = array.grow(10).unwrap_err();
    assert!(matches!(error, Error::BadAlloc { .. }));

    assert_eq!(array.len(), 15);
    assert_eq!(array.capacity(), 19);
    let (pushed, grown) = array.split_at(5);
    assert_eq!(pushed, &[1, 2, 3, 4, 5]);
    assert!(grown.iter().all(|value| *value == 0));

    // Growing within the existing buffer needs no memory.
    array.grow(4).unwrap();
    assert_eq!(array.len(), 19);
    assert_eq!(memory.outstanding(), 1);
}

#[test]
fn with_capacity_in_allocates_exactly() {
    let memory = FaultyMemory::new();

    let array = GrowableArray::<u32, FaultyAllocator<'_, u32>>::with_capacity_in(
        10,
        TypedAllocator::with_memory(&memory),
    )
    .unwrap();

    assert_eq!(array.capacity(), 10);
    assert_eq!(array.len(), 0);
    assert_eq!(memory.allocations(), 1);

    drop(array);

    assert_eq!(memory.outstanding(), 0);
}

#[test]
fn with_capacity_in_reports_failed_allocation() {
    let memory = FaultyMemory::new();
    memory.fail_all();

    let result = GrowableArray::<u32, FaultyAllocator<'_, u32>>::with_capacity_in(
        10,
        TypedAllocator::with_memory(&memory),
    );

    assert!(matches!(result, Err(Error::BadAlloc { .. })));
    assert_eq!(memory.allocations(), 0);
    assert_eq!(memory.outstanding(), 0);
}

#[test]
fn failed_grow_and_reserve_leave_array_unchanged() {
    let memory = FaultyMemory::new();
    let mut array = faulty_array::<u32>(&memory);

    array.push_back(1).unwrap();
    memory.fail_all();

    assert!(array.grow(10).is_err());
    assert!(array.grow_filled(10, &7).is_err());
    assert!(array.reserve(100).is_err());
    assert!(array.extend_from_slice(&[2; 20]).is_err());

    assert_eq!(array.as_slice(), &[1]);
    assert_eq!(array.capacity(), 4);
}

#[test]
fn failure_reported_through_status_and_code() {
    let memory = FaultyMemory::new();
    let mut array = faulty_array::<u8>(&memory);

    memory.fail_all();

    let mut code = None;
    let status = report(&array.push_back(1), Some(&mut code));

    assert_eq!(status, Status::Fatal);
    assert_eq!(code, Some(ErrorCode::BadAlloc));

    memory.allow_all();

    let mut code = None;
    let status = report(&array.push_back(1), Some(&mut code));

    assert_eq!(status, Status::Ok);
    assert_eq!(code, None);
}

#[test]
fn growth_is_amortized() {
    let memory = FaultyMemory::new();
    let mut array = faulty_array::<u64>(&memory);

    for i in 0..1000 {
        array.push_back(i).unwrap();
    }

    // 4 6 9 13 19 28 42 63 94 141 211 316 474 711 1066
    assert_eq!(memory.allocations(), 15);
    assert_eq!(array.capacity(), 1066);
    assert_eq!(memory.outstanding(), 1);

    drop(array);

    assert_eq!(memory.outstanding(), 0);
}

#[test]
fn capacity_never_shrinks() {
    let mut array = GrowableArray::new();
    let mut previous = 0;

    for i in 0..200_u32 {
        array.push_back(i).unwrap();

        if i % 50 == 0 {
            array.clear();
        }

        assert!(array.capacity() >= previous);
        assert!(array.len() <= array.capacity());
        previous = array.capacity();
    }
}

#[test]
fn reset_returns_memory() {
    let memory = FaultyMemory::new();
    let mut array = faulty_array::<u16>(&memory);

    array.grow(50).unwrap();
    assert_eq!(memory.outstanding(), 1);

    array.reset();
    assert_eq!(memory.outstanding(), 0);
    assert_eq!(array.capacity(), 0);
}

#[test]
fn custom_alignment_is_honored() {
    let allocator = TypedAllocator::<u8, SystemMemory, 64>::default();
    let mut array = GrowableArray::new_in(allocator);

    array.push_back(1).unwrap();

    assert_eq!(array.as_ptr().addr() % 64, 0);
}

#[test]
fn try_clone_failure_is_reported() {
    let memory = FaultyMemory::new();
    let mut array = faulty_array::<u32>(&memory);
    array.extend_from_slice(&[1, 2, 3]).unwrap();

    memory.fail_all();
    assert!(array.try_clone().is_err());

    memory.allow_all();
    let clone = array.try_clone().unwrap();
    assert_eq!(clone.as_slice(), array.as_slice());
}

#[test]
fn pod_array_resizes_through_reallocate() {
    let memory = FaultyMemory::new();
    let mut array = faulty_pod_array(&memory);

    for i in 0..17_u32 {
        array.push_back(i).unwrap();
    }

    assert_eq!(memory.allocations(), 1);
    assert_eq!(memory.reallocations(), 1);
    assert_eq!(array.capacity(), 32);
    assert_eq!(array.find(&16), 16);

    drop(array);

    assert_eq!(memory.outstanding(), 0);
}

#[test]
fn pod_array_failed_resize_leaves_array_unchanged() {
    let memory = FaultyMemory::new();
    let mut array = faulty_pod_array(&memory);

    let values: Vec<u8> = (0..16).collect();
    array.extend_from_slice(&values).unwrap();

    memory.fail_all();

    assert!(array.push_back(16).is_err());
    assert_eq!(array.len(), 16);
    assert_eq!(array.capacity(), 16);
    assert_eq!(array.as_slice(), values.as_slice());
}
