//! Status and error code reporting example for `raw_memory`.
//!
//! This example plugs a size-limited memory into a `TypedAllocator` and shows how failed
//! allocations are reported, both as a `Result` and as a `Status` plus an optional error code.

use std::ptr::NonNull;

use raw_memory::{
    AlignedMemory, ElementAllocator, Error, ErrorCode, Status, SystemMemory, TypedAllocator,
    report,
};

/// Memory that refuses any request larger than `limit` bytes.
#[derive(Clone, Copy, Debug)]
struct LimitedMemory {
    limit: usize,
}

impl AlignedMemory for LimitedMemory {
    fn allocate(&self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
        if bytes > self.limit {
            return None;
        }

        SystemMemory.allocate(bytes, align)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, align: usize) {
        // SAFETY: Every buffer of this memory came from SystemMemory with the same alignment.
        unsafe {
            SystemMemory.free(ptr, align);
        }
    }
}

fn main() {
    let allocator: TypedAllocator<u64, LimitedMemory> =
        TypedAllocator::with_memory(LimitedMemory { limit: 256 });

    // 16 values of 8 bytes fit within the limit.
    let storage = allocator.allocate(16);
    let mut code = None;

    let status = report(&storage, Some(&mut code));
    println!("Allocating 16 values: {status:?}, error code: {code:?}");
    assert_eq!(status, Status::Ok);
    assert_eq!(code, None);

    if let Ok(storage) = storage {
        // SAFETY: The storage came from this allocator with the same count.
        unsafe {
            allocator.deallocate(storage, 16);
        }
    }

    // 64 values of 8 bytes do not.
    let too_large = allocator.allocate(64);
    let status = report(&too_large, Some(&mut code));

    println!("Allocating 64 values: {status:?}, error code: {code:?}");
    assert_eq!(status, Status::Fatal);
    assert_eq!(code, Some(ErrorCode::BadAlloc));

    if let Err(error) = &too_large {
        println!("The error says: {error}");
    }

    // A count whose byte size overflows is rejected before the memory is even asked.
    let overflowing = allocator.allocate(usize::MAX);
    let status = report(&overflowing, Some(&mut code));

    println!("Allocating usize::MAX values: {status:?}, error code: {code:?}");
    assert_eq!(code, Some(ErrorCode::BadSize));
    assert!(matches!(overflowing, Err(Error::BadSize { .. })));

    // Callers that only care about the status pass no slot.
    println!("Status only: {:?}", report(&too_large, None));

    println!("Status reporting example completed successfully!");
}
