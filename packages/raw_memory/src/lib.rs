#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Building blocks for containers that manage their own memory.
//!
//! This crate provides the low-level pieces that the `growable_array` and `node_pool` packages
//! are assembled from:
//!
//! - [`AlignedMemory`] is the raw memory primitive. It hands out byte buffers with a requested
//!   size and alignment and takes them back given only the alignment. [`SystemMemory`] implements
//!   it on top of the Rust global allocator.
//! - [`TypedAllocator`] adapts an [`AlignedMemory`] to the [`ElementAllocator`] shape expected by
//!   containers: "allocate storage for N values of `T`", with the ability to
//!   [rebind](ElementAllocator::rebind) to a different value type.
//! - The [`uninit`] module constructs, copies and destroys values in raw, uninitialized storage.
//! - [`Error`], [`ErrorCode`] and [`Status`] are the error vocabulary shared by all the containers.
//!
//! Nothing here is thread-safe in the sense of providing internal synchronization - every type is
//! either stateless or owned by exactly one container.
//!
//! # Example
//!
//! ```
//! use raw_memory::{ElementAllocator, TypedAllocator};
//!
//! let allocator = TypedAllocator::<u64>::new();
//!
//! let storage = allocator.allocate(4)?;
//!
//! // SAFETY: We allocated room for 4 values above and write only the first one.
//! unsafe {
//!     storage.write(42);
//!     assert_eq!(storage.read(), 42);
//! }
//!
//! // SAFETY: The storage came from this allocator with the same count.
//! unsafe {
//!     allocator.deallocate(storage, 4);
//! }
//! # Ok::<(), raw_memory::Error>(())
//! ```

mod error;
mod growth;
mod memory;
mod status;
mod typed_allocator;
pub mod uninit;

pub use error::Error;
pub(crate) use error::Result;
pub use growth::*;
pub use memory::*;
pub use status::*;
pub use typed_allocator::*;
