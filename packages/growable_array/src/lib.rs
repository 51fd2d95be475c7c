#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Contiguous, growable arrays whose every allocating operation reports failure instead of
//! aborting.
//!
//! Two flavors are provided:
//!
//! - [`GrowableArray`] holds values of any type. It constructs, relocates and drops them
//!   correctly and grows its capacity by a factor of 1.5 starting from 4.
//! - [`PodArray`] holds plain [`Copy`] values. It never runs constructors or destructors,
//!   resizes its buffer in place when the memory allows and doubles its capacity starting from 16.
//!
//! Both draw their buffer from an [`ElementAllocator`](raw_memory::ElementAllocator), by default
//! a [`TypedAllocator`](raw_memory::TypedAllocator) over the Rust global allocator. Supply your own
//! via `new_in()` to place the buffer in custom memory or to observe allocations.
//!
//! If an allocation fails, the operation returns an [`Error`](raw_memory::Error) and the array is
//! left exactly as it was before the call.
//!
//! # Example
//!
//! ```
//! use growable_array::GrowableArray;
//!
//! let mut names = GrowableArray::new();
//!
//! names.push_back("Alice".to_string())?;
//! names.push_back("Bob".to_string())?;
//!
//! assert_eq!(names.len(), 2);
//! assert_eq!(names.at(1).map(String::as_str), Some("Bob"));
//! assert!(names.at(2).is_none());
//! # Ok::<(), raw_memory::Error>(())
//! ```

mod array;
mod pod_array;

pub use array::*;
pub use pod_array::*;

pub(crate) type Result<T> = std::result::Result<T, raw_memory::Error>;
