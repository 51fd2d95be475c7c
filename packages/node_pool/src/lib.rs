#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A pool of fixed-size memory nodes with constant-time allocate and free.
//!
//! [`NodePool<NODE_SIZE>`](NodePool) hands out blocks of `NODE_SIZE` bytes, aligned to 16 bytes,
//! that a caller can place any value into. It is intended as the backing store for node-based
//! data structures such as linked lists and trees, where many small allocations of the same size
//! come and go.
//!
//! # Key features
//!
//! - **Constant-time operations**: allocate and free are a pop and a push on an intrusive free
//!   list, with an occasional block allocation when the list runs dry.
//! - **Warm reuse**: the most recently freed node is handed out next.
//! - **Geometric growth**: each new block is about half the size of the whole pool so far.
//! - **Stable addresses**: nodes never move. Blocks are only released when the pool is dropped.
//! - **Fallible growth**: running out of memory is an [`Error`](raw_memory::Error), not an abort.
//! - **Pluggable memory**: blocks come from any [`AlignedMemory`](raw_memory::AlignedMemory),
//!   configured via [`NodePoolBuilder`].
//!
//! # Example
//!
//! ```
//! use node_pool::NodePool;
//!
//! let mut pool = NodePool::<16>::new();
//!
//! let node = pool.allocate()?;
//!
//! // SAFETY: The node is 16 bytes aligned to 16, so a u64 fits.
//! unsafe {
//!     node.cast::<u64>().write(42);
//!     assert_eq!(node.cast::<u64>().read(), 42);
//! }
//!
//! // SAFETY: The node came from this pool and is not used afterwards.
//! unsafe { pool.free(node) };
//! # Ok::<(), raw_memory::Error>(())
//! ```

mod block;
mod builder;
mod node;
mod pool;

pub use builder::*;
pub use node::NODE_ALIGN;
pub use pool::*;

pub(crate) type Result<T> = std::result::Result<T, raw_memory::Error>;
