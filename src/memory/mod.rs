//! Memory management for transform stages.
//!
//! - [`MemorySegment`]: trait for memory backends
//! - [`HeapSegment`]: one-off heap allocation (ad hoc output buffers)
//! - [`BufferPool`]: recyclable output buffers, with [`FixedBufferPool`] as
//!   the local implementation stages fall back to

mod buffer_pool;
mod heap;
mod segment;

pub use buffer_pool::{BufferPool, FixedBufferPool, PoolConfig, PoolStats};
pub use heap::HeapSegment;
pub use segment::{MemorySegment, MemoryType};
