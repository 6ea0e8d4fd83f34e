//! Heap-backed memory segment.

use super::{MemorySegment, MemoryType};
use crate::error::{Error, Result};

/// A memory segment backed by a single heap allocation.
///
/// This is what ad hoc output allocation produces when no pool is bound.
///
/// # Example
///
/// ```rust
/// use parallax_transform::memory::{HeapSegment, MemorySegment};
///
/// let segment = HeapSegment::new(1024).unwrap();
/// assert_eq!(segment.len(), 1024);
/// ```
pub struct HeapSegment {
    data: Box<[u8]>,
}

impl HeapSegment {
    /// Create a zero-initialized heap segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the allocator refuses the size.
    pub fn new(size: usize) -> Result<Self> {
        Ok(Self {
            data: alloc_zeroed(size)?,
        })
    }

    /// Wrap existing bytes without copying.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }
}

/// Allocate `size` zeroed bytes, reporting failure instead of aborting.
pub(crate) fn alloc_zeroed(size: usize) -> Result<Box<[u8]>> {
    let mut data = Vec::new();
    data.try_reserve_exact(size)
        .map_err(|e| Error::AllocationFailed(format!("{size} bytes: {e}")))?;
    data.resize(size, 0);
    Ok(data.into_boxed_slice())
}

impl MemorySegment for HeapSegment {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Heap
    }
}
