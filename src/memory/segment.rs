//! Memory segment trait and types.

/// Type of memory backing a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryType {
    /// Regular heap memory, allocated for a single buffer.
    Heap,
    /// Memory recycled through a [`BufferPool`](super::BufferPool).
    Pool,
}

/// Trait for memory segment backends.
///
/// A memory segment is a contiguous byte region used for buffer storage.
/// Mutable access requires `&mut self`, so a segment shared behind an `Arc`
/// can only be written by its unique owner.
pub trait MemorySegment: Send + Sync {
    /// The segment as a byte slice.
    fn as_slice(&self) -> &[u8];

    /// The segment as a mutable byte slice.
    fn as_mut_slice(&mut self) -> &mut [u8];

    /// Total size of the segment in bytes.
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns true if the segment has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The type of memory backing this segment.
    fn memory_type(&self) -> MemoryType;
}
