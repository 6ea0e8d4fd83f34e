//! Buffer types passed through transform stages.
//!
//! A [`Buffer`] is a [`MemoryHandle`] plus [`Metadata`]. Cloning a buffer
//! shares its memory; the buffer is writable only while its memory is
//! uniquely owned. Writers that hold a shared buffer call
//! [`Buffer::make_writable`], which copies once.

use crate::error::{Error, Result};
use crate::memory::{HeapSegment, MemorySegment, MemoryType};
use crate::metadata::Metadata;
use std::sync::Arc;

/// Handle to a memory region within a segment.
///
/// This is cheap to clone (just Arc increment + copy of offset/len).
#[derive(Clone)]
pub struct MemoryHandle {
    segment: Arc<dyn MemorySegment>,
    offset: usize,
    len: usize,
}

impl MemoryHandle {
    /// Create a new memory handle.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > segment.len()`.
    pub fn new(segment: Arc<dyn MemorySegment>, offset: usize, len: usize) -> Self {
        assert!(
            offset + len <= segment.len(),
            "memory handle exceeds segment bounds"
        );
        Self {
            segment,
            offset,
            len,
        }
    }

    /// Create a memory handle covering an entire segment.
    pub fn from_segment(segment: Arc<dyn MemorySegment>) -> Self {
        let len = segment.len();
        Self {
            segment,
            offset: 0,
            len,
        }
    }

    /// Length of the region.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset within the segment.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The region as bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.segment.as_slice()[self.offset..self.offset + self.len]
    }

    /// The region as mutable bytes; `None` while the segment is shared.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        let (offset, len) = (self.offset, self.len);
        Arc::get_mut(&mut self.segment).map(|s| &mut s.as_mut_slice()[offset..offset + len])
    }

    /// Whether this handle is the only owner of its segment.
    #[inline]
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.segment) == 1 && Arc::weak_count(&self.segment) == 0
    }

    /// The memory type of the underlying segment.
    #[inline]
    pub fn memory_type(&self) -> MemoryType {
        self.segment.memory_type()
    }

    /// The underlying segment.
    #[inline]
    pub fn segment(&self) -> &Arc<dyn MemorySegment> {
        &self.segment
    }

    /// Resize the region within the segment's bounds.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if self.offset + len > self.segment.len() {
            return Err(Error::InvalidInput(format!(
                "length {len} exceeds segment capacity {}",
                self.segment.len() - self.offset
            )));
        }
        self.len = len;
        Ok(())
    }
}

impl std::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("memory_type", &self.memory_type())
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// A unit of data with metadata.
///
/// # Ownership
///
/// A buffer has a single logical owner at a time. Clones share memory, and
/// shared memory is read-only until [`make_writable`](Self::make_writable)
/// copies it.
#[derive(Clone)]
pub struct Buffer {
    memory: MemoryHandle,
    metadata: Metadata,
}

impl Buffer {
    /// Create a new buffer.
    pub fn new(memory: MemoryHandle, metadata: Metadata) -> Self {
        Self { memory, metadata }
    }

    /// Create a heap buffer that takes ownership of `data`.
    pub fn from_vec(data: Vec<u8>, metadata: Metadata) -> Self {
        let segment: Arc<dyn MemorySegment> = Arc::new(HeapSegment::from_vec(data));
        Self::new(MemoryHandle::from_segment(segment), metadata)
    }

    /// Create a heap buffer holding a copy of `data`.
    pub fn from_slice(data: &[u8], metadata: Metadata) -> Self {
        Self::from_vec(data.to_vec(), metadata)
    }

    /// Allocate a zeroed heap buffer of `size` bytes.
    pub fn allocate(size: usize) -> Result<Self> {
        let segment: Arc<dyn MemorySegment> = Arc::new(HeapSegment::new(size)?);
        Ok(Self::new(MemoryHandle::from_segment(segment), Metadata::new()))
    }

    /// Get the buffer metadata.
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get mutable access to the metadata.
    #[inline]
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Get the memory handle.
    #[inline]
    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }

    /// Get the buffer data as bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.memory.as_slice()
    }

    /// Get mutable data; `None` unless the buffer is writable.
    #[inline]
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        self.memory.as_mut_slice()
    }

    /// Get the buffer length.
    #[inline]
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Check if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Shrink or grow the visible length within the allocated memory.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        self.memory.set_len(len)
    }

    /// Get the memory type.
    #[inline]
    pub fn memory_type(&self) -> MemoryType {
        self.memory.memory_type()
    }

    /// Whether the memory is uniquely owned by this buffer.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.memory.is_unique()
    }

    /// Whether both buffers view the same memory segment.
    #[inline]
    pub fn shares_memory(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(self.memory.segment(), other.memory.segment())
    }

    /// Copy data and metadata into a fresh heap buffer.
    pub fn copy_deep(&self) -> Result<Self> {
        let mut segment = HeapSegment::new(self.len())?;
        segment.as_mut_slice().copy_from_slice(self.as_bytes());
        let segment: Arc<dyn MemorySegment> = Arc::new(segment);
        Ok(Self::new(
            MemoryHandle::from_segment(segment),
            self.metadata.clone(),
        ))
    }

    /// Return a writable buffer, copying only if the memory is shared.
    pub fn make_writable(self) -> Result<Self> {
        if self.is_writable() {
            Ok(self)
        } else {
            self.copy_deep()
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("memory_type", &self.memory_type())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buffer = Buffer::from_slice(b"hello", Metadata::with_sequence(42));
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.as_bytes(), b"hello");
        assert_eq!(buffer.metadata().sequence, 42);
        assert_eq!(buffer.memory_type(), MemoryType::Heap);
    }

    #[test]
    fn test_clone_shares_memory_and_blocks_writes() {
        let mut buffer = Buffer::allocate(16).unwrap();
        assert!(buffer.is_writable());

        let other = buffer.clone();
        assert!(buffer.shares_memory(&other));
        assert!(!buffer.is_writable());
        assert!(buffer.data_mut().is_none());

        drop(other);
        assert!(buffer.data_mut().is_some());
    }

    #[test]
    fn test_make_writable_copies_once() {
        let original = Buffer::from_slice(&[1, 2, 3], Metadata::with_sequence(3));
        let shared = original.clone();

        let mut writable = shared.make_writable().unwrap();
        assert!(!writable.shares_memory(&original));
        writable.data_mut().unwrap()[0] = 9;
        assert_eq!(original.as_bytes(), &[1, 2, 3]);
        assert_eq!(writable.as_bytes(), &[9, 2, 3]);
        assert_eq!(writable.metadata().sequence, 3);

        let again = writable.make_writable().unwrap();
        assert_eq!(again.as_bytes(), &[9, 2, 3]);
    }

    #[test]
    fn test_set_len_within_bounds() {
        let mut buffer = Buffer::allocate(8).unwrap();
        buffer.set_len(4).unwrap();
        assert_eq!(buffer.len(), 4);
        assert!(buffer.set_len(9).is_err());
    }

    #[test]
    #[should_panic(expected = "memory handle exceeds segment bounds")]
    fn test_memory_handle_out_of_bounds() {
        let segment: Arc<dyn MemorySegment> = Arc::new(HeapSegment::from_vec(vec![0; 4]));
        let _ = MemoryHandle::new(segment, 2, 4);
    }
}
