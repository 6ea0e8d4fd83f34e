//! Output buffer pools.
//!
//! A pool hands out fixed-size buffers and takes their memory back when the
//! last handle to it drops. Stages bind one pool per negotiated output format:
//! either a pool proposed by the downstream peer or a local
//! [`FixedBufferPool`].
//!
//! # Lifecycle
//!
//! - [`BufferPool::set_config`] while inactive
//! - [`BufferPool::set_active`]`(true)` preallocates `min_buffers`
//! - [`BufferPool::acquire`] blocks once `max_buffers` are outstanding
//! - [`BufferPool::set_flushing`]`(true)` wakes every waiter with
//!   [`Error::Flushing`]
//!
//! ```rust
//! use parallax_transform::memory::{BufferPool, FixedBufferPool, PoolConfig};
//!
//! let pool = FixedBufferPool::new("out", PoolConfig::new(4096).with_buffers(2, 4));
//! pool.set_active(true).unwrap();
//!
//! let buffer = pool.acquire().unwrap();
//! assert_eq!(buffer.len(), 4096);
//! drop(buffer); // memory goes back to the pool
//! assert_eq!(pool.stats().available, 2);
//! ```

use super::heap::alloc_zeroed;
use super::{MemorySegment, MemoryType};
use crate::buffer::{Buffer, MemoryHandle};
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

// ============================================================================
// PoolConfig
// ============================================================================

/// Pool parameters, as negotiated through an allocation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Size of each buffer in bytes.
    pub size: usize,
    /// Buffers preallocated on activation.
    pub min_buffers: usize,
    /// Maximum outstanding buffers; 0 means unlimited.
    pub max_buffers: usize,
    /// Requested alignment in bytes (0 or a power of two).
    pub align: usize,
}

impl PoolConfig {
    /// Config for `size`-byte buffers, no preallocation, unlimited count.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            min_buffers: 0,
            max_buffers: 0,
            align: 0,
        }
    }

    /// Set min and max buffer counts.
    pub fn with_buffers(mut self, min: usize, max: usize) -> Self {
        self.min_buffers = min;
        self.max_buffers = max;
        self
    }

    /// Set the alignment.
    pub fn with_align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidInput("pool buffer size must be non-zero".into()));
        }
        if self.align != 0 && !self.align.is_power_of_two() {
            return Err(Error::InvalidInput(format!(
                "pool alignment {} is not a power of two",
                self.align
            )));
        }
        if self.max_buffers != 0 && self.min_buffers > self.max_buffers {
            return Err(Error::InvalidInput(format!(
                "pool min_buffers {} exceeds max_buffers {}",
                self.min_buffers, self.max_buffers
            )));
        }
        Ok(())
    }
}

// ============================================================================
// BufferPool Trait
// ============================================================================

/// A pool of reusable output buffers.
///
/// Buffers acquired from a pool return their memory to it when dropped.
///
/// # Backpressure
///
/// When `max_buffers` are outstanding, `acquire()` blocks until one is
/// returned or the pool starts flushing.
pub trait BufferPool: Send + Sync {
    /// Debug name.
    fn name(&self) -> &str;

    /// Current configuration.
    fn config(&self) -> PoolConfig;

    /// Replace the configuration. Only allowed while inactive.
    fn set_config(&self, config: PoolConfig) -> Result<()>;

    /// Activate (preallocating `min_buffers`) or deactivate (freeing idle memory).
    fn set_active(&self, active: bool) -> Result<()>;

    /// Whether the pool is active.
    fn is_active(&self) -> bool;

    /// Acquire a buffer, blocking while the pool is exhausted.
    ///
    /// # Errors
    ///
    /// [`Error::Flushing`] while flushing, [`Error::AllocationFailed`] when
    /// inactive or when memory cannot be allocated.
    fn acquire(&self) -> Result<Buffer>;

    /// Acquire a buffer without blocking; `Ok(None)` if exhausted.
    fn try_acquire(&self) -> Result<Option<Buffer>>;

    /// Enter or leave flushing. Entering wakes all blocked `acquire` calls.
    fn set_flushing(&self, flushing: bool);

    /// Get pool statistics.
    fn stats(&self) -> PoolStats;
}

/// Statistics about pool usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers currently allocated (idle + outstanding).
    pub allocated: usize,
    /// Idle buffers ready for reuse.
    pub available: usize,
    /// Buffers currently handed out.
    pub outstanding: usize,
    /// Total number of acquisitions.
    pub acquisitions: u64,
    /// Acquisitions that had to wait for a buffer.
    pub waits: u64,
}

// ============================================================================
// FixedBufferPool
// ============================================================================

/// A heap-backed pool of equally sized buffers.
pub struct FixedBufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    name: String,
    state: Mutex<PoolState>,
    notify: Condvar,
    acquisitions: AtomicU64,
    waits: AtomicU64,
}

struct PoolState {
    config: PoolConfig,
    free: Vec<Box<[u8]>>,
    allocated: usize,
    outstanding: usize,
    active: bool,
    flushing: bool,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FixedBufferPool {
    /// Create an inactive pool.
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                state: Mutex::new(PoolState {
                    config,
                    free: Vec::new(),
                    allocated: 0,
                    outstanding: 0,
                    active: false,
                    flushing: false,
                }),
                notify: Condvar::new(),
                acquisitions: AtomicU64::new(0),
                waits: AtomicU64::new(0),
            }),
        })
    }

    /// Take a buffer if one is free or may be allocated.
    fn take_locked(&self, state: &mut PoolState) -> Result<Option<Buffer>> {
        if state.flushing {
            return Err(Error::Flushing);
        }
        if !state.active {
            return Err(Error::AllocationFailed(format!(
                "pool {} is not active",
                self.inner.name
            )));
        }
        let data = match state.free.pop() {
            Some(data) => data,
            None if state.config.max_buffers == 0
                || state.allocated < state.config.max_buffers =>
            {
                let data = alloc_zeroed(state.config.size)?;
                state.allocated += 1;
                data
            }
            None => return Ok(None),
        };
        state.outstanding += 1;
        self.inner.acquisitions.fetch_add(1, Ordering::Relaxed);

        let segment = PooledSegment {
            data,
            pool: Arc::downgrade(&self.inner),
        };
        Ok(Some(Buffer::new(
            MemoryHandle::from_segment(Arc::new(segment)),
            Metadata::new(),
        )))
    }
}

impl BufferPool for FixedBufferPool {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn config(&self) -> PoolConfig {
        self.inner.lock().config
    }

    fn set_config(&self, config: PoolConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.inner.lock();
        if state.active {
            return Err(Error::InvalidInput(format!(
                "pool {} cannot be reconfigured while active",
                self.inner.name
            )));
        }
        state.config = config;
        Ok(())
    }

    fn set_active(&self, active: bool) -> Result<()> {
        let mut state = self.inner.lock();
        if state.active == active {
            return Ok(());
        }
        if active {
            state.config.validate()?;
            while state.allocated < state.config.min_buffers {
                let data = alloc_zeroed(state.config.size)?;
                state.free.push(data);
                state.allocated += 1;
            }
        } else {
            let idle = state.free.len();
            state.allocated -= idle;
            state.free.clear();
        }
        state.active = active;
        drop(state);
        self.inner.notify.notify_all();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    fn acquire(&self) -> Result<Buffer> {
        let mut state = self.inner.lock();
        if let Some(buffer) = self.take_locked(&mut state)? {
            return Ok(buffer);
        }

        self.inner.waits.fetch_add(1, Ordering::Relaxed);
        loop {
            state = self
                .inner
                .notify
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(buffer) = self.take_locked(&mut state)? {
                return Ok(buffer);
            }
        }
    }

    fn try_acquire(&self) -> Result<Option<Buffer>> {
        let mut state = self.inner.lock();
        self.take_locked(&mut state)
    }

    fn set_flushing(&self, flushing: bool) {
        self.inner.lock().flushing = flushing;
        if flushing {
            self.inner.notify.notify_all();
        }
    }

    fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            allocated: state.allocated,
            available: state.free.len(),
            outstanding: state.outstanding,
            acquisitions: self.inner.acquisitions.load(Ordering::Relaxed),
            waits: self.inner.waits.load(Ordering::Relaxed),
        }
    }
}

impl Drop for FixedBufferPool {
    fn drop(&mut self) {
        self.inner.notify.notify_all();
    }
}

impl std::fmt::Debug for FixedBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedBufferPool")
            .field("name", &self.inner.name)
            .field("stats", &self.stats())
            .finish()
    }
}

// ============================================================================
// PooledSegment
// ============================================================================

/// Pool memory lent to a buffer; goes back to the pool on drop.
struct PooledSegment {
    data: Box<[u8]>,
    pool: Weak<PoolInner>,
}

impl MemorySegment for PooledSegment {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Pool
    }
}

impl Drop for PooledSegment {
    fn drop(&mut self) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let data = std::mem::take(&mut self.data);
        let mut state = pool.lock();
        state.outstanding -= 1;
        // Memory from a previous configuration or an inactive pool is released.
        if state.active && data.len() == state.config.size {
            state.free.push(data);
        } else {
            state.allocated -= 1;
        }
        drop(state);
        pool.notify.notify_one();
    }
}
