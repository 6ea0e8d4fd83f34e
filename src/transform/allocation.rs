//! Output allocator binding.
//!
//! After every successful configure that needs fresh output buffers, the
//! stage asks its downstream peer for allocation parameters and binds a
//! pool. Failures here degrade to ad hoc allocation; they never fail
//! negotiation.

use super::{Stage, StreamState};
use crate::element::{AllocationQuery, TransformImpl};
use crate::error::Result;
use crate::format::Caps;
use crate::memory::{BufferPool, FixedBufferPool, PoolConfig};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where the bound output pool came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PoolSource {
    /// No pool; outputs are allocated ad hoc (or not needed at all).
    #[default]
    None,
    /// Proposed by the downstream peer.
    Downstream,
    /// Built locally because downstream offered none.
    Local,
}

/// The current output allocation choice.
#[derive(Clone, Default)]
pub struct AllocationBinding {
    pool: Option<Arc<dyn BufferPool>>,
    source: PoolSource,
    size: usize,
    min_buffers: usize,
    max_buffers: usize,
}

impl AllocationBinding {
    /// The bound pool.
    pub fn pool(&self) -> Option<&Arc<dyn BufferPool>> {
        self.pool.as_ref()
    }

    /// Where the pool came from.
    pub fn source(&self) -> PoolSource {
        self.source
    }

    /// Whether a pool is bound.
    pub fn is_bound(&self) -> bool {
        self.pool.is_some()
    }

    /// Buffer size of the bound pool.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Min/max buffer counts of the bound pool.
    pub fn buffers(&self) -> (usize, usize) {
        (self.min_buffers, self.max_buffers)
    }
}

impl std::fmt::Debug for AllocationBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationBinding")
            .field("pool", &self.pool.as_ref().map(|p| p.name().to_string()))
            .field("source", &self.source)
            .field("size", &self.size)
            .field("min_buffers", &self.min_buffers)
            .field("max_buffers", &self.max_buffers)
            .finish()
    }
}

impl<T: TransformImpl> Stage<T> {
    /// Deactivate and forget the current binding.
    pub(super) fn clear_allocation(&self, stream: &mut StreamState) {
        let old = std::mem::take(&mut stream.binding);
        self.lock_state().active_pool = None;
        if let Some(pool) = old.pool {
            debug!(stage = %self.name, pool = %pool.name(), "releasing output pool");
            if let Err(e) = pool.set_active(false) {
                warn!(stage = %self.name, error = %e, "failed to deactivate output pool");
            }
        }
    }

    /// Bind an output pool for `outcaps`.
    ///
    /// Only the `decide_allocation` hook can fail this; a missing or failed
    /// downstream answer falls back to a local pool, and a pool that cannot
    /// be built leaves the stage allocating ad hoc.
    pub(super) fn bind_output_allocator(&self, stream: &mut StreamState, outcaps: &Caps) -> Result<()> {
        self.clear_allocation(stream);

        let mut query = AllocationQuery::new(outcaps.clone(), true);
        let answered = match self.src.peer() {
            Some((peer, pad)) => peer.propose_allocation(pad, &mut query),
            None => false,
        };
        if !answered {
            debug!(stage = %self.name, "allocation query unanswered, using defaults");
            query.pools.clear();
            query.params = None;
        }
        self.imp.decide_allocation(&mut query)?;

        let binding = self
            .bind_downstream_pool(&query, outcaps)
            .or_else(|| self.bind_local_pool(&query, outcaps))
            .unwrap_or_default();

        debug!(stage = %self.name, ?binding, "output allocation bound");
        self.lock_state().active_pool = binding.pool.clone();
        stream.binding = binding;
        Ok(())
    }

    /// Grow a local pool so its buffers hold `size` bytes.
    ///
    /// Buffers still out from the old configuration are freed on return.
    pub(super) fn grow_local_pool(&self, stream: &mut StreamState, size: usize) -> Result<()> {
        let binding = &mut stream.binding;
        if binding.source != PoolSource::Local || binding.size >= size {
            return Ok(());
        }
        let Some(pool) = binding.pool.clone() else {
            return Ok(());
        };
        debug!(stage = %self.name, from = binding.size, to = size, "growing local pool");
        let config = PoolConfig {
            size,
            ..pool.config()
        };
        pool.set_active(false)?;
        pool.set_config(config)?;
        pool.set_active(true)?;
        binding.size = size;
        Ok(())
    }

    fn proposal_size(&self, size: usize, outcaps: &Caps) -> Option<usize> {
        if size > 0 {
            Some(size)
        } else {
            self.unit_size(outcaps).filter(|&s| s > 0)
        }
    }

    fn bind_downstream_pool(&self, query: &AllocationQuery, outcaps: &Caps) -> Option<AllocationBinding> {
        let (pool, proposal) = query
            .pools
            .iter()
            .find_map(|p| p.pool.clone().map(|pool| (pool, p)))?;

        if !pool.is_active() {
            let Some(size) = self.proposal_size(proposal.size, outcaps) else {
                debug!(stage = %self.name, "downstream pool has no usable size");
                return None;
            };
            let align = query.params.map_or(0, |p| p.align);
            let config = PoolConfig::new(size)
                .with_buffers(proposal.min_buffers, proposal.max_buffers)
                .with_align(align);
            if let Err(e) = pool.set_config(config).and_then(|()| pool.set_active(true)) {
                warn!(stage = %self.name, pool = %pool.name(), error = %e, "downstream pool unusable");
                return None;
            }
        }

        let config = pool.config();
        Some(AllocationBinding {
            pool: Some(pool),
            source: PoolSource::Downstream,
            size: config.size,
            min_buffers: config.min_buffers,
            max_buffers: config.max_buffers,
        })
    }

    fn bind_local_pool(&self, query: &AllocationQuery, outcaps: &Caps) -> Option<AllocationBinding> {
        let hint = query.pools.first();
        let Some(size) = self.proposal_size(hint.map_or(0, |p| p.size), outcaps) else {
            debug!(stage = %self.name, "output size unknown, allocating ad hoc");
            return None;
        };
        let (min, max) = match hint {
            Some(p) => (p.min_buffers, p.max_buffers),
            None => (self.config.pool_min_buffers, self.config.pool_max_buffers),
        };
        let align = query.params.map_or(0, |p| p.align);
        let config = PoolConfig::new(size).with_buffers(min, max).with_align(align);

        let pool = FixedBufferPool::new(format!("{}-pool", self.name), config);
        if let Err(e) = pool.set_active(true) {
            warn!(stage = %self.name, error = %e, "local pool activation failed, allocating ad hoc");
            return None;
        }
        Some(AllocationBinding {
            pool: Some(pool),
            source: PoolSource::Local,
            size,
            min_buffers: min,
            max_buffers: max,
        })
    }
}
